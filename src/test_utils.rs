//! テスト用のインメモリ実装（DB・SMTP不要）

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::repositories::{UserFilter, UserStore};
use crate::services::email::{DeliveryReceipt, Mailer, OutgoingMail};
use crate::services::password_reset::{PasswordResetService, ResetSettings};
use crate::services::reset_token::ResetTokenSigner;

pub const TEST_SECRET: &[u8] = b"test-reset-secret-test-reset-secret";

pub fn test_signer() -> ResetTokenSigner {
    ResetTokenSigner::new(TEST_SECRET, 3600).unwrap()
}

pub fn test_settings() -> ResetSettings {
    ResetSettings {
        reset_url_base: "http://localhost:3000/forgotpassword/resetpassword".to_string(),
        from_address: "no-reply@localhost".to_string(),
    }
}

pub fn test_service(
    store: InMemoryUserStore,
    mailer: RecordingMailer,
) -> PasswordResetService<InMemoryUserStore, RecordingMailer> {
    PasswordResetService::new(store, mailer, test_signer(), test_settings())
}

/// インメモリのユーザーストア
///
/// 各操作はロック内で完結するため、UserRepository の条件付き UPDATE と同じ原子性を持つ
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<Mutex<Vec<User>>>,
    writes: Arc<AtomicUsize>,
    fail_next_write: Arc<AtomicBool>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーを追加（ハッシュはargon2を通さないダミー値）
    pub fn insert_user(&self, email: &str, password: &str) {
        let now = OffsetDateTime::now_utc();
        self.users.lock().unwrap().push(User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: format!("seed:{password}"),
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        });
    }

    pub fn get(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
    }

    /// 書き込み回数に数えずにトークンを直接設定
    pub fn seed_reset_token(&self, email: &str, token: &str, expires_at: OffsetDateTime) {
        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.email == email).unwrap();
        user.reset_token = Some(token.to_string());
        user.reset_token_expires_at = Some(expires_at);
    }

    /// 成功した set_reset_token / consume_reset_token の回数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_write_failure(&self) -> Result<(), AppError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(AppError::Store(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

impl UserStore for InMemoryUserStore {
    async fn find_one(&self, filter: UserFilter<'_>) -> Result<Option<User>, AppError> {
        let users = self.users.lock().unwrap();
        let found = users.iter().find(|u| match filter {
            UserFilter::Email(email) => u.email == email,
            UserFilter::ResetToken(token) => u.reset_token.as_deref() == Some(token),
        });
        Ok(found.cloned())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        self.check_write_failure()?;

        let mut users = self.users.lock().unwrap();
        let stored = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AppError::Store(sqlx::Error::RowNotFound))?;
        stored.reset_token = Some(token.to_string());
        stored.reset_token_expires_at = Some(expires_at);
        stored.updated_at = OffsetDateTime::now_utc();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        self.check_write_failure()?;

        let mut users = self.users.lock().unwrap();
        let Some(stored) = users
            .iter_mut()
            .find(|u| u.id == user_id && u.reset_token.as_deref() == Some(token))
        else {
            return Ok(false);
        };
        stored.password_hash = password_hash.to_string();
        stored.reset_token = None;
        stored.reset_token_expires_at = None;
        stored.updated_at = OffsetDateTime::now_utc();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn clear_expired_reset_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        let mut users = self.users.lock().unwrap();
        let mut cleared = 0;
        for user in users.iter_mut() {
            if user.reset_token.is_some()
                && user.reset_token_expires_at.is_some_and(|exp| exp <= now)
            {
                user.reset_token = None;
                user.reset_token_expires_at = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

/// 検索の直後に一度スケジューラへ制御を返すストア
///
/// 検索と書き込みの間に他のリクエストを割り込ませる
#[derive(Clone)]
pub struct YieldingUserStore {
    inner: InMemoryUserStore,
}

impl YieldingUserStore {
    pub fn new(inner: InMemoryUserStore) -> Self {
        Self { inner }
    }
}

impl UserStore for YieldingUserStore {
    async fn find_one(&self, filter: UserFilter<'_>) -> Result<Option<User>, AppError> {
        let found = self.inner.find_one(filter).await?;
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        self.inner.set_reset_token(user_id, token, expires_at).await
    }

    async fn consume_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        self.inner
            .consume_reset_token(user_id, token, password_hash)
            .await
    }

    async fn clear_expired_reset_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        self.inner.clear_expired_reset_tokens(now).await
    }
}

/// 送信内容を記録するメーラー
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 常に送信失敗するメーラー
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    async fn send_mail(&self, mail: &OutgoingMail) -> Result<DeliveryReceipt, AppError> {
        if self.fail {
            return Err(AppError::Delivery(anyhow::anyhow!("smtp connection refused")));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(DeliveryReceipt {
            response: "250 OK".to_string(),
        })
    }
}

/// release() が呼ばれるまで送信を止めるメーラー
#[derive(Clone, Default)]
pub struct GatedMailer {
    inner: RecordingMailer,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// send_mail に入るまで待つ
    pub async fn wait_until_sending(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.inner.sent()
    }
}

impl Mailer for GatedMailer {
    async fn send_mail(&self, mail: &OutgoingMail) -> Result<DeliveryReceipt, AppError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.send_mail(mail).await
    }
}
