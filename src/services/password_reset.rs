use time::OffsetDateTime;

use crate::error::AppError;
use crate::repositories::{UserFilter, UserStore};
use crate::services::email::{Mailer, OutgoingMail};
use crate::services::password::hash_password;
use crate::services::reset_token::ResetTokenSigner;

const RESET_MAIL_SUBJECT: &str = "Password Reset";

/// パスワードリセットに注入する設定
#[derive(Debug, Clone)]
pub struct ResetSettings {
    /// リセットリンクのベースURL（末尾にトークンを付与）
    pub reset_url_base: String,
    /// 送信元アドレス
    pub from_address: String,
}

/// パスワードリセットサービス
///
/// 発行（request_reset）と消費（reset_password）は独立したリクエストで動き、
/// 共有するのはユーザーレコードのみ。
#[derive(Clone)]
pub struct PasswordResetService<S, M> {
    store: S,
    mailer: M,
    signer: ResetTokenSigner,
    settings: ResetSettings,
}

impl<S: UserStore, M: Mailer> PasswordResetService<S, M> {
    /// 新しい PasswordResetService を作成
    pub fn new(store: S, mailer: M, signer: ResetTokenSigner, settings: ResetSettings) -> Self {
        Self {
            store,
            mailer,
            signer,
            settings,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// メール送信の成功を確認してからトークンをレコードに保存する。
    /// 送信失敗時はレコード（以前のトークンを含む）を変更しない。
    ///
    /// # Security
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let user = match self.store.find_one(UserFilter::Email(email)).await? {
            Some(user) => user,
            None => {
                tracing::info!(email = %email, "パスワードリセット: ユーザー不在");
                return Err(AppError::UserNotFound);
            }
        };

        let issued = self.signer.sign(&user.email)?;
        let mail = self.build_reset_mail(&user.email, &issued.token);

        let receipt = self.mailer.send_mail(&mail).await.inspect_err(|e| {
            tracing::warn!(email = %email, error = %e, "リセットメール送信失敗（トークンは保存しない）");
        })?;

        // 以前のトークンはここで上書きされ無効になる（password_hash には触れない）
        self.store
            .set_reset_token(user.id, &issued.token, issued.expires_at)
            .await?;

        tracing::info!(
            email = %email,
            response = %receipt.response,
            expires_at = %issued.expires_at,
            "パスワードリセットメール送信完了"
        );

        Ok(())
    }

    /// パスワードをリセット
    ///
    /// 失敗時はいずれの分岐でもレコードを変更しない。
    /// 同じトークンでの同時リクエストは1件だけ成功する。
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        // レコード上の現行トークンと完全一致するものだけを受け付ける
        let user = self
            .store
            .find_one(UserFilter::ResetToken(token))
            .await?
            .ok_or_else(|| {
                tracing::info!("リセットトークンに一致するユーザーなし");
                AppError::InvalidOrExpiredToken
            })?;

        let claims = self.signer.decode(token).map_err(|e| {
            tracing::warn!(user_id = %user.id, error = %e, "リセットトークンの署名検証に失敗");
            AppError::InvalidOrExpiredToken
        })?;

        if claims.email != user.email {
            tracing::warn!(user_id = %user.id, "リセットトークンのメールアドレス不一致");
            return Err(AppError::InvalidOrExpiredToken);
        }

        if claims.is_expired(OffsetDateTime::now_utc()) {
            tracing::info!(user_id = %user.id, exp = claims.exp, "期限切れリセットトークン");
            return Err(AppError::InvalidOrExpiredToken);
        }

        let password_hash = hash_password(new_password)?;

        // 検索後に消費・上書きされていれば更新されない
        let consumed = self
            .store
            .consume_reset_token(user.id, token, &password_hash)
            .await?;
        if !consumed {
            tracing::info!(user_id = %user.id, "リセットトークンは既に消費または上書き済み");
            return Err(AppError::InvalidOrExpiredToken);
        }

        tracing::info!(user_id = %user.id, "パスワードリセット完了");

        Ok(())
    }

    /// 期限切れトークンを掃除
    ///
    /// # Returns
    /// クリアしたレコード数
    pub async fn sweep_expired(&self) -> Result<u64, AppError> {
        self.store
            .clear_expired_reset_tokens(OffsetDateTime::now_utc())
            .await
    }

    /// リセットリンクを構築
    pub fn build_reset_link(&self, token: &str) -> String {
        format!(
            "{}/{}",
            self.settings.reset_url_base.trim_end_matches('/'),
            token
        )
    }

    fn build_reset_mail(&self, to: &str, token: &str) -> OutgoingMail {
        let link = self.build_reset_link(token);
        OutgoingMail {
            from: self.settings.from_address.clone(),
            to: to.to_string(),
            subject: RESET_MAIL_SUBJECT.to_string(),
            html: format!(r#"Click <a href="{link}">here</a> to reset your password"#),
        }
    }
}
