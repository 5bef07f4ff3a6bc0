use std::future::Future;

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;

/// ユーザー検索条件（いずれも完全一致）
#[derive(Debug, Clone, Copy)]
pub enum UserFilter<'a> {
    Email(&'a str),
    ResetToken(&'a str),
}

/// ユーザーレコードストア
///
/// リセット処理が触れるのは password_hash と reset_token 系カラムのみ。
/// reset_token の発行同士は後勝ち。消費は現行トークンとの一致を条件に1回だけ成功する。
pub trait UserStore: Clone + Send + Sync + 'static {
    /// 条件に一致するユーザーを1件取得
    fn find_one(
        &self,
        filter: UserFilter<'_>,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    /// リセットトークンを保存（以前のトークンは上書き）
    ///
    /// password_hash には触れない
    fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// トークンがまだ一致する場合のみパスワードを更新しトークンをクリア
    ///
    /// # Returns
    /// 更新できた場合 true（既に消費・上書き済みなら false）
    fn consume_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// 有効期限切れのリセットトークンをクリア
    ///
    /// # Returns
    /// クリアされたレコード数
    fn clear_expired_reset_tokens(
        &self,
        now: OffsetDateTime,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// メールアドレスでユーザーを検索
    ///
    /// # Note
    /// DB セットアップ後は `query_as!` マクロに変更してコンパイル時SQL検証を有効にすること
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, reset_token, reset_token_expires_at,
                   created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// リセットトークンでユーザーを検索
    ///
    /// # Note
    /// 署名・有効期限の検証は呼び出し側で行う
    pub async fn find_by_reset_token(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, reset_token, reset_token_expires_at,
                   created_at, updated_at
            FROM users
            WHERE reset_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    /// リセットトークンを更新
    ///
    /// # Note
    /// reset_token はログに出力しないこと
    pub async fn update_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2,
                reset_token_expires_at = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// トークンが一致する場合のみパスワードを更新しトークンをクリア
    ///
    /// # Returns
    /// 更新された行数（0 なら既に消費または上書き済み）
    pub async fn update_password_with_token(
        &self,
        user_id: Uuid,
        token: &str,
        new_password_hash: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2,
                reset_token = NULL,
                reset_token_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND reset_token = $3
            "#,
        )
        .bind(user_id)
        .bind(new_password_hash)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// 期限切れリセットトークンをクリア
    ///
    /// # Returns
    /// 更新された行数
    pub async fn clear_expired(&self, now: OffsetDateTime) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET reset_token = NULL,
                reset_token_expires_at = NULL,
                updated_at = NOW()
            WHERE reset_token IS NOT NULL
              AND reset_token_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

impl UserStore for UserRepository {
    async fn find_one(&self, filter: UserFilter<'_>) -> Result<Option<User>, AppError> {
        let user = match filter {
            UserFilter::Email(email) => self.find_by_email(email).await?,
            UserFilter::ResetToken(token) => self.find_by_reset_token(token).await?,
        };
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        self.update_reset_token(user_id, token, expires_at).await?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        user_id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let updated = self
            .update_password_with_token(user_id, token, password_hash)
            .await?;
        Ok(updated > 0)
    }

    async fn clear_expired_reset_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        Ok(self.clear_expired(now).await?)
    }
}
