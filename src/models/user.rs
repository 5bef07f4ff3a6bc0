use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// ユーザーレコード
///
/// reset_token は未使用のリセットトークン（平文）を1件だけ保持する。
/// 新規発行で上書き、リセット完了でクリアされる。
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
