use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("ユーザーが見つかりません")]
    UserNotFound,

    #[error("無効または期限切れのトークンです")]
    InvalidOrExpiredToken,

    #[error("メール送信エラー")]
    Delivery(#[source] anyhow::Error),

    #[error("データベースエラー")]
    Store(#[from] sqlx::Error),

    #[error("パスワードハッシュエラー: {0}")]
    Hash(String),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// レスポンスの `err` に載せる短い識別子（内部詳細は含めない）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UserNotFound => "user_not_found",
            Self::InvalidOrExpiredToken => "invalid_or_expired_token",
            Self::Delivery(_) => "delivery_failure",
            Self::Store(_) => "store_failure",
            Self::Hash(_) => "hash_failure",
            Self::Internal(_) => "internal",
        }
    }

    /// クライアント入力起因のエラーか（400系）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::UserNotFound | Self::InvalidOrExpiredToken
        )
    }

    /// サーバー側エラーをログ出力
    fn log_server_error(&self) {
        match self {
            Self::Delivery(e) => tracing::error!(error = ?e, "メール送信エラー"),
            Self::Store(e) => tracing::error!(error = ?e, "データベースエラー"),
            Self::Hash(e) => tracing::error!(error = %e, "パスワードハッシュエラー"),
            Self::Internal(e) => tracing::error!(error = ?e, "内部エラー"),
            _ => {}
        }
    }
}

/// JSONボディの抽出失敗（Content-Type不一致・構文エラー・必須フィールド欠落）は400
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "リクエストボディの抽出に失敗");
        Self::Validation(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// ルートごとに500時の文言を差し替えるためのエラーラッパー
#[derive(Debug)]
pub struct RouteError {
    pub error: AppError,
    pub server_message: &'static str,
    pub expose_kind: bool,
}

impl RouteError {
    pub fn new(error: AppError, server_message: &'static str) -> Self {
        Self {
            error,
            server_message,
            expose_kind: false,
        }
    }

    /// 500レスポンスに `err` を含める
    pub fn with_kind(mut self) -> Self {
        self.expose_kind = true;
        self
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        if self.error.is_client_error() {
            return self.error.into_response();
        }

        self.error.log_server_error();
        let body = ErrorResponse {
            message: self.server_message.to_string(),
            err: self.expose_kind.then(|| self.error.kind().to_string()),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::UserNotFound => (StatusCode::BAD_REQUEST, "User not found".to_string()),
            Self::InvalidOrExpiredToken => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired token".to_string(),
            ),
            Self::Delivery(_) | Self::Store(_) | Self::Hash(_) | Self::Internal(_) => {
                self.log_server_error();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { message, err: None })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_bad_request() {
        for error in [
            AppError::UserNotFound,
            AppError::InvalidOrExpiredToken,
            AppError::Validation("bad".to_string()),
        ] {
            assert!(error.is_client_error());
            assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_server_errors_are_internal() {
        let errors = [
            AppError::Delivery(anyhow::anyhow!("smtp down")),
            AppError::Store(sqlx::Error::PoolTimedOut),
            AppError::Hash("salt".to_string()),
            AppError::Internal(anyhow::anyhow!("boom")),
        ];
        for error in errors {
            assert!(!error.is_client_error());
            let response = RouteError::new(error, "failed").into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_route_error_passes_client_errors_through() {
        let response =
            RouteError::new(AppError::InvalidOrExpiredToken, "Error updating password")
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(
            AppError::Delivery(anyhow::anyhow!("x")).kind(),
            "delivery_failure"
        );
        assert_eq!(AppError::Store(sqlx::Error::PoolClosed).kind(), "store_failure");
    }
}
