use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, RouteError};
use crate::handlers::extract::AppJson;
use crate::repositories::UserStore;
use crate::services::email::Mailer;
use crate::state::AppState;

const RESET_EMAIL_SENT: &str = "Password reset email sent";
const PASSWORD_CHANGED: &str = "Password has been changed successfully";
const REQUEST_FAILED: &str = "Error occurred while resetting password";
const UPDATE_FAILED: &str = "Error updating password";

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

// === リセットリクエスト ===

#[derive(Debug, Deserialize)]
pub struct ResetRequestRequest {
    pub email: String,
}

/// POST /forgotpassword
///
/// # Security
/// `conceal_account_existence` 有効時は未登録でも200を返す（存在有無を漏洩しない）
pub async fn request_password_reset<S: UserStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    AppJson(request): AppJson<ResetRequestRequest>,
) -> Result<Json<MessageResponse>, RouteError> {
    validate_email(&request.email).map_err(|e| RouteError::new(e, REQUEST_FAILED))?;

    match state.password_reset.request_reset(&request.email).await {
        Ok(()) => Ok(MessageResponse::new(RESET_EMAIL_SENT)),
        Err(AppError::UserNotFound) if state.conceal_account_existence => {
            Ok(MessageResponse::new(RESET_EMAIL_SENT))
        }
        Err(e) => Err(RouteError::new(e, REQUEST_FAILED).with_kind()),
    }
}

// === パスワードリセット実行 ===

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// POST /forgotpassword/resetpassword/{token}
///
/// # Security
/// - token, password はログに出力しない
pub async fn reset_password<S: UserStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    Path(token): Path<String>,
    AppJson(request): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, RouteError> {
    validate_reset_password_request(&token, &request)
        .map_err(|e| RouteError::new(e, UPDATE_FAILED))?;

    state
        .password_reset
        .reset_password(&token, &request.password)
        .await
        .map_err(|e| RouteError::new(e, UPDATE_FAILED))?;

    Ok(MessageResponse::new(PASSWORD_CHANGED))
}

/// メールアドレスのバリデーション
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AppError::Validation(
            "A valid email address is required".to_string(),
        ));
    }
    Ok(())
}

/// リセットパスワードリクエストのバリデーション（強度ポリシーはなし）
fn validate_reset_password_request(
    token: &str,
    request: &ResetPasswordRequest,
) -> Result<(), AppError> {
    if token.trim().is_empty() {
        return Err(AppError::InvalidOrExpiredToken);
    }
    if request.password.is_empty() {
        return Err(AppError::Validation("Password is required".to_string()));
    }
    Ok(())
}
