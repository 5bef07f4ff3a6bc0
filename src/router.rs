use axum::{Router, routing::post};

use crate::handlers;
use crate::repositories::UserStore;
use crate::services::email::Mailer;
use crate::state::AppState;

/// Router の構築
///
/// リセットリンクは `/forgotpassword/resetpassword/{token}` を指す。
pub fn create_router<S: UserStore, M: Mailer>(state: AppState<S, M>) -> Router {
    Router::new()
        .route(
            "/forgotpassword",
            post(handlers::request_password_reset::<S, M>),
        )
        .route(
            "/forgotpassword/",
            post(handlers::request_password_reset::<S, M>),
        )
        .route(
            "/forgotpassword/resetpassword/{token}",
            post(handlers::reset_password::<S, M>),
        )
        .with_state(state)
}
