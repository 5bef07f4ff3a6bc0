use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` の拒否応答を `AppError`（400 + `{message}`）に置き換えた抽出子
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
