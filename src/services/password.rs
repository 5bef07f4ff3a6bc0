use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher};
#[cfg(test)]
use argon2::{PasswordHash, PasswordVerifier};

use crate::error::AppError;

/// パスワードをargon2idでハッシュ化（ソルトは毎回ランダム）
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!(error = ?e, "パスワードハッシュ生成エラー");
            AppError::Hash(e.to_string())
        })?;
    Ok(hash.to_string())
}

/// パスワードをハッシュと照合（ログイン機能を持たないためテストでのみ使用）
#[cfg(test)]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| {
        tracing::error!(error = ?e, "パスワードハッシュのパースエラー");
        AppError::Hash(e.to_string())
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
