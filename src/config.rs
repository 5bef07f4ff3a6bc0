use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;

use crate::error::AppError;
use crate::services::password_reset::ResetSettings;
use crate::services::reset_token::ResetTokenSigner;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,

    // パスワードリセット設定
    #[serde(default)]
    pub password_reset_url_base: Option<String>,
    #[serde(default = "default_password_reset_token_ttl_secs")]
    pub password_reset_token_ttl_secs: i64,
    /// リセットトークン署名用シークレット（32バイト以上）
    pub password_reset_secret: SecretBox<String>,
    /// 期限切れトークン掃除の間隔（0で無効）
    #[serde(default = "default_password_reset_sweep_interval_secs")]
    pub password_reset_sweep_interval_secs: u64,
    /// 未登録メールアドレスにも成功レスポンスを返す
    #[serde(default)]
    pub conceal_account_existence: bool,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_PASSWORD_RESET_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_PASSWORD_RESET_URL_BASE: &str = "http://localhost:3000/forgotpassword/resetpassword";
const DEFAULT_FROM_ADDRESS: &str = "no-reply@localhost";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_password_reset_token_ttl_secs() -> i64 {
    DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS
}

fn default_password_reset_sweep_interval_secs() -> u64 {
    DEFAULT_PASSWORD_RESET_SWEEP_INTERVAL_SECS
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// SMTP送信に必要な設定がすべて揃っているか
    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_username.is_some() && self.smtp_password.is_some()
    }

    /// 送信元アドレス（未設定時はローカル既定値）
    pub fn from_address(&self) -> String {
        self.smtp_from_address
            .clone()
            .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string())
    }

    /// パスワードリセット処理に注入する設定を構築
    pub fn reset_settings(&self) -> ResetSettings {
        ResetSettings {
            reset_url_base: self
                .password_reset_url_base
                .clone()
                .unwrap_or_else(|| DEFAULT_PASSWORD_RESET_URL_BASE.to_string()),
            from_address: self.from_address(),
        }
    }

    /// 設定済みシークレットとTTLから署名器を構築
    pub fn reset_token_signer(&self) -> Result<ResetTokenSigner, AppError> {
        ResetTokenSigner::new(
            self.password_reset_secret.expose_secret().as_bytes(),
            self.password_reset_token_ttl_secs,
        )
    }
}
