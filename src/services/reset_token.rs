use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// 署名シークレットの最小長（バイト）
const MIN_SECRET_LEN: usize = 32;

/// トークンに埋め込むクレーム
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetClaims {
    pub email: String,
    /// 発行時刻（UNIX秒）
    pub iat: i64,
    /// 有効期限（UNIX秒）
    pub exp: i64,
    /// 同一秒内の発行を区別するためのランダム値
    pub jti: String,
}

impl ResetClaims {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.exp <= now.unix_timestamp()
    }
}

/// 発行済みトークン
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("トークン形式が不正")]
    Malformed,
    #[error("署名が一致しない")]
    BadSignature,
}

/// リセットトークンの署名・検証
///
/// 形式: `base64url(claims_json).base64url(HMAC-SHA256(secret, claims部))`
///
/// # Security
/// - シークレットはログに出力しない
/// - 署名検証は定数時間比較（`verify_slice`）
#[derive(Clone)]
pub struct ResetTokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl ResetTokenSigner {
    /// 新しい ResetTokenSigner を作成
    ///
    /// # Arguments
    /// * `secret` - 32バイト以上の署名シークレット
    /// * `ttl_secs` - トークン有効期間（秒、正の値）
    pub fn new(secret: &[u8], ttl_secs: i64) -> Result<Self, AppError> {
        if secret.len() < MIN_SECRET_LEN {
            tracing::error!(
                expected_min = MIN_SECRET_LEN,
                actual = secret.len(),
                "リセットトークン署名シークレットが短すぎる"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "password reset secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if ttl_secs <= 0 {
            tracing::error!(ttl_secs, "リセットトークンの有効期間が不正");
            return Err(AppError::Internal(anyhow::anyhow!(
                "password reset token ttl must be positive"
            )));
        }

        Ok(Self {
            secret: secret.to_vec(),
            ttl_secs,
        })
    }

    /// 現在時刻でトークンを発行
    pub fn sign(&self, email: &str) -> Result<IssuedToken, AppError> {
        self.sign_at(email, OffsetDateTime::now_utc())
    }

    /// 指定時刻を発行時刻としてトークンを発行
    pub fn sign_at(&self, email: &str, issued_at: OffsetDateTime) -> Result<IssuedToken, AppError> {
        let iat = issued_at.unix_timestamp();
        let expires_at = iat
            .checked_add(self.ttl_secs)
            .and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
            .ok_or_else(|| {
                tracing::error!(iat, ttl_secs = self.ttl_secs, "有効期限の計算エラー");
                AppError::Internal(anyhow::anyhow!("token expiry out of range"))
            })?;
        let exp = expires_at.unix_timestamp();

        let claims = ResetClaims {
            email: email.to_string(),
            iat,
            exp,
            jti: generate_jti(),
        };
        let claims_json = serde_json::to_vec(&claims).map_err(|e| {
            tracing::error!(error = ?e, "クレームのシリアライズエラー");
            AppError::Internal(anyhow::anyhow!("claims serialization error"))
        })?;
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims_json);
        let signature = self.mac(claims_b64.as_bytes())?.finalize().into_bytes();
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature);

        Ok(IssuedToken {
            token: format!("{claims_b64}.{signature_b64}"),
            expires_at,
        })
    }

    /// 署名を検証してクレームを取り出す
    ///
    /// # Note
    /// 有効期限の判定は呼び出し側で `ResetClaims::is_expired` を使って行う
    pub fn decode(&self, token: &str) -> Result<ResetClaims, TokenError> {
        let (claims_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        self.mac(claims_b64.as_bytes())
            .map_err(|_| TokenError::BadSignature)?
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| TokenError::Malformed)?;
        serde_json::from_slice(&claims_json).map_err(|_| TokenError::Malformed)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| {
            tracing::error!(error = ?e, "HMAC初期化エラー");
            AppError::Internal(anyhow::anyhow!("hmac initialization error"))
        })?;
        mac.update(data);
        Ok(mac)
    }
}

/// 16バイトのランダム値をBase64URLで生成
fn generate_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
