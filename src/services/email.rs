use std::future::Future;

#[cfg(feature = "email")]
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
#[cfg(feature = "email")]
use secrecy::ExposeSecret;

use crate::config::Config;
use crate::error::AppError;

/// 送信するメール
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// 送信結果（SMTPサーバーの応答）
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub response: String,
}

/// メール送信
///
/// 1リクエストにつき1回だけ同期的に送信する（リトライ・キューなし）。
/// タイムアウトはトランスポート側の設定に従う。
pub trait Mailer: Clone + Send + Sync + 'static {
    fn send_mail(
        &self,
        mail: &OutgoingMail,
    ) -> impl Future<Output = Result<DeliveryReceipt, AppError>> + Send;
}

#[derive(Clone)]
enum Transport {
    /// 開発用: ログ出力のみ
    Log,
    #[cfg(feature = "email")]
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
}

/// メール送信サービス
///
/// `email` feature 有効かつSMTP設定が揃っている場合のみ lettre で実送信する。
/// それ以外はログ出力のみ（開発モード）。
#[derive(Clone)]
pub struct EmailService {
    transport: Transport,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(config: &Config) -> Result<Self, AppError> {
        if !config.smtp_configured() {
            tracing::info!("SMTP 未設定（開発モード: メールはログ出力のみ）");
            return Ok(Self::log_only());
        }

        #[cfg(feature = "email")]
        {
            Self::smtp(config)
        }

        #[cfg(not(feature = "email"))]
        {
            tracing::warn!("SMTP 設定がありますが email feature が無効です（ログ出力のみ）");
            Ok(Self::log_only())
        }
    }

    /// ログ出力のみのサービス
    pub fn log_only() -> Self {
        Self {
            transport: Transport::Log,
        }
    }

    #[cfg(feature = "email")]
    fn smtp(config: &Config) -> Result<Self, AppError> {
        let (Some(host), Some(username), Some(password)) = (
            &config.smtp_host,
            &config.smtp_username,
            &config.smtp_password,
        ) else {
            return Ok(Self::log_only());
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| {
                tracing::error!(error = ?e, host = %host, "SMTPトランスポートの初期化に失敗");
                AppError::Internal(anyhow::anyhow!("failed to create SMTP transport: {e}"))
            })?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            ))
            .build();

        tracing::info!(host = %host, port = config.smtp_port, "SMTP トランスポートを初期化");

        Ok(Self {
            transport: Transport::Smtp(transport),
        })
    }

    #[cfg(feature = "email")]
    fn build_message(mail: &OutgoingMail) -> Result<Message, AppError> {
        let from = mail.from.parse::<Mailbox>().map_err(|e| {
            AppError::Delivery(anyhow::anyhow!("invalid from address: {e}"))
        })?;
        let to = mail
            .to
            .parse::<Mailbox>()
            .map_err(|e| AppError::Delivery(anyhow::anyhow!("invalid to address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(mail.html.clone())
            .map_err(|e| AppError::Delivery(anyhow::anyhow!("failed to build message: {e}")))
    }
}

impl Mailer for EmailService {
    async fn send_mail(&self, mail: &OutgoingMail) -> Result<DeliveryReceipt, AppError> {
        match &self.transport {
            Transport::Log => {
                // 開発モード: 本文にトークンを含むためリンクはdebugレベルでのみ出力
                tracing::info!(to = %mail.to, subject = %mail.subject, "メール送信（開発モード）");
                tracing::debug!(html = %mail.html, "メール本文（開発モード）");
                Ok(DeliveryReceipt {
                    response: "logged".to_string(),
                })
            }
            #[cfg(feature = "email")]
            Transport::Smtp(smtp) => {
                let message = Self::build_message(mail)?;
                let response = smtp
                    .send(message)
                    .await
                    .map_err(|e| AppError::Delivery(anyhow::Error::new(e)))?;

                let text = response
                    .message()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                Ok(DeliveryReceipt {
                    response: format!("{} {}", response.code(), text),
                })
            }
        }
    }
}
