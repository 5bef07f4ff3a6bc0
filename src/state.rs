use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::UserRepository;
use crate::services::{EmailService, PasswordResetService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
/// テストではストア・メーラーをインメモリ実装に差し替える。
#[derive(Clone)]
pub struct AppState<S = UserRepository, M = EmailService> {
    /// パスワードリセットサービス
    pub password_reset: PasswordResetService<S, M>,
    /// 未登録メールアドレスにも成功レスポンスを返すか
    pub conceal_account_existence: bool,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: &Config) -> Result<Self, AppError> {
        let user_repo = UserRepository::new(db_pool);
        let email_service = EmailService::new(config)?;
        let signer = config.reset_token_signer()?;

        let password_reset =
            PasswordResetService::new(user_repo, email_service, signer, config.reset_settings());

        if config.conceal_account_existence {
            tracing::info!("未登録メールアドレスの存在を隠蔽するモードで起動");
        }

        Ok(Self::from_parts(
            password_reset,
            config.conceal_account_existence,
        ))
    }
}

impl<S, M> AppState<S, M> {
    /// 構築済みのサービスから AppState を作成
    pub fn from_parts(
        password_reset: PasswordResetService<S, M>,
        conceal_account_existence: bool,
    ) -> Self {
        Self {
            password_reset,
            conceal_account_existence,
        }
    }
}
