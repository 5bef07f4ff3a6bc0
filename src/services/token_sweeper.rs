use std::time::Duration;

use tokio::task::JoinHandle;

use crate::repositories::UserStore;
use crate::services::email::Mailer;
use crate::services::password_reset::PasswordResetService;

/// 期限切れリセットトークンを1回掃除
///
/// 失敗してもログ出力のみ（次回の周期で再試行される）
pub async fn run_once<S: UserStore, M: Mailer>(service: &PasswordResetService<S, M>) {
    tracing::debug!("期限切れリセットトークン掃除: 開始");
    match service.sweep_expired().await {
        Ok(0) => {}
        Ok(cleared) => tracing::info!(cleared, "期限切れリセットトークン掃除: 完了"),
        Err(e) => tracing::error!(error = ?e, "期限切れリセットトークン掃除に失敗"),
    }
}

/// 掃除タスクを起動（interval が 0 の場合は起動しない）
pub fn spawn<S: UserStore, M: Mailer>(
    service: PasswordResetService<S, M>,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        tracing::info!("期限切れリセットトークン掃除は無効");
        return None;
    }

    tracing::info!(interval_secs, "期限切れリセットトークン掃除タスクを起動");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_once(&service).await;
        }
    }))
}
