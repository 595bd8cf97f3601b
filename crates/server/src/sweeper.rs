//! # 保持期間スイーパー
//!
//! 定期的に古いアップロードとアイドルセッションを破棄する。
//! アップロードの保持期間が未設定の場合、ファイルは削除しない。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppState;

/// スイープ間隔の下限・上限。
const MIN_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// 1回のスイープ結果。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// 削除したファイル数
    pub artifacts_removed: usize,
    /// 破棄したセッション数
    pub sessions_removed: usize,
}

/// スイープを1回実行する。
pub async fn sweep_once(
    state: &AppState,
    upload_retention: Option<Duration>,
    session_idle: Duration,
) -> SweepReport {
    let artifacts_removed = match upload_retention {
        Some(retention) => match state.store.purge_older_than(retention).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "期限切れアップロードの削除に失敗");
                0
            }
        },
        None => 0,
    };
    let sessions_removed = state.sessions.purge_idle(session_idle).await;

    SweepReport {
        artifacts_removed,
        sessions_removed,
    }
}

/// スイープ間隔。短い方の期限の1/4を `[1秒, 1時間]` に丸める。
pub fn sweep_interval(upload_retention: Option<Duration>, session_idle: Duration) -> Duration {
    let shortest = upload_retention.map_or(session_idle, |r| r.min(session_idle));
    (shortest / 4).clamp(MIN_INTERVAL, MAX_INTERVAL)
}

/// バックグラウンドでスイーパーを起動する。
pub fn spawn(
    state: Arc<AppState>,
    upload_retention: Option<Duration>,
    session_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    let period = sweep_interval(upload_retention, session_idle);
    tracing::info!(
        interval_secs = period.as_secs(),
        retention_secs = upload_retention.map(|r| r.as_secs()),
        "スイーパーを起動します"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = sweep_once(&state, upload_retention, session_idle).await;
            if report != SweepReport::default() {
                tracing::info!(
                    artifacts_removed = report.artifacts_removed,
                    sessions_removed = report.sessions_removed,
                    "スイープ完了"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use crate::storage::StorageKey;
    use crate::test_helpers::test_state;

    #[test]
    fn test_sweep_interval() {
        let day = Duration::from_secs(86400);
        assert_eq!(sweep_interval(None, day), MAX_INTERVAL);
        assert_eq!(
            sweep_interval(Some(Duration::from_secs(400)), day),
            Duration::from_secs(100)
        );
        assert_eq!(sweep_interval(Some(Duration::ZERO), day), MIN_INTERVAL);
    }

    /// 保持期間未設定ではファイルを消さず、セッションのみ破棄すること
    #[tokio::test]
    async fn test_sweep_without_retention_keeps_files() {
        let (state, _dir) = test_state();
        let artifact = state
            .store
            .put("keep.pdf", &mut &b"%PDF-1.4"[..], None)
            .await
            .unwrap();
        state
            .sessions
            .bind_current(&SessionId::generate(), artifact.key.clone())
            .await;

        let report = sweep_once(&state, None, Duration::ZERO).await;
        assert_eq!(report.artifacts_removed, 0);
        assert_eq!(report.sessions_removed, 1);
        assert!(artifact.stored_at.exists());
    }

    #[tokio::test]
    async fn test_sweep_with_retention_removes_files() {
        let (state, _dir) = test_state();
        let artifact = state
            .store
            .put("old.pdf", &mut &b"%PDF-1.4"[..], None)
            .await
            .unwrap();
        let session = SessionId::generate();
        state.sessions.bind_current(&session, artifact.key.clone()).await;

        let report = sweep_once(&state, Some(Duration::ZERO), Duration::from_secs(3600)).await;
        assert_eq!(report.artifacts_removed, 1);
        assert_eq!(report.sessions_removed, 0);
        assert!(!artifact.stored_at.exists());

        // セッションは残るが、ファイル消失は NotFound として扱われる
        let key: StorageKey = state.sessions.resolve_current(&session).await.unwrap();
        assert!(state.store.open(key.as_str()).await.is_err());
    }
}
