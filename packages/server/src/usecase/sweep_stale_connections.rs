//! UseCase: stale 接続のスイープ
//!
//! ハーフオープンの TCP 接続はソケット側で検知されるまで時間がかかるため、
//! 監査ログ上のハートビートが閾値より古いレコードを定期的に無効化します。
//! メモリ上のレジストリには触れません（そちらは read deadline が担当）。

use std::{sync::Arc, time::Duration};

use chathub_shared::time::Clock;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;

use crate::domain::{ConnectionId, ConnectionRepository, RepositoryError};

/// stale 接続スイープのユースケース
pub struct SweepStaleConnectionsUseCase {
    repository: Arc<dyn ConnectionRepository>,
    clock: Arc<dyn Clock>,
    stale_threshold: Duration,
}

impl SweepStaleConnectionsUseCase {
    pub fn new(
        repository: Arc<dyn ConnectionRepository>,
        clock: Arc<dyn Clock>,
        stale_threshold: Duration,
    ) -> Self {
        Self {
            repository,
            clock,
            stale_threshold,
        }
    }

    /// Cutoff below which a heartbeat counts as stale
    pub fn stale_before(&self) -> DateTime<Utc> {
        let threshold = TimeDelta::from_std(self.stale_threshold).unwrap_or(TimeDelta::MAX);
        self.clock
            .now()
            .checked_sub_signed(threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// スイープを 1 回実行し、無効化した接続 ID を返す
    pub async fn execute(&self) -> Result<Vec<ConnectionId>, RepositoryError> {
        let stale_before = self.stale_before();
        let swept = self
            .repository
            .sweep_stale_connections(stale_before)
            .await?;
        if swept.is_empty() {
            tracing::debug!(%stale_before, "No stale connections");
        } else {
            tracing::info!(
                %stale_before,
                swept = swept.len(),
                "Marked stale connections inactive"
            );
        }
        Ok(swept)
    }
}

/// Run the sweep every `interval` until the returned task is aborted
pub fn spawn_janitor(
    usecase: Arc<SweepStaleConnectionsUseCase>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup does not sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = usecase.execute().await {
                tracing::warn!(error = %e, "Stale connection sweep failed");
            }
        }
    })
}
