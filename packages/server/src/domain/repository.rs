//! Repository trait 定義
//!
//! エンジンが接続の監査ログを残すために必要とするインターフェース。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。
//!
//! Hub からの呼び出しはすべて fire-and-forget です。失敗はログに残るだけで、
//! メモリ上の登録・解除処理をブロックしません。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ConnectionId, ConnectionRecord, RepositoryError};

/// Connection audit store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    /// Insert a record for a freshly registered connection
    async fn record_connection(&self, record: ConnectionRecord) -> Result<(), RepositoryError>;

    /// Flip a connection's active flag off
    async fn deactivate_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<(), RepositoryError>;

    /// Refresh a connection's last-heartbeat timestamp
    async fn update_heartbeat(
        &self,
        connection_id: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Mark inactive every active record whose heartbeat is older than `stale_before`.
    ///
    /// Returns the ids that were swept.
    async fn sweep_stale_connections(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<ConnectionId>, RepositoryError>;

    /// Look up one record
    async fn find_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Option<ConnectionRecord>, RepositoryError>;

    /// Number of records still flagged active
    async fn count_active_connections(&self) -> Result<usize, RepositoryError>;
}
