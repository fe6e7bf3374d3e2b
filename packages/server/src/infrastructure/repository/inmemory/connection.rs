//! InMemory Connection Repository 実装
//!
//! ドメイン層が定義する ConnectionRepository trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。
//!
//! 本番では接続の監査ログはリレーショナル DB に置かれます。この実装は
//! 単一プロセス構成とテストのための代替品です。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ConnectionId, ConnectionRecord, ConnectionRepository, RepositoryError};

/// インメモリ Connection Repository 実装
#[derive(Default)]
pub struct InMemoryConnectionRepository {
    /// Key: connection_id, Value: 監査レコード
    records: Mutex<HashMap<ConnectionId, ConnectionRecord>>,
}

impl InMemoryConnectionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn record_connection(&self, record: ConnectionRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().await;
        records.insert(record.connection_id.clone(), record);
        Ok(())
    }

    async fn deactivate_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(connection_id)
            .ok_or_else(|| RepositoryError::ConnectionNotFound(connection_id.to_string()))?;
        record.active = false;
        Ok(())
    }

    async fn update_heartbeat(
        &self,
        connection_id: &ConnectionId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(connection_id)
            .ok_or_else(|| RepositoryError::ConnectionNotFound(connection_id.to_string()))?;
        if at > record.last_heartbeat {
            record.last_heartbeat = at;
        }
        Ok(())
    }

    async fn sweep_stale_connections(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<ConnectionId>, RepositoryError> {
        let mut records = self.records.lock().await;
        let mut swept: Vec<ConnectionId> = records
            .values_mut()
            .filter(|record| record.is_stale(stale_before))
            .map(|record| {
                record.active = false;
                record.connection_id.clone()
            })
            .collect();
        swept.sort();
        Ok(swept)
    }

    async fn find_connection(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Option<ConnectionRecord>, RepositoryError> {
        let records = self.records.lock().await;
        Ok(records.get(connection_id).cloned())
    }

    async fn count_active_connections(&self) -> Result<usize, RepositoryError> {
        let records = self.records.lock().await;
        Ok(records.values().filter(|record| record.active).count())
    }
}
