//! Domain entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_object::{ConnectionId, UserId};

/// Audit trail of one connection's lifetime, owned by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    /// Transport-level identity of the socket (peer address)
    pub socket_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub active: bool,
}

impl ConnectionRecord {
    /// Create an active record whose heartbeat starts at the connection time
    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        socket_id: String,
        connected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            socket_id,
            connected_at,
            last_heartbeat: connected_at,
            active: true,
        }
    }

    /// Whether the heartbeat is older than `stale_before`
    pub fn is_stale(&self, stale_before: DateTime<Utc>) -> bool {
        self.active && self.last_heartbeat < stale_before
    }
}
