//! HTTP API DTOs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::websocket::MessageType;

/// Live registry counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDto {
    pub connections: usize,
    pub online_users: usize,
    pub active_chats: usize,
    /// Records still flagged active in the connection audit store
    pub active_connection_records: usize,
}

/// Presence of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceDto {
    pub user_id: String,
    pub online: bool,
    pub connections: usize,
}

/// Online users listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUsersDto {
    pub user_ids: Vec<String>,
}

/// Subscribers of one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSubscribersDto {
    pub chat_id: String,
    pub connection_ids: Vec<String>,
}

/// Event pushed by a trusted upstream service for fan-out to a chat
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatEventRequestDto {
    pub r#type: MessageType,
    #[serde(default)]
    pub data: Value,
}
