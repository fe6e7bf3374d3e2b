//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chathub_shared::time::Clock;
use serde_json::json;

use crate::{
    domain::{ChatId, UserId},
    infrastructure::dto::{
        http::{ChatEventRequestDto, ChatSubscribersDto, OnlineUsersDto, PresenceDto, StatsDto},
        websocket::{Envelope, MessageType},
    },
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Live registry counters plus the audit store's active record count
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsDto>, StatusCode> {
    let stats = state.hub.stats().await;
    let active_connection_records = state
        .repository
        .count_active_connections()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to count active connection records");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(StatsDto {
        connections: stats.connections,
        online_users: stats.online_users,
        active_chats: stats.active_chats,
        active_connection_records,
    }))
}

/// Presence of one user
pub async fn get_user_presence(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceDto>, StatusCode> {
    let user_id = UserId::try_from(user_id).map_err(|e| {
        tracing::warn!(error = %e, "Invalid user_id in presence lookup");
        StatusCode::BAD_REQUEST
    })?;

    let connections = state.hub.user_connection_count(&user_id).await;
    Ok(Json(PresenceDto {
        user_id: user_id.into_string(),
        online: connections > 0,
        connections,
    }))
}

pub async fn get_online_users(State(state): State<Arc<AppState>>) -> Json<OnlineUsersDto> {
    let user_ids = state
        .hub
        .online_users()
        .await
        .into_iter()
        .map(UserId::into_string)
        .collect();
    Json(OnlineUsersDto { user_ids })
}

pub async fn get_chat_subscribers(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatSubscribersDto>, StatusCode> {
    let chat_id = ChatId::try_from(chat_id).map_err(|e| {
        tracing::warn!(error = %e, "Invalid chat_id in subscriber lookup");
        StatusCode::BAD_REQUEST
    })?;

    let connection_ids = state
        .hub
        .chat_subscribers(&chat_id)
        .await
        .into_iter()
        .map(|id| id.into_string())
        .collect();
    Ok(Json(ChatSubscribersDto {
        chat_id: chat_id.into_string(),
        connection_ids,
    }))
}

/// Fan an event from a trusted upstream service out to a chat.
///
/// Used for changes that originate outside the socket layer (message edits
/// and deletions, chat metadata updates). The payload is stamped with the
/// path's `chat_id` and the server time.
pub async fn post_chat_event(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Json(request): Json<ChatEventRequestDto>,
) -> StatusCode {
    let chat_id = match ChatId::try_from(chat_id) {
        Ok(chat_id) => chat_id,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid chat_id in chat event");
            return StatusCode::BAD_REQUEST;
        }
    };
    if request.r#type == MessageType::Unknown {
        tracing::warn!(chat_id = %chat_id, "Rejecting chat event of unknown type");
        return StatusCode::BAD_REQUEST;
    }

    let mut envelope = Envelope::new(request.r#type, request.data, state.hub.clock().now());
    envelope.stamp([("chat_id", json!(chat_id.as_str()))]);

    match state.hub.broadcast_to_chat(chat_id.clone(), envelope, None).await {
        Ok(()) => {
            tracing::info!(
                chat_id = %chat_id,
                kind = ?request.r#type,
                "Accepted chat event"
            );
            StatusCode::ACCEPTED
        }
        Err(e) => {
            tracing::error!(chat_id = %chat_id, error = %e, "Failed to enqueue chat event");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
