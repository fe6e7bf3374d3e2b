//! WebSocket connection handlers.
//!
//! Each upgraded socket gets two loops:
//!
//! - reader: decodes inbound envelopes and hands them to the router
//! - writer: drains the connection's outbox onto the socket and sends keep-alive pings
//!
//! When either loop ends, the other one is aborted and the connection is
//! unregistered from the hub.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ConnectInfo, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;

use crate::{
    config::HubConfig,
    domain::UserId,
    infrastructure::{
        dto::websocket::Envelope,
        hub::{ClientRegistration, DisconnectReason, OutboxReceiver, outbox},
    },
    ui::state::AppState,
    usecase::{ClientContext, route_message::error_envelope},
};

/// Query parameters for WebSocket connection.
///
/// `user_id` has already been resolved by the upstream auth gateway.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    // Convert String -> UserId (Domain Model)
    let user_id = match UserId::try_from(query.user_id) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Rejecting upgrade with invalid user_id");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, peer)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: UserId, peer: SocketAddr) {
    let (outbox, receiver) = outbox(state.config.outbox_capacity);

    let connection_id = match state
        .hub
        .register(ClientRegistration {
            connection_id: None,
            user_id: user_id.clone(),
            socket_id: peer.to_string(),
            outbox: outbox.clone(),
        })
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Failed to register connection");
            return;
        }
    };

    let client = ClientContext {
        connection_id: connection_id.clone(),
        user_id,
        outbox,
    };
    let (sink, stream) = socket.split();

    let mut write_task = tokio::spawn(write_loop(sink, receiver, state.config.clone()));
    let mut read_task = tokio::spawn(read_loop(stream, state.clone(), client));

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    };

    state
        .hub
        .unregister(connection_id, DisconnectReason::ConnectionClosed);
}

/// Inbound side of one connection
async fn read_loop(mut stream: SplitStream<WebSocket>, state: Arc<AppState>, client: ClientContext) {
    let read_timeout = state.config.read_timeout;
    loop {
        let message = match tokio::time::timeout(read_timeout, stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %client.connection_id, error = %e, "WebSocket error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(
                    connection_id = %client.connection_id,
                    timeout = ?read_timeout,
                    "Read deadline expired"
                );
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if !handle_text(&state, &client, text.as_str()).await {
                    break;
                }
            }
            Message::Binary(bytes) => {
                tracing::warn!(
                    connection_id = %client.connection_id,
                    len = bytes.len(),
                    "Dropping binary frame"
                );
            }
            Message::Pong(_) => state.hub.touch(&client.connection_id),
            // Pings are answered by the WebSocket layer
            Message::Ping(_) => {}
            Message::Close(_) => {
                tracing::info!(connection_id = %client.connection_id, "Client requested close");
                break;
            }
        }
    }
}

/// Route one text frame; `false` means the connection must go
async fn handle_text(state: &AppState, client: &ClientContext, text: &str) -> bool {
    let envelope = match Envelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                connection_id = %client.connection_id,
                error = %e,
                "Dropping undecodable frame"
            );
            return true;
        }
    };
    let correlation_id = envelope.id.clone();

    let Err(e) = state.route_message_usecase.execute(client, envelope).await else {
        return true;
    };

    if e.is_slow_consumer() {
        tracing::warn!(connection_id = %client.connection_id, error = %e, "Evicting slow consumer");
        state
            .hub
            .unregister(client.connection_id.clone(), DisconnectReason::SlowConsumer);
        return false;
    }

    tracing::debug!(connection_id = %client.connection_id, error = %e, "Rejected envelope");
    let reply = error_envelope(&e, correlation_id, state.hub.clock().as_ref());
    if let Err(push_error) = client.outbox.push_envelope(&reply) {
        tracing::warn!(
            connection_id = %client.connection_id,
            error = %push_error,
            "Failed to deliver error envelope"
        );
        state
            .hub
            .unregister(client.connection_id.clone(), DisconnectReason::SlowConsumer);
        return false;
    }
    true
}

/// Outbound side of one connection
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut receiver: OutboxReceiver,
    config: HubConfig,
) {
    let mut ping_ticker = tokio::time::interval(config.ping_interval);
    // The first tick completes immediately
    ping_ticker.tick().await;

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(frame) = frame else {
                    // Outbox closed by the hub
                    let _ = send_with_timeout(&mut sink, Message::Close(None), config.write_timeout).await;
                    break;
                };
                let text = if config.coalesce_writes {
                    coalesce(frame, &mut receiver, config.max_coalesced_frames)
                } else {
                    frame
                };
                if !send_with_timeout(&mut sink, Message::Text(text.into()), config.write_timeout).await {
                    break;
                }
            }
            _ = ping_ticker.tick() => {
                if !send_with_timeout(&mut sink, Message::Ping(Default::default()), config.write_timeout).await {
                    break;
                }
            }
        }
    }
}

async fn send_with_timeout(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    write_timeout: Duration,
) -> bool {
    match tokio::time::timeout(write_timeout, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Socket write failed");
            false
        }
        Err(_) => {
            tracing::warn!(timeout = ?write_timeout, "Socket write timed out");
            false
        }
    }
}

/// Join `first` and up to `max_frames - 1` already queued frames with `\n`
fn coalesce(first: String, receiver: &mut OutboxReceiver, max_frames: usize) -> String {
    let mut batch = first;
    for _ in 1..max_frames {
        let Some(next) = receiver.try_next() else {
            break;
        };
        batch.push('\n');
        batch.push_str(&next);
    }
    batch
}
