//! The connection hub: a single task owning every routing table.
//!
//! ## 責務
//!
//! - 接続の登録・解除（register / unregister）
//! - チャット購読の管理（subscribe / unsubscribe）
//! - チャット単位・ユーザー単位・全体へのファンアウト（broadcast）
//! - プレゼンス（オンライン / オフライン）遷移の通知
//!
//! ## 設計ノート
//!
//! マップを書き換えるのは [`Hub::run`] のタスクだけです。他のタスクは
//! [`HubHandle`] のチャンネル経由で依頼を送ります。読み取り専用の問い合わせ
//! （オンライン判定・統計など）は短時間の read lock で直接参照します。

mod actor;
mod audit;
pub mod outbox;
pub mod registry;

use std::sync::Arc;

use chathub_shared::time::Clock;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::{
    domain::{ChatId, ConnectionId, UserId},
    infrastructure::dto::websocket::Envelope,
};

use audit::{AuditCommand, AuditSender};

pub use actor::Hub;
pub use outbox::{Outbox, OutboxReceiver, PushError, outbox};
pub use registry::{Registry, RegistryStats};

/// Errors returned by [`HubHandle`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,
}

impl<T> From<mpsc::error::SendError<T>> for HubError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::Closed
    }
}

impl From<oneshot::error::RecvError> for HubError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::Closed
    }
}

/// Why a connection left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Reader or writer loop ended (close frame, socket error, read deadline)
    ConnectionClosed,
    /// Outbox full or closed during fan-out
    SlowConsumer,
}

/// A connection asking to be promoted into the registry
pub struct ClientRegistration {
    /// Reuse an id instead of generating one
    pub connection_id: Option<ConnectionId>,
    pub user_id: UserId,
    pub socket_id: String,
    pub outbox: Outbox,
}

/// Fan-out scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastTarget {
    Chat(ChatId),
    User(UserId),
    All,
}

pub(crate) struct RegisterRequest {
    registration: ClientRegistration,
    ack: oneshot::Sender<ConnectionId>,
}

pub(crate) struct UnregisterRequest {
    connection_id: ConnectionId,
    reason: DisconnectReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

pub(crate) struct SubscriptionRequest {
    connection_id: ConnectionId,
    chat_ids: Vec<ChatId>,
    action: SubscriptionAction,
    ack: oneshot::Sender<usize>,
}

pub(crate) struct BroadcastRequest {
    target: BroadcastTarget,
    envelope: Envelope,
    exclude: Option<ConnectionId>,
}

/// Cheap, cloneable handle to a running [`Hub`]
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::UnboundedSender<UnregisterRequest>,
    subscription_tx: mpsc::Sender<SubscriptionRequest>,
    broadcast_tx: mpsc::Sender<BroadcastRequest>,
    registry: Arc<RwLock<Registry>>,
    audit: AuditSender,
    clock: Arc<dyn Clock>,
}

impl HubHandle {
    /// Register a connection and wait until the hub has acknowledged it.
    ///
    /// By the time this returns, `connection_established` sits in the outbox.
    pub async fn register(
        &self,
        registration: ClientRegistration,
    ) -> Result<ConnectionId, HubError> {
        let (ack, ack_rx) = oneshot::channel();
        self.register_tx
            .send(RegisterRequest { registration, ack })
            .await?;
        Ok(ack_rx.await?)
    }

    /// Ask the hub to drop a connection. Unregistering twice is a no-op.
    pub fn unregister(&self, connection_id: ConnectionId, reason: DisconnectReason) {
        if self
            .unregister_tx
            .send(UnregisterRequest {
                connection_id: connection_id.clone(),
                reason,
            })
            .is_err()
        {
            tracing::debug!(
                connection_id = %connection_id,
                "Hub already stopped, skipping unregister"
            );
        }
    }

    /// Subscribe a connection to chats; returns how many were newly added
    pub async fn subscribe(
        &self,
        connection_id: &ConnectionId,
        chat_ids: Vec<ChatId>,
    ) -> Result<usize, HubError> {
        self.change_subscription(connection_id, chat_ids, SubscriptionAction::Subscribe)
            .await
    }

    /// Unsubscribe a connection from chats; returns how many were removed
    pub async fn unsubscribe(
        &self,
        connection_id: &ConnectionId,
        chat_ids: Vec<ChatId>,
    ) -> Result<usize, HubError> {
        self.change_subscription(connection_id, chat_ids, SubscriptionAction::Unsubscribe)
            .await
    }

    async fn change_subscription(
        &self,
        connection_id: &ConnectionId,
        chat_ids: Vec<ChatId>,
        action: SubscriptionAction,
    ) -> Result<usize, HubError> {
        let (ack, ack_rx) = oneshot::channel();
        self.subscription_tx
            .send(SubscriptionRequest {
                connection_id: connection_id.clone(),
                chat_ids,
                action,
                ack,
            })
            .await?;
        Ok(ack_rx.await?)
    }

    /// Fan an envelope out to a chat's subscribers, optionally skipping one connection
    pub async fn broadcast_to_chat(
        &self,
        chat_id: ChatId,
        envelope: Envelope,
        exclude: Option<ConnectionId>,
    ) -> Result<(), HubError> {
        self.broadcast(BroadcastTarget::Chat(chat_id), envelope, exclude)
            .await
    }

    /// Deliver an envelope to every connection of one user
    pub async fn broadcast_to_user(
        &self,
        user_id: UserId,
        envelope: Envelope,
    ) -> Result<(), HubError> {
        self.broadcast(BroadcastTarget::User(user_id), envelope, None)
            .await
    }

    /// Deliver an envelope to every live connection
    pub async fn broadcast_to_all(&self, envelope: Envelope) -> Result<(), HubError> {
        self.broadcast(BroadcastTarget::All, envelope, None).await
    }

    pub async fn broadcast(
        &self,
        target: BroadcastTarget,
        envelope: Envelope,
        exclude: Option<ConnectionId>,
    ) -> Result<(), HubError> {
        self.broadcast_tx
            .send(BroadcastRequest {
                target,
                envelope,
                exclude,
            })
            .await?;
        Ok(())
    }

    /// Refresh a connection's persisted heartbeat (fire-and-forget).
    ///
    /// Queued behind the connection's audit record, so a touch issued after
    /// [`HubHandle::register`] returns never races the insert.
    pub fn touch(&self, connection_id: &ConnectionId) {
        self.audit.send(AuditCommand::Heartbeat(
            connection_id.clone(),
            self.clock.now(),
        ));
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.registry.read().await.is_online(user_id)
    }

    pub async fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.registry.read().await.user_connection_count(user_id)
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.registry.read().await.online_users()
    }

    pub async fn chat_subscribers(&self, chat_id: &ChatId) -> Vec<ConnectionId> {
        self.registry.read().await.chat_subscribers(chat_id)
    }

    pub async fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.registry.read().await.contains(connection_id)
    }

    /// Chats a connection is subscribed to, sorted; `None` if not registered
    pub async fn subscriptions_of(&self, connection_id: &ConnectionId) -> Option<Vec<ChatId>> {
        let registry = self.registry.read().await;
        let entry = registry.get(connection_id)?;
        let mut chats: Vec<ChatId> = entry.subscriptions().iter().cloned().collect();
        chats.sort();
        Some(chats)
    }

    pub async fn stats(&self) -> RegistryStats {
        self.registry.read().await.stats()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
