//! The hub task.

use std::{collections::VecDeque, sync::Arc};

use chathub_shared::time::Clock;
use serde_json::json;
use tokio::sync::{RwLock, mpsc};

use crate::{
    config::HubConfig,
    domain::{ConnectionId, ConnectionRecord, ConnectionRepository, UserId},
    infrastructure::dto::websocket::{Envelope, MessageType},
};

use super::{
    BroadcastRequest, BroadcastTarget, DisconnectReason, HubHandle, RegisterRequest,
    SubscriptionAction, SubscriptionRequest, UnregisterRequest,
    audit::{AuditCommand, AuditSender, AuditWriter, audit_channel},
    registry::{ClientEntry, Registration, Registry},
};

/// Single writer of the routing tables.
///
/// Build it with [`Hub::new`], spawn [`Hub::run`], and hand the returned
/// [`HubHandle`] to whatever accepts connections.
pub struct Hub {
    registry: Arc<RwLock<Registry>>,
    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::UnboundedReceiver<UnregisterRequest>,
    subscription_rx: mpsc::Receiver<SubscriptionRequest>,
    broadcast_rx: mpsc::Receiver<BroadcastRequest>,
    audit: AuditSender,
    audit_writer: Option<AuditWriter>,
    clock: Arc<dyn Clock>,
}

impl Hub {
    pub fn new(
        config: &HubConfig,
        repository: Arc<dyn ConnectionRepository>,
        clock: Arc<dyn Clock>,
    ) -> (Self, HubHandle) {
        let capacity = config.hub_queue_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (subscription_tx, subscription_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let registry = Arc::new(RwLock::new(Registry::new()));
        let (audit, audit_writer) = audit_channel(repository);

        let hub = Self {
            registry: registry.clone(),
            register_rx,
            unregister_rx,
            subscription_rx,
            broadcast_rx,
            audit: audit.clone(),
            audit_writer: Some(audit_writer),
            clock: clock.clone(),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            subscription_tx,
            broadcast_tx,
            registry,
            audit,
            clock,
        };
        (hub, handle)
    }

    /// Drain the hub queues until every [`HubHandle`] is dropped.
    ///
    /// Queues are polled in priority order register, unregister,
    /// subscription, broadcast; each request is handled to completion before
    /// the next one, which is what gives per-chat delivery its total order.
    /// Audit writes are drained by a companion task spawned here.
    pub async fn run(mut self) {
        if let Some(writer) = self.audit_writer.take() {
            tokio::spawn(writer.run());
        }
        tracing::info!("Hub started");
        loop {
            tokio::select! {
                biased;
                Some(request) = self.register_rx.recv() => self.register(request).await,
                Some(request) = self.unregister_rx.recv() => {
                    self.evict(vec![(request.connection_id, request.reason)]).await;
                }
                Some(request) = self.subscription_rx.recv() => self.change_subscription(request).await,
                Some(request) = self.broadcast_rx.recv() => {
                    let laggards = self
                        .fan_out(&request.target, &request.envelope, request.exclude.as_ref())
                        .await;
                    self.evict(laggards).await;
                }
                else => break,
            }
        }
        tracing::info!("Hub stopped");
    }

    async fn register(&mut self, request: RegisterRequest) {
        let RegisterRequest { registration, ack } = request;
        let connection_id = registration
            .connection_id
            .unwrap_or_else(ConnectionId::generate);
        let user_id = registration.user_id;
        let outbox = registration.outbox;
        let connected_at = self.clock.now();

        let outcome = {
            let mut registry = self.registry.write().await;
            registry.insert(ClientEntry::new(
                connection_id.clone(),
                user_id.clone(),
                outbox.clone(),
                connected_at,
            ))
        };

        if outcome == Registration::AlreadyRegistered {
            tracing::debug!(
                connection_id = %connection_id,
                "Connection already registered, ignoring"
            );
            let _ = ack.send(connection_id);
            return;
        }

        self.audit.send(AuditCommand::Record(ConnectionRecord::new(
            connection_id.clone(),
            user_id.clone(),
            registration.socket_id,
            connected_at,
        )));

        let established = Envelope::new(
            MessageType::ConnectionEstablished,
            json!({
                "connection_id": connection_id.as_str(),
                "user_id": user_id.as_str(),
            }),
            connected_at,
        );
        let mut laggards = Vec::new();
        if let Err(e) = outbox.push_envelope(&established) {
            tracing::warn!(
                connection_id = %connection_id,
                error = %e,
                "Failed to deliver connection_established"
            );
            laggards.push((connection_id.clone(), DisconnectReason::SlowConsumer));
        }

        let first_connection = outcome == Registration::FirstConnection;
        tracing::info!(
            connection_id = %connection_id,
            user_id = %user_id,
            first_connection,
            "Client registered"
        );

        if first_connection {
            laggards.extend(self.announce_presence(&user_id, MessageType::UserOnline).await);
        }

        let _ = ack.send(connection_id);
        self.evict(laggards).await;
    }

    /// Run the unregister path for every queued connection.
    ///
    /// Fan-out performed while unregistering (offline presence) can surface
    /// more slow consumers; they are appended to the same queue.
    async fn evict(&mut self, initial: Vec<(ConnectionId, DisconnectReason)>) {
        let mut queue: VecDeque<(ConnectionId, DisconnectReason)> = initial.into();
        while let Some((connection_id, reason)) = queue.pop_front() {
            queue.extend(self.unregister(&connection_id, reason).await);
        }
    }

    async fn unregister(
        &mut self,
        connection_id: &ConnectionId,
        reason: DisconnectReason,
    ) -> Vec<(ConnectionId, DisconnectReason)> {
        let removal = {
            let mut registry = self.registry.write().await;
            registry.remove(connection_id)
        };
        let Some(removal) = removal else {
            tracing::trace!(connection_id = %connection_id, "Already unregistered");
            return Vec::new();
        };

        removal.entry.outbox.close();
        self.audit
            .send(AuditCommand::Deactivate(connection_id.clone()));

        tracing::info!(
            connection_id = %connection_id,
            user_id = %removal.entry.user_id,
            reason = ?reason,
            chats = removal.entry.subscriptions().len(),
            "Client unregistered"
        );

        if removal.user_went_offline {
            self.announce_presence(&removal.entry.user_id, MessageType::UserOffline)
                .await
        } else {
            Vec::new()
        }
    }

    async fn change_subscription(&mut self, request: SubscriptionRequest) {
        let changed = {
            let mut registry = self.registry.write().await;
            request
                .chat_ids
                .into_iter()
                .filter(|chat_id| match request.action {
                    SubscriptionAction::Subscribe => {
                        registry.subscribe(&request.connection_id, chat_id.clone())
                    }
                    SubscriptionAction::Unsubscribe => {
                        registry.unsubscribe(&request.connection_id, chat_id)
                    }
                })
                .count()
        };
        tracing::debug!(
            connection_id = %request.connection_id,
            action = ?request.action,
            changed,
            "Subscription updated"
        );
        let _ = request.ack.send(changed);
    }

    async fn announce_presence(
        &self,
        user_id: &UserId,
        r#type: MessageType,
    ) -> Vec<(ConnectionId, DisconnectReason)> {
        let envelope = Envelope::new(
            r#type,
            json!({ "user_id": user_id.as_str() }),
            self.clock.now(),
        );
        self.fan_out(&BroadcastTarget::All, &envelope, None).await
    }

    /// Push one envelope onto every target outbox without blocking.
    ///
    /// Returns the connections whose outbox was full or closed; the caller
    /// routes them through the unregister path.
    async fn fan_out(
        &self,
        target: &BroadcastTarget,
        envelope: &Envelope,
        exclude: Option<&ConnectionId>,
    ) -> Vec<(ConnectionId, DisconnectReason)> {
        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode broadcast envelope");
                return Vec::new();
            }
        };

        let registry = self.registry.read().await;
        let recipients: Box<dyn Iterator<Item = &ClientEntry> + '_> = match target {
            BroadcastTarget::Chat(chat_id) => Box::new(registry.chat_members(chat_id)),
            BroadcastTarget::User(user_id) => Box::new(registry.user_members(user_id)),
            BroadcastTarget::All => Box::new(registry.all_members()),
        };

        let mut delivered = 0usize;
        let mut laggards = Vec::new();
        for entry in recipients {
            if exclude == Some(&entry.connection_id) {
                continue;
            }
            match entry.outbox.push(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %entry.connection_id,
                        user_id = %entry.user_id,
                        error = %e,
                        "Evicting slow consumer"
                    );
                    laggards.push((entry.connection_id.clone(), DisconnectReason::SlowConsumer));
                }
            }
        }

        tracing::debug!(
            kind = ?envelope.r#type,
            target = ?target,
            delivered,
            evicted = laggards.len(),
            "Broadcast delivered"
        );
        laggards
    }
}
