//! Authoritative routing tables of the hub.
//!
//! Pure, synchronous state: the hub task is the only writer, HTTP handlers
//! read through a short-lived read lock. Keeping the maps free of I/O makes
//! the invariants below directly testable:
//!
//! - a connection is listed under chat C iff C is in its subscription set
//! - a user key exists iff that user has at least one live connection;
//!   the key is removed, never left empty

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::{ChatId, ConnectionId, UserId};

use super::outbox::Outbox;

/// One registered connection
#[derive(Clone)]
pub struct ClientEntry {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub outbox: Outbox,
    pub connected_at: DateTime<Utc>,
    chats: HashSet<ChatId>,
}

impl ClientEntry {
    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        outbox: Outbox,
        connected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            outbox,
            connected_at,
            chats: HashSet::new(),
        }
    }

    /// Chats this connection receives fan-out for
    pub fn subscriptions(&self) -> &HashSet<ChatId> {
        &self.chats
    }
}

/// Outcome of [`Registry::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The user had no live connection before: presence goes online
    FirstConnection,
    /// The user was already online on another connection
    AdditionalConnection,
    /// The connection id was already registered; nothing changed
    AlreadyRegistered,
}

/// Outcome of [`Registry::remove`]
pub struct Removal {
    pub entry: ClientEntry,
    /// The removed connection was the user's last one
    pub user_went_offline: bool,
}

/// Counters exposed to read-only callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub connections: usize,
    pub online_users: usize,
    pub active_chats: usize,
}

#[derive(Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, ClientEntry>,
    users: HashMap<UserId, Vec<ConnectionId>>,
    chats: HashMap<ChatId, Vec<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection; re-inserting an existing id is a no-op
    pub fn insert(&mut self, entry: ClientEntry) -> Registration {
        if self.connections.contains_key(&entry.connection_id) {
            return Registration::AlreadyRegistered;
        }

        let user_connections = self.users.entry(entry.user_id.clone()).or_default();
        let registration = if user_connections.is_empty() {
            Registration::FirstConnection
        } else {
            Registration::AdditionalConnection
        };
        user_connections.push(entry.connection_id.clone());
        self.connections.insert(entry.connection_id.clone(), entry);

        registration
    }

    /// Remove a connection from every map; `None` if it was not registered
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Removal> {
        let entry = self.connections.remove(connection_id)?;

        let user_went_offline = match self.users.get_mut(&entry.user_id) {
            Some(list) => {
                list.retain(|id| id != connection_id);
                if list.is_empty() {
                    self.users.remove(&entry.user_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        for chat_id in &entry.chats {
            Self::detach(&mut self.chats, chat_id, connection_id);
        }

        Some(Removal {
            entry,
            user_went_offline,
        })
    }

    /// Add `chat_id` to a connection's subscriptions.
    ///
    /// Returns `false` when the connection is unknown or already subscribed.
    pub fn subscribe(&mut self, connection_id: &ConnectionId, chat_id: ChatId) -> bool {
        let Some(entry) = self.connections.get_mut(connection_id) else {
            return false;
        };
        if !entry.chats.insert(chat_id.clone()) {
            return false;
        }
        self.chats
            .entry(chat_id)
            .or_default()
            .push(connection_id.clone());
        true
    }

    /// Remove `chat_id` from a connection's subscriptions.
    ///
    /// Returns `false` when the connection is unknown or was not subscribed.
    pub fn unsubscribe(&mut self, connection_id: &ConnectionId, chat_id: &ChatId) -> bool {
        let Some(entry) = self.connections.get_mut(connection_id) else {
            return false;
        };
        if !entry.chats.remove(chat_id) {
            return false;
        }
        Self::detach(&mut self.chats, chat_id, connection_id);
        true
    }

    fn detach(
        chats: &mut HashMap<ChatId, Vec<ConnectionId>>,
        chat_id: &ChatId,
        connection_id: &ConnectionId,
    ) {
        if let Some(list) = chats.get_mut(chat_id) {
            list.retain(|id| id != connection_id);
            if list.is_empty() {
                chats.remove(chat_id);
            }
        }
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&ClientEntry> {
        self.connections.get(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Subscribers of one chat, in subscription order
    pub fn chat_members<'a>(&'a self, chat_id: &ChatId) -> impl Iterator<Item = &'a ClientEntry> {
        self.ids_to_entries(self.chats.get(chat_id))
    }

    /// Every live connection of one user
    pub fn user_members<'a>(&'a self, user_id: &UserId) -> impl Iterator<Item = &'a ClientEntry> {
        self.ids_to_entries(self.users.get(user_id))
    }

    /// Every live connection
    pub fn all_members(&self) -> impl Iterator<Item = &ClientEntry> {
        self.connections.values()
    }

    fn ids_to_entries<'a>(
        &'a self,
        ids: Option<&'a Vec<ConnectionId>>,
    ) -> impl Iterator<Item = &'a ClientEntry> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id))
    }

    /// Connection ids subscribed to a chat
    pub fn chat_subscribers(&self, chat_id: &ChatId) -> Vec<ConnectionId> {
        self.chats.get(chat_id).cloned().unwrap_or_default()
    }

    /// Presence is derived: online iff the user key exists
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.users.get(user_id).map_or(0, Vec::len)
    }

    /// Online users sorted by id
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.users.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            connections: self.connections.len(),
            online_users: self.users.len(),
            active_chats: self.chats.len(),
        }
    }
}
