//! Ordered writes to the connection audit store.
//!
//! Every repository call the hub makes goes through one queue drained by a
//! single task, so `record → heartbeat → deactivate` for a connection reach
//! the store in the order the hub issued them. Callers never wait on it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::domain::{ConnectionId, ConnectionRecord, ConnectionRepository};

#[derive(Debug)]
pub(crate) enum AuditCommand {
    Record(ConnectionRecord),
    Heartbeat(ConnectionId, DateTime<Utc>),
    Deactivate(ConnectionId),
}

/// Fire-and-forget sender side of the audit queue
#[derive(Clone)]
pub(crate) struct AuditSender {
    tx: mpsc::UnboundedSender<AuditCommand>,
}

impl AuditSender {
    pub(crate) fn send(&self, command: AuditCommand) {
        if let Err(e) = self.tx.send(command) {
            tracing::debug!(command = ?e.0, "Audit writer stopped, dropping command");
        }
    }
}

/// Create the audit queue and the future that drains it into `repository`.
///
/// The writer finishes once every [`AuditSender`] has been dropped and the
/// queue is empty.
pub(crate) fn audit_channel(
    repository: Arc<dyn ConnectionRepository>,
) -> (AuditSender, AuditWriter) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AuditSender { tx }, AuditWriter { repository, rx })
}

pub(crate) struct AuditWriter {
    repository: Arc<dyn ConnectionRepository>,
    rx: mpsc::UnboundedReceiver<AuditCommand>,
}

impl AuditWriter {
    pub(crate) async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.apply(command).await;
        }
        tracing::debug!("Audit writer stopped");
    }

    async fn apply(&self, command: AuditCommand) {
        match command {
            AuditCommand::Record(record) => {
                let connection_id = record.connection_id.clone();
                if let Err(e) = self.repository.record_connection(record).await {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to record connection"
                    );
                }
            }
            AuditCommand::Heartbeat(connection_id, at) => {
                if let Err(e) = self.repository.update_heartbeat(&connection_id, at).await {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to update heartbeat"
                    );
                }
            }
            AuditCommand::Deactivate(connection_id) => {
                if let Err(e) = self.repository.deactivate_connection(&connection_id).await {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to deactivate connection"
                    );
                }
            }
        }
    }
}
