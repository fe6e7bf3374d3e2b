//! Bounded per-connection outbox.
//!
//! The producer side ([`Outbox`]) never blocks: a full queue is reported to the
//! caller, which treats the connection as a slow consumer. The consumer side
//! ([`OutboxReceiver`]) is drained by exactly one writer loop.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use thiserror::Error;
use tokio::sync::{Notify, mpsc};

use crate::infrastructure::dto::websocket::Envelope;

/// Outbox push errors
#[derive(Debug, Error)]
pub enum PushError {
    #[error("outbox is full")]
    Full,

    #[error("outbox is closed")]
    Closed,

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

/// Producer handle of a connection's outbox
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<String>,
    signal: Arc<CloseSignal>,
}

/// Consumer half, owned by the connection's writer loop
pub struct OutboxReceiver {
    rx: mpsc::Receiver<String>,
    signal: Arc<CloseSignal>,
}

/// Create a bounded outbox holding at most `capacity` frames
pub fn outbox(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let signal = Arc::new(CloseSignal {
        closed: AtomicBool::new(false),
        notify: Notify::new(),
    });
    (
        Outbox {
            tx,
            signal: signal.clone(),
        },
        OutboxReceiver { rx, signal },
    )
}

impl Outbox {
    /// Enqueue one serialized frame without waiting
    pub fn push(&self, frame: String) -> Result<(), PushError> {
        if self.is_closed() {
            return Err(PushError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Serialize and enqueue one envelope
    pub fn push_envelope(&self, envelope: &Envelope) -> Result<(), PushError> {
        self.push(envelope.to_json()?)
    }

    /// Close the outbox; the writer loop stops even if frames are still queued
    pub fn close(&self) {
        if !self.signal.closed.swap(true, Ordering::AcqRel) {
            self.signal.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.signal.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Number of frames currently queued
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutboxReceiver {
    /// Wait for the next frame; `None` once the outbox is closed
    pub async fn next(&mut self) -> Option<String> {
        if self.signal.closed.load(Ordering::Acquire) {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.signal.notify.notified() => None,
            frame = self.rx.recv() => frame,
        }
    }

    /// Take an already queued frame, if any, without waiting
    pub fn try_next(&mut self) -> Option<String> {
        if self.signal.closed.load(Ordering::Acquire) {
            return None;
        }
        self.rx.try_recv().ok()
    }
}
