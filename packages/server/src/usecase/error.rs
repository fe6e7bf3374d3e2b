//! UseCase errors.

use thiserror::Error;

use crate::{
    domain::ValueObjectError,
    infrastructure::{
        dto::websocket::ErrorCode,
        hub::{HubError, PushError},
    },
};

/// Errors raised while routing one inbound envelope.
///
/// None of them is a reason to drop the connection by itself, except
/// [`RouteError::Reply`], which means the sender's own outbox is full.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: ValueObjectError,
    },

    #[error("failed to reply to sender: {0}")]
    Reply(#[from] PushError),

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl RouteError {
    /// Code reported to the client in the `error` envelope
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingField(_) | Self::InvalidField { .. } => ErrorCode::InvalidPayload,
            Self::Reply(_) | Self::Hub(_) => ErrorCode::Unavailable,
        }
    }

    /// Whether the sender must be treated as a slow consumer
    pub fn is_slow_consumer(&self) -> bool {
        matches!(self, Self::Reply(PushError::Full | PushError::Closed))
    }
}
