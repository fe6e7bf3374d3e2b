//! WebSocket envelope DTOs.
//!
//! Every frame on the wire is one JSON [`Envelope`]:
//!
//! ```text
//! { "type": "send_message", "data": { "chat_id": "room-7", ... },
//!   "id": "c-42", "timestamp": "2024-01-01T00:00:00.000Z" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Enumerated envelope types.
///
/// Strings the server does not know deserialize to [`MessageType::Unknown`]
/// so the router can log and drop them instead of failing the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ConnectionEstablished,
    Ping,
    Pong,
    Error,
    SubscribeChat,
    UnsubscribeChat,
    SubscribeUserChats,
    SendMessage,
    MessageSent,
    MessageReceived,
    MessageUpdated,
    MessageDeleted,
    MessageDelivered,
    MessageRead,
    ChatRead,
    UserTyping,
    UserStoppedTyping,
    UserOnline,
    UserOffline,
    ReactionAdded,
    ReactionRemoved,
    PinMessage,
    UnpinMessage,
    CreateChat,
    ChatCreated,
    ChatUpdated,
    ChatDeleted,
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Types only the server emits; clients sending them are ignored.
    pub fn is_server_originated(self) -> bool {
        matches!(
            self,
            Self::ConnectionEstablished
                | Self::Error
                | Self::MessageSent
                | Self::MessageReceived
                | Self::MessageUpdated
                | Self::MessageDeleted
                | Self::UserOffline
                | Self::ChatCreated
                | Self::ChatUpdated
                | Self::ChatDeleted
        )
    }
}

/// One protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub r#type: MessageType,
    #[serde(default)]
    pub data: Value,
    /// Optional client-chosen correlation id, echoed on direct replies.
    ///
    /// Numeric ids are accepted and echoed back as strings.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "correlation_id"
    )]
    pub id: Option<String>,
    /// Server-authoritative on the way out. Inbound values that are not an
    /// RFC 3339 string or Unix milliseconds are replaced by the receive time.
    #[serde(default = "Utc::now", with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Create an envelope stamped with the given server time
    pub fn new(r#type: MessageType, data: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            r#type,
            data,
            id: None,
            timestamp,
        }
    }

    /// Attach a correlation id
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// Decode one text frame
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode into one text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Look up a string field in `data`
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Insert server-authoritative fields into `data`.
    ///
    /// A non-object payload is replaced by an object holding only the stamped fields.
    pub fn stamp<I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.data {
            for (key, value) in fields {
                map.insert(key.to_string(), value);
            }
        }
    }
}

/// Error codes carried in `error` envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidPayload,
    Unavailable,
}

/// Payload of an `error` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

mod rfc3339_millis {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&chathub_shared::time::to_rfc3339(*at))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let at = match Value::deserialize(deserializer)? {
            Value::String(raw) => DateTime::parse_from_rfc3339(&raw)
                .ok()
                .map(|at| at.with_timezone(&Utc)),
            Value::Number(millis) => millis
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            _ => None,
        };
        Ok(at.unwrap_or_else(Utc::now))
    }
}

fn correlation_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(id) => Ok(Some(id)),
        Value::Number(id) => Ok(Some(id.to_string())),
        other => Err(serde::de::Error::invalid_type(
            serde::de::Unexpected::Other(json_kind(&other)),
            &"a string or number",
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        _ => "value",
    }
}
