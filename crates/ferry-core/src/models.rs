//! Domain models for queue-to-worker message forwarding.
//!
//! Messages are received from the queue, delivered to the worker over HTTP,
//! and acknowledged (deleted) with their receipt token once the worker
//! accepts them. Newtype wrappers keep the queue-assigned identifier and the
//! acknowledgement token from being mixed up with ordinary strings.

use std::{collections::HashMap, fmt};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue-assigned message identifier.
///
/// Keys the in-flight registry, so two copies of the same message (for
/// example a redelivery after a visibility-timeout expiry) are never
/// delivered concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque acknowledgement token issued by the queue on receive.
///
/// Consumed by the delete call once the worker has accepted the message.
/// The token is only valid while the message's visibility window is open;
/// the queue decides what happens after that, not us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptToken(pub String);

impl ReceiptToken {
    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ReceiptToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for ReceiptToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// A message pulled from the queue, pending delivery to the worker.
///
/// Owned by exactly one dispatch task while in flight. The raw body is
/// forwarded to the worker unmodified; the remaining fields become request
/// headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Queue-assigned identifier.
    pub id: MessageId,

    /// Raw message payload, forwarded as the request body.
    pub body: Bytes,

    /// Token for the acknowledge (delete) call.
    pub receipt: ReceiptToken,

    /// Custom message attributes, forwarded one header per entry.
    pub attributes: HashMap<String, String>,

    /// How many times the queue has handed this message out.
    pub receive_count: Option<u32>,

    /// When the queue first handed this message out.
    pub first_received_at: Option<DateTime<Utc>>,

    /// Identifier of the principal that sent the message.
    pub sender_id: Option<String>,
}

impl Message {
    /// Creates a message with just an id, body, and receipt token.
    ///
    /// Queue metadata (receive count, timestamps, sender) is absent; the
    /// corresponding headers are omitted on delivery.
    pub fn new(
        id: impl Into<MessageId>,
        body: impl Into<Bytes>,
        receipt: impl Into<ReceiptToken>,
    ) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            receipt: receipt.into(),
            attributes: HashMap::new(),
            receive_count: None,
            first_received_at: None,
            sender_id: None,
        }
    }
}

/// Worker response to a delivery attempt.
///
/// Only the status class matters: 2xx means the worker accepted the message
/// and it can be deleted from the queue, anything else leaves the message
/// for the queue's visibility timeout to redeliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// HTTP status code returned by the worker.
    pub status: u16,
}

impl WorkerResponse {
    /// Creates a response from a raw status code.
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// Whether the worker accepted the message (status in [200, 300)).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
