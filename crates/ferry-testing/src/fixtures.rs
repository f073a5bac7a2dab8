//! Builders for queue message fixtures.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ferry_core::{Message, MessageId, ReceiptToken};

/// Builder for test queue messages.
///
/// Defaults produce a minimal valid message; individual fields can be
/// overridden per test.
///
/// # Example
///
/// ```
/// use ferry_testing::MessageBuilder;
///
/// let message = MessageBuilder::new("msg-1")
///     .body(b"payload".to_vec())
///     .receive_count(3)
///     .attribute("trace", "abc123")
///     .build();
/// assert_eq!(message.receive_count, Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Starts a builder for a message with the given id.
    ///
    /// The receipt token defaults to `receipt-<id>`.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let receipt = format!("receipt-{id}");
        Self {
            message: Message::new(id, Bytes::from_static(b"{}"), receipt),
        }
    }

    /// Sets the raw message body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.message.body = body.into();
        self
    }

    /// Sets the acknowledgement token.
    pub fn receipt(mut self, receipt: impl Into<ReceiptToken>) -> Self {
        self.message.receipt = receipt.into();
        self
    }

    /// Adds a custom message attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets the approximate receive count.
    pub fn receive_count(mut self, count: u32) -> Self {
        self.message.receive_count = Some(count);
        self
    }

    /// Sets the first-received timestamp.
    pub fn first_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.message.first_received_at = Some(at);
        self
    }

    /// Sets the sender id.
    pub fn sender_id(mut self, sender: impl Into<String>) -> Self {
        self.message.sender_id = Some(sender.into());
        self
    }

    /// Builds the message.
    pub fn build(self) -> Message {
        self.message
    }
}

/// Builds `count` distinct messages with ids `prefix-0` .. `prefix-<count-1>`.
pub fn message_batch(prefix: &str, count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| MessageBuilder::new(format!("{prefix}-{i}")).build())
        .collect()
}
