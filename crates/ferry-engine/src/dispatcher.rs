//! Per-message delivery and acknowledgement protocol.
//!
//! A dispatch forwards one message to the worker webhook and deletes it
//! from the queue only when the worker answered 2xx. On any other outcome
//! the message is left un-acknowledged and the queue's visibility timeout
//! is the only retry path. Dispatch is total: every failure is caught,
//! logged, and folded into the returned outcome, so one bad message can
//! never abort sibling dispatches or the polling loop.

use std::{collections::HashMap, sync::Arc, time::Instant};

use ferry_core::Message;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    client::{WorkerClient, WorkerRequest},
    queue::QueueSource,
};

/// Settings for building worker requests.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Destination webhook URL.
    pub webhook_url: String,
    /// Queue name, sent as `X-Queue-Name`.
    pub queue_name: String,
    /// Content type for the forwarded body.
    pub content_type: String,
}

/// How a single dispatch settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Worker accepted the message and it was deleted from the queue.
    Acknowledged {
        /// HTTP status the worker answered with
        status: u16,
    },
    /// Worker answered with a non-2xx status; message left for redelivery.
    Rejected {
        /// HTTP status the worker answered with
        status: u16,
    },
    /// Delivery or acknowledgement failed before a worker verdict landed.
    Failed,
}

impl DispatchOutcome {
    /// Whether the message was delivered and acknowledged.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }
}

/// Delivers messages to the worker and acknowledges accepted ones.
pub struct Dispatcher {
    client: WorkerClient,
    queue: Arc<dyn QueueSource>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Creates a dispatcher over the given client and queue.
    pub fn new(client: WorkerClient, queue: Arc<dyn QueueSource>, config: DispatchConfig) -> Self {
        Self { client, queue, config }
    }

    /// Delivers one message and acknowledges it on success.
    ///
    /// Never returns an error and never panics on I/O failure; the outcome
    /// carries everything the caller needs for accounting.
    pub async fn dispatch(&self, message: Message) -> DispatchOutcome {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let request = WorkerRequest {
            request_id,
            url: self.config.webhook_url.clone(),
            content_type: self.config.content_type.clone(),
            headers: self.build_headers(&message, request_id),
            body: message.body.clone(),
        };

        let response = match self.client.deliver(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    message_id = %message.id,
                    request_id = %request_id,
                    error = %e,
                    "delivery failed"
                );
                return DispatchOutcome::Failed;
            },
        };

        if !response.is_success() {
            warn!(
                message_id = %message.id,
                request_id = %request_id,
                status = response.status,
                "worker rejected message, leaving it for redelivery"
            );
            return DispatchOutcome::Rejected { status: response.status };
        }

        if let Err(e) = self.queue.acknowledge(message.receipt.clone()).await {
            error!(
                message_id = %message.id,
                request_id = %request_id,
                error = %e,
                "worker accepted message but acknowledge failed, queue will redeliver"
            );
            return DispatchOutcome::Failed;
        }

        debug!(
            message_id = %message.id,
            request_id = %request_id,
            status = response.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "message delivered and removed from queue"
        );

        DispatchOutcome::Acknowledged { status: response.status }
    }

    /// Builds the metadata header set for one delivery.
    ///
    /// `User-Agent` comes from the client configuration and `Content-Type`
    /// from the request itself; everything else is assembled here.
    fn build_headers(&self, message: &Message, request_id: Uuid) -> HashMap<String, String> {
        let mut headers = HashMap::new();

        headers.insert("X-Queue-MessageId".to_string(), message.id.to_string());
        headers.insert("X-Queue-Name".to_string(), self.config.queue_name.clone());
        headers.insert("X-Request-Id".to_string(), request_id.to_string());

        if let Some(first_received_at) = message.first_received_at {
            headers.insert(
                "X-Queue-First-Received-At".to_string(),
                first_received_at.timestamp_millis().to_string(),
            );
        }

        if let Some(receive_count) = message.receive_count {
            headers.insert(
                "X-Queue-Receive-Count".to_string(),
                receive_count.to_string(),
            );
        }

        if let Some(sender_id) = &message.sender_id {
            headers.insert("X-Queue-Sender-Id".to_string(), sender_id.clone());
        }

        for (name, value) in &message.attributes {
            headers.insert(format!("X-Queue-Attr-{name}"), value.clone());
        }

        headers
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use ferry_testing::MessageBuilder;

    use super::*;
    use crate::{client::ClientConfig, queue::mock::MockQueue};

    fn dispatcher(queue: Arc<MockQueue>) -> Dispatcher {
        let client = WorkerClient::new(ClientConfig::default()).unwrap();
        Dispatcher::new(
            client,
            queue,
            DispatchConfig {
                webhook_url: "http://127.0.0.1:1/".to_string(),
                queue_name: "jobs".to_string(),
                content_type: "application/json".to_string(),
            },
        )
    }

    #[test]
    fn header_set_covers_all_message_metadata() {
        let queue = Arc::new(MockQueue::new());
        let dispatcher = dispatcher(queue);

        let first_received = chrono::Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let message = MessageBuilder::new("m-1")
            .receive_count(2)
            .first_received_at(first_received)
            .sender_id("AIDAEXAMPLE")
            .attribute("priority", "high")
            .build();

        let request_id = Uuid::new_v4();
        let headers = dispatcher.build_headers(&message, request_id);

        assert_eq!(headers.get("X-Queue-MessageId").unwrap(), "m-1");
        assert_eq!(headers.get("X-Queue-Name").unwrap(), "jobs");
        assert_eq!(headers.get("X-Request-Id").unwrap(), &request_id.to_string());
        assert_eq!(
            headers.get("X-Queue-First-Received-At").unwrap(),
            "1700000000000"
        );
        assert_eq!(headers.get("X-Queue-Receive-Count").unwrap(), "2");
        assert_eq!(headers.get("X-Queue-Sender-Id").unwrap(), "AIDAEXAMPLE");
        assert_eq!(headers.get("X-Queue-Attr-priority").unwrap(), "high");
    }

    #[test]
    fn conditional_headers_are_omitted_when_absent() {
        let queue = Arc::new(MockQueue::new());
        let dispatcher = dispatcher(queue);

        let message = MessageBuilder::new("m-1").build();
        let headers = dispatcher.build_headers(&message, Uuid::new_v4());

        assert!(!headers.contains_key("X-Queue-First-Received-At"));
        assert!(!headers.contains_key("X-Queue-Receive-Count"));
        assert!(!headers.contains_key("X-Queue-Sender-Id"));
        assert_eq!(headers.len(), 3);
    }

    #[tokio::test]
    async fn network_failure_is_contained() {
        // Dispatcher targets a port nothing listens on.
        let queue = Arc::new(MockQueue::new());
        let dispatcher = dispatcher(queue.clone());

        let outcome = dispatcher.dispatch(MessageBuilder::new("m-1").build()).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert!(queue.acknowledged().is_empty());
    }
}
