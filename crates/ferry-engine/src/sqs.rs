//! Amazon SQS implementation of the queue seam.
//!
//! Thin adapter from [`QueueSource`] to the AWS SDK: receive with the
//! configured long-poll window and all message attributes, delete by receipt
//! handle, and queue-URL resolution for name-only or custom-endpoint
//! configurations.

use std::{future::Future, pin::Pin};

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_sqs::{
    error::DisplayErrorContext,
    types::{Message as SqsMessage, MessageSystemAttributeName},
};
use chrono::{DateTime, Utc};
use ferry_core::{Message, ReceiptToken};
use tracing::{debug, warn};

use crate::{
    error::{EngineError, Result},
    queue::QueueSource,
};

/// SQS allows at most this many messages per receive call.
const MAX_RECEIVE_BATCH: usize = 10;

/// Connection settings for the SQS backend.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Full queue URL. Takes precedence over `queue_name`.
    pub queue_url: Option<String>,
    /// Queue name, resolved via `GetQueueUrl` or joined onto `endpoint_url`.
    pub queue_name: Option<String>,
    /// AWS region of the queue.
    pub region: String,
    /// Custom service endpoint (for local stacks and compatible services).
    pub endpoint_url: Option<String>,
    /// Static access key id. When absent the ambient provider chain is used.
    pub access_key_id: Option<String>,
    /// Static secret access key.
    pub secret_access_key: Option<String>,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
    /// Server-side long-poll wait window in seconds.
    pub wait_time_seconds: i32,
}

/// Production [`QueueSource`] backed by Amazon SQS.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    wait_time_seconds: i32,
}

impl SqsQueue {
    /// Connects to SQS and resolves the queue URL.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` if neither a queue URL nor a
    /// queue name is configured, and `EngineError::Queue` if name resolution
    /// against the service fails.
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(key), Some(secret)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                config.session_token.clone(),
                None,
                "ferry-config",
            ));
        }

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.as_str());
        }

        let shared = loader.load().await;
        let client = aws_sdk_sqs::Client::new(&shared);

        let queue_url = Self::resolve_queue_url(&client, config).await?;
        debug!(%queue_url, "connected to queue");

        Ok(Self {
            client,
            queue_url,
            wait_time_seconds: config.wait_time_seconds,
        })
    }

    /// Returns the resolved queue URL.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    async fn resolve_queue_url(
        client: &aws_sdk_sqs::Client,
        config: &QueueConfig,
    ) -> Result<String> {
        if let Some(url) = &config.queue_url {
            return Ok(url.clone());
        }

        let Some(name) = &config.queue_name else {
            return Err(EngineError::configuration(
                "either queue_url or queue_name is required",
            ));
        };

        // A custom endpoint addresses queues as <endpoint>/<name>.
        if let Some(endpoint) = &config.endpoint_url {
            return Ok(format!("{}/{}", endpoint.trim_end_matches('/'), name));
        }

        let output = client
            .get_queue_url()
            .queue_name(name.as_str())
            .send()
            .await
            .map_err(|e| {
                EngineError::queue(format!(
                    "failed to resolve queue {name}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        output.queue_url.ok_or_else(|| {
            EngineError::queue(format!("queue {name} resolved to an empty URL"))
        })
    }
}

impl QueueSource for SqsQueue {
    fn receive(
        &self,
        max_messages: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
        Box::pin(async move {
            let count = max_messages.min(MAX_RECEIVE_BATCH);

            let output = self
                .client
                .receive_message()
                .queue_url(self.queue_url.as_str())
                .max_number_of_messages(count as i32)
                .wait_time_seconds(self.wait_time_seconds)
                .message_system_attribute_names(MessageSystemAttributeName::All)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(|e| {
                    EngineError::queue(format!(
                        "receive failed: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            let messages = output
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(convert_message)
                .collect();

            Ok(messages)
        })
    }

    fn acknowledge(
        &self,
        receipt: ReceiptToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.client
                .delete_message()
                .queue_url(self.queue_url.as_str())
                .receipt_handle(receipt.as_str())
                .send()
                .await
                .map_err(|e| {
                    EngineError::acknowledge(format!(
                        "delete failed: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            Ok(())
        })
    }
}

/// Converts an SDK message into the domain model.
///
/// Messages without an id or receipt handle cannot be tracked or deleted;
/// they are dropped with a warning and left for redelivery.
fn convert_message(message: SqsMessage) -> Option<Message> {
    let Some(id) = message.message_id else {
        warn!("queue returned a message without an id, skipping");
        return None;
    };
    let Some(receipt) = message.receipt_handle else {
        warn!(message_id = %id, "queue returned a message without a receipt handle, skipping");
        return None;
    };

    let system = message.attributes.unwrap_or_default();

    let receive_count = system
        .get(&MessageSystemAttributeName::ApproximateReceiveCount)
        .and_then(|v| v.parse::<u32>().ok());

    let first_received_at = system
        .get(&MessageSystemAttributeName::ApproximateFirstReceiveTimestamp)
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    let sender_id = system
        .get(&MessageSystemAttributeName::SenderId)
        .cloned();

    let attributes = message
        .message_attributes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| value.string_value.map(|v| (name, v)))
        .collect();

    Some(Message {
        id: id.into(),
        body: message.body.unwrap_or_default().into_bytes().into(),
        receipt: receipt.into(),
        attributes,
        receive_count,
        first_received_at,
        sender_id,
    })
}
