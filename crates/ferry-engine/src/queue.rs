//! Queue abstraction for the dispatch engine.
//!
//! Provides a trait-based seam over the message queue so the engine, the
//! dispatcher, and the poller can be exercised without a live queue service.
//! The production implementation is [`crate::sqs::SqsQueue`]; tests use the
//! in-memory mock in [`mock`].

use std::{future::Future, pin::Pin};

use ferry_core::{Message, ReceiptToken};

use crate::error::Result;

/// Queue operations required by the dispatch engine.
///
/// `receive` is expected to long-poll server-side and to return an empty
/// batch as a normal outcome. `acknowledge` deletes a message so the queue
/// never redelivers it; it is only called after the worker accepted the
/// message.
pub trait QueueSource: Send + Sync + 'static {
    /// Receives up to `max_messages` messages from the queue.
    ///
    /// Implementations may return fewer messages than requested, including
    /// none. A receive error is fatal to the engine; redelivery of already
    /// received but unacknowledged messages is governed entirely by the
    /// queue's visibility timeout.
    fn receive(
        &self,
        max_messages: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>>;

    /// Deletes a message from the queue using its receipt token.
    fn acknowledge(
        &self,
        receipt: ReceiptToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

pub mod mock {
    //! In-memory queue for testing.
    //!
    //! Deterministic stand-in for the queue service: messages are handed out
    //! in insertion order, acknowledged receipts are recorded for assertions,
    //! and receive/acknowledge failures can be injected.

    use std::{
        collections::VecDeque,
        future::Future,
        pin::Pin,
        sync::{
            atomic::{AtomicU64, Ordering},
            Mutex,
        },
    };

    use ferry_core::{Message, ReceiptToken};

    use super::QueueSource;
    use crate::error::{EngineError, Result};

    /// Mock queue holding messages in memory.
    ///
    /// A received message leaves the pending queue permanently, mirroring a
    /// message hidden by its visibility window; tests that need redelivery
    /// push the message again.
    #[derive(Default)]
    pub struct MockQueue {
        pending: Mutex<VecDeque<Message>>,
        acknowledged: Mutex<Vec<ReceiptToken>>,
        receive_error: Mutex<Option<String>>,
        acknowledge_error: Mutex<Option<String>>,
        receive_calls: AtomicU64,
        /// Largest `max_messages` value seen across receive calls.
        largest_request: AtomicU64,
    }

    impl MockQueue {
        /// Creates an empty mock queue.
        pub fn new() -> Self {
            Self::default()
        }

        /// Adds a message to the pending queue.
        pub fn push(&self, message: Message) {
            self.pending.lock().unwrap().push_back(message);
        }

        /// Adds a batch of messages to the pending queue.
        pub fn push_all(&self, messages: impl IntoIterator<Item = Message>) {
            let mut pending = self.pending.lock().unwrap();
            pending.extend(messages);
        }

        /// Injects an error for the next receive call.
        pub fn fail_next_receive(&self, message: impl Into<String>) {
            *self.receive_error.lock().unwrap() = Some(message.into());
        }

        /// Injects an error for the next acknowledge call.
        pub fn fail_next_acknowledge(&self, message: impl Into<String>) {
            *self.acknowledge_error.lock().unwrap() = Some(message.into());
        }

        /// Returns the receipts acknowledged so far.
        pub fn acknowledged(&self) -> Vec<ReceiptToken> {
            self.acknowledged.lock().unwrap().clone()
        }

        /// Returns how many receive calls have been made.
        pub fn receive_calls(&self) -> u64 {
            self.receive_calls.load(Ordering::Acquire)
        }

        /// Returns the largest `max_messages` requested by any receive call.
        pub fn largest_request(&self) -> usize {
            self.largest_request.load(Ordering::Acquire) as usize
        }

        /// Returns how many messages are still pending.
        pub fn pending_len(&self) -> usize {
            self.pending.lock().unwrap().len()
        }
    }

    impl QueueSource for MockQueue {
        fn receive(
            &self,
            max_messages: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Message>>> + Send + '_>> {
            Box::pin(async move {
                self.receive_calls.fetch_add(1, Ordering::AcqRel);
                self.largest_request
                    .fetch_max(max_messages as u64, Ordering::AcqRel);

                if let Some(error) = self.receive_error.lock().unwrap().take() {
                    return Err(EngineError::queue(error));
                }

                let mut pending = self.pending.lock().unwrap();
                let count = max_messages.min(pending.len());
                Ok(pending.drain(..count).collect())
            })
        }

        fn acknowledge(
            &self,
            receipt: ReceiptToken,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                if let Some(error) = self.acknowledge_error.lock().unwrap().take() {
                    return Err(EngineError::acknowledge(error));
                }

                self.acknowledged.lock().unwrap().push(receipt);
                Ok(())
            })
        }
    }

}
