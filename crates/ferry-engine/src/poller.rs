//! Room-bounded queue polling.
//!
//! The poller issues a single long-poll receive for at most the admission
//! room the engine has left. Requesting only what can be admitted is the
//! system's sole back-pressure mechanism; the queue's own long-poll window
//! does the waiting server-side.

use std::sync::Arc;

use ferry_core::Message;
use tracing::debug;

use crate::{error::Result, queue::QueueSource};

/// Issues receive calls against the queue.
///
/// Polling takes `&mut self`, so at most one receive can be outstanding per
/// engine; overlapping polls are ruled out structurally rather than by a
/// runtime flag.
pub struct Poller {
    queue: Arc<dyn QueueSource>,
}

impl Poller {
    /// Creates a poller over the given queue.
    pub fn new(queue: Arc<dyn QueueSource>) -> Self {
        Self { queue }
    }

    /// Long-polls the queue for up to `room` messages.
    ///
    /// An empty batch is a normal outcome and is only visible at debug
    /// level.
    ///
    /// # Errors
    ///
    /// Propagates queue receive failures; these are fatal to the engine.
    pub async fn poll(&mut self, room: usize) -> Result<Vec<Message>> {
        debug!(room, "polling queue");

        let batch = self.queue.receive(room).await?;

        if batch.is_empty() {
            debug!("no messages received within the poll window");
        } else {
            debug!(count = batch.len(), "messages received");
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use ferry_testing::fixtures::message_batch;

    use super::*;
    use crate::queue::mock::MockQueue;

    #[tokio::test]
    async fn poll_never_requests_more_than_room() {
        let queue = Arc::new(MockQueue::new());
        queue.push_all(message_batch("m", 8));

        let mut poller = Poller::new(queue.clone());

        let batch = poller.poll(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.largest_request(), 3);
    }

    #[tokio::test]
    async fn empty_poll_is_silent_success() {
        let queue = Arc::new(MockQueue::new());
        let mut poller = Poller::new(queue.clone());

        let batch = poller.poll(10).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(queue.receive_calls(), 1);
    }

    #[tokio::test]
    async fn receive_errors_propagate() {
        let queue = Arc::new(MockQueue::new());
        queue.fail_next_receive("service unavailable");

        let mut poller = Poller::new(queue.clone());
        assert!(poller.poll(1).await.is_err());
    }
}
