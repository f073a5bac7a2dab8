//! In-flight message tracking with scoped slot release.
//!
//! The registry is the engine's only concurrency-control primitive: the
//! scheduling loop computes its polling room from `ceiling - in_flight()`,
//! and admission rejects message ids that are already being delivered.
//! Slots are released through [`InFlightGuard`]'s `Drop`, so every admitted
//! message frees its slot on every exit path, including a panicking
//! dispatch task, and each release re-arms the loop.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use ferry_core::MessageId;
use tokio::sync::Notify;
use tracing::warn;

/// Set of message ids currently being delivered.
pub struct InFlightRegistry {
    ceiling: usize,
    ids: Mutex<HashSet<MessageId>>,
    changed: Notify,
}

impl InFlightRegistry {
    /// Creates a registry with the given concurrency ceiling.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            ids: Mutex::new(HashSet::new()),
            changed: Notify::new(),
        }
    }

    /// Admits a message id, returning a guard that frees the slot on drop.
    ///
    /// Returns `None` when the id is already in flight - overlapping poll
    /// cycles and visibility-timeout redeliveries can hand out the same
    /// message twice - or when the registry is full. Either way the message
    /// is left un-acknowledged for the queue to redeliver later.
    pub fn admit(self: &Arc<Self>, id: &MessageId) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap();

        if ids.len() >= self.ceiling {
            warn!(message_id = %id, in_flight = ids.len(), "registry full, leaving message for redelivery");
            return None;
        }

        if !ids.insert(id.clone()) {
            warn!(message_id = %id, "message already in flight, skipping duplicate delivery");
            return None;
        }

        Some(InFlightGuard {
            registry: Arc::clone(self),
            id: id.clone(),
        })
    }

    /// Number of messages currently in flight.
    pub fn in_flight(&self) -> usize {
        self.ids.lock().unwrap().len()
    }

    /// Remaining admission room below the ceiling.
    pub fn room(&self) -> usize {
        self.ceiling - self.in_flight().min(self.ceiling)
    }

    /// Waits until some in-flight message releases its slot.
    ///
    /// A release that happens between checking the room and calling this
    /// method is not lost: the notification is buffered.
    pub async fn released(&self) {
        self.changed.notified().await;
    }

    /// Waits until no messages are in flight.
    pub async fn drained(&self) {
        loop {
            if self.in_flight() == 0 {
                return;
            }
            self.changed.notified().await;
        }
    }
}

/// Slot held by exactly one dispatch task.
///
/// Dropping the guard removes the id from the registry and wakes the
/// scheduling loop.
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    id: MessageId,
}

impl InFlightGuard {
    /// The message id this guard holds a slot for.
    pub fn id(&self) -> &MessageId {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.ids.lock().unwrap().remove(&self.id);
        self.registry.changed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_is_bounded_by_the_ceiling() {
        let registry = Arc::new(InFlightRegistry::new(2));

        let a = registry.admit(&MessageId::from("a"));
        let b = registry.admit(&MessageId::from("b"));
        let c = registry.admit(&MessageId::from("c"));

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());
        assert_eq!(registry.in_flight(), 2);
        assert_eq!(registry.room(), 0);
    }

    #[test]
    fn duplicate_ids_are_rejected_while_in_flight() {
        let registry = Arc::new(InFlightRegistry::new(10));

        let first = registry.admit(&MessageId::from("m-1"));
        assert!(first.is_some());
        assert!(registry.admit(&MessageId::from("m-1")).is_none());

        drop(first);

        // Released ids can be admitted again.
        assert!(registry.admit(&MessageId::from("m-1")).is_some());
    }

    #[test]
    fn dropping_the_guard_frees_the_slot() {
        let registry = Arc::new(InFlightRegistry::new(1));

        let guard = registry.admit(&MessageId::from("m-1")).unwrap();
        assert_eq!(guard.id().as_str(), "m-1");
        assert_eq!(registry.room(), 0);

        drop(guard);
        assert_eq!(registry.in_flight(), 0);
        assert_eq!(registry.room(), 1);
    }

    #[tokio::test]
    async fn release_wakes_a_waiter() {
        let registry = Arc::new(InFlightRegistry::new(1));
        let guard = registry.admit(&MessageId::from("m-1")).unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry.released().await;
                registry.room()
            })
        };

        tokio::task::yield_now().await;
        drop(guard);

        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn release_before_wait_is_not_lost() {
        let registry = Arc::new(InFlightRegistry::new(1));
        let guard = registry.admit(&MessageId::from("m-1")).unwrap();
        drop(guard);

        // The buffered notification lets this return immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), registry.released())
            .await
            .expect("released() should observe the buffered notification");
    }

    #[tokio::test]
    async fn drained_waits_for_all_slots() {
        let registry = Arc::new(InFlightRegistry::new(3));
        let a = registry.admit(&MessageId::from("a")).unwrap();
        let b = registry.admit(&MessageId::from("b")).unwrap();

        let drain = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.drained().await })
        };

        tokio::task::yield_now().await;
        drop(a);
        tokio::task::yield_now().await;
        assert!(!drain.is_finished());

        drop(b);
        drain.await.unwrap();
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn guard_releases_even_when_the_task_panics() {
        let registry = Arc::new(InFlightRegistry::new(1));
        let guard = registry.admit(&MessageId::from("m-1")).unwrap();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("dispatch blew up");
        });

        assert!(handle.await.is_err());
        assert_eq!(registry.in_flight(), 0);
    }
}
