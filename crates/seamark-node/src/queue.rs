//! Bounded latest-wins hand-off between the scan producer and the
//! control loop.
//!
//! The discovery producer runs in its own task and is the one genuine
//! concurrency hazard in the node. It may only push immutable
//! [`PublishEvent`] values here; it never calls the transport and never
//! touches supervisor state. The control loop drains the queue once per
//! iteration and performs the actual publish itself.
//!
//! Overflow policy: the queue is small. A new event for a beacon that
//! already has one pending replaces it in place; when the queue is full a
//! new beacon's event evicts the oldest pending entry. Only the freshest
//! reading has value.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use seamark_core::PublishEvent;
use tracing::debug;

/// Default queue capacity. Deliberately small: stale readings are junk.
pub const DEFAULT_CAPACITY: usize = 8;

/// Bounded single-producer/single-consumer event queue.
#[derive(Debug)]
pub struct EventQueue {
    inner: Mutex<VecDeque<PublishEvent>>,
    capacity: usize,
}

impl EventQueue {
    /// Create a queue with the given capacity (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Push an event, applying the latest-wins policy.
    pub fn push(&self, event: PublishEvent) {
        let mut pending = self.lock();

        if let Some(slot) = pending.iter_mut().find(|e| e.beacon == event.beacon) {
            *slot = event;
            return;
        }

        if pending.len() == self.capacity {
            if let Some(evicted) = pending.pop_front() {
                debug!("Event queue full, evicting pending event for {}", evicted.beacon);
            }
        }
        pending.push_back(event);
    }

    /// Take every pending event, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<PublishEvent> {
        self.lock().drain(..).collect()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PublishEvent>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seamark_core::{BeaconId, DeviceIdentity};

    fn event(beacon: &str, rssi: i16) -> PublishEvent {
        PublishEvent {
            identity: DeviceIdentity::from_bytes([1, 2, 3, 4, 5, 6]),
            beacon: BeaconId::parse(beacon).unwrap(),
            rssi,
            rssi_ema: f32::from(rssi),
            ts_unix: 1_735_689_600,
            uptime_ms: 0,
        }
    }

    #[test]
    fn test_same_beacon_replaces_pending_in_place() {
        let queue = EventQueue::new(4);
        queue.push(event("aa:aa:aa:aa:aa:aa", -60));
        queue.push(event("bb:bb:bb:bb:bb:bb", -50));
        queue.push(event("aa:aa:aa:aa:aa:aa", -70));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].beacon.as_str(), "aa:aa:aa:aa:aa:aa");
        assert_eq!(drained[0].rssi, -70);
    }

    #[test]
    fn test_overflow_evicts_oldest_pending() {
        let queue = EventQueue::new(2);
        queue.push(event("aa:aa:aa:aa:aa:aa", -60));
        queue.push(event("bb:bb:bb:bb:bb:bb", -50));
        queue.push(event("cc:cc:cc:cc:cc:cc", -40));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].beacon.as_str(), "bb:bb:bb:bb:bb:bb");
        assert_eq!(drained[1].beacon.as_str(), "cc:cc:cc:cc:cc:cc");
    }

    #[test]
    fn test_drain_empties_the_queue() {
        let queue = EventQueue::new(4);
        queue.push(event("aa:aa:aa:aa:aa:aa", -60));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_and_drain_across_threads() {
        use std::sync::Arc;

        let queue = Arc::new(EventQueue::new(8));
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for i in 0..100i16 {
                    queue.push(event("aa:aa:aa:aa:aa:aa", -i));
                }
            })
        };
        producer.join().unwrap();

        // Latest-wins: one beacon means at most one pending event.
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].rssi, -99);
    }
}
