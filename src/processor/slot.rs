//! Single-slot, latest-value-wins mailbox
//!
//! The recognition worker publishes into the slot and the consumer takes out
//! of it. A publish overwrites any value the consumer has not taken yet, so
//! the consumer may miss intermediate batches but never sees a partial one.

use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to a single pending value
pub struct LatestSlot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }

    /// Store `value`, returning `true` if an unconsumed value was discarded
    pub fn publish(&self, value: T) -> bool {
        self.value.lock().replace(value).is_some()
    }

    /// Take the pending value without blocking on new data
    pub fn take(&self) -> Option<T> {
        self.value.lock().take()
    }
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_empties_slot() {
        let slot = LatestSlot::new();
        assert_eq!(slot.take(), None);

        assert!(!slot.publish(1));
        assert_eq!(slot.take(), Some(1));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_publish_overwrites_unconsumed_value() {
        let slot = LatestSlot::new();

        slot.publish(vec![1]);
        assert!(slot.publish(vec![2]));
        assert!(slot.publish(vec![3]));

        // Intermediate batches are gone; only the latest is observed
        assert_eq!(slot.take(), Some(vec![3]));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_clones_share_the_slot() {
        let producer = LatestSlot::new();
        let consumer = producer.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                producer.publish(i);
            }
        });
        handle.join().unwrap();

        assert_eq!(consumer.take(), Some(99));
    }
}
