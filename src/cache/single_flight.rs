//! Per-key request coalescing.
//!
//! Holding a [`FlightGuard`] for a key means no other task in this process
//! holds one for the same key. Adapters take the guard, re-check the store,
//! and only call the provider on a miss, which makes read-check-write
//! atomic per key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of in-flight keys.
#[derive(Debug, Default)]
pub struct SingleFlight {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Exclusive hold on one key; released on drop.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    owner: &'a SingleFlight,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds `key`, then takes it.
    pub async fn acquire(&self, key: &str) -> FlightGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().expect("single-flight lock poisoned");
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = slot.lock_owned().await;
        FlightGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().expect("single-flight lock poisoned").len()
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.owner.slots.lock().expect("single-flight lock poisoned");
        if let Some(slot) = slots.get(&self.key) {
            // Only the registry still references the slot: nobody is waiting.
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_released_on_drop() {
        let flights = SingleFlight::new();
        {
            let _guard = flights.acquire("k").await;
            assert_eq!(flights.in_flight(), 1);
        }
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let flights = Arc::new(SingleFlight::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flights = flights.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = flights.acquire("shared").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let flights = SingleFlight::new();
        let _a = flights.acquire("a").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), flights.acquire("b"))
            .await
            .expect("distinct key should not wait");
        assert_eq!(flights.in_flight(), 2);
    }
}
