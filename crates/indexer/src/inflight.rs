use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async locks: at most one holder per key, distinct keys never contend.
///
/// Entries are held weakly and pruned once nobody holds or waits on them.
pub struct KeyedSingleFlight<K> {
    slots: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

/// Held while the keyed operation runs.
pub struct FlightGuard {
    _guard: OwnedMutexGuard<()>,
}

impl<K: Eq + Hash + Clone> KeyedSingleFlight<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = slots.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(AsyncMutex::new(()));
        slots.insert(key.clone(), Arc::downgrade(&fresh));
        fresh
    }

    /// Wait until no other holder of `key` is running, then hold it.
    pub async fn acquire(&self, key: &K) -> FlightGuard {
        let slot = self.slot(key);
        FlightGuard {
            _guard: slot.lock_owned().await,
        }
    }

    /// Hold `key` only if nobody else does right now.
    pub fn try_acquire(&self, key: &K) -> Option<FlightGuard> {
        let slot = self.slot(key);
        slot.try_lock_owned()
            .ok()
            .map(|guard| FlightGuard { _guard: guard })
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedSingleFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let flights = Arc::new(KeyedSingleFlight::<u64>::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flights = flights.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = flights.acquire(&7).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let flights = KeyedSingleFlight::<u64>::new();
        let _a = flights.acquire(&1).await;
        assert!(flights.try_acquire(&2).is_some());
        assert!(flights.try_acquire(&1).is_none());
    }
}
