//! Per-key de-duplication of in-flight work.
//!
//! The first caller for a key becomes the leader and runs the work; callers
//! arriving while it runs block until the leader publishes its result and then
//! receive a clone of it. The key is released as soon as the leader finishes,
//! so a failed attempt is never replayed to later callers.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{FetchError, FetchResult};

struct Slot<V> {
    result: Mutex<Option<FetchResult<V>>>,
    ready: Condvar,
}

impl<V: Clone> Slot<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: FetchResult<V>) {
        let mut guard = self.result.lock();
        if guard.is_none() {
            *guard = Some(result);
        }
        self.ready.notify_all();
    }

    fn wait(&self) -> FetchResult<V> {
        let mut guard = self.result.lock();
        loop {
            if let Some(result) = guard.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut guard);
        }
    }
}

/// Releases the key and wakes waiters, also when the leader's work panics.
struct LeaderGuard<'a, K: Eq + Hash + Clone + ToString, V: Clone> {
    owner: &'a InFlight<K, V>,
    key: K,
    slot: Arc<Slot<V>>,
    outcome: Option<FetchResult<V>>,
}

impl<K: Eq + Hash + Clone + ToString, V: Clone> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        // A new leader may already own the key once it was released.
        self.owner
            .pending
            .remove_if(&self.key, |_, slot| Arc::ptr_eq(slot, &self.slot));
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| Err(FetchError::Abandoned(self.key.to_string())));
        self.slot.publish(outcome);
    }
}

/// Registry of pending work keyed by `K`.
pub struct InFlight<K, V> {
    pending: DashMap<K, Arc<Slot<V>>>,
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash + Clone + ToString,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + ToString,
    V: Clone,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Run `work` for `key` unless another caller is already running it, in
    /// which case wait for and return that caller's result.
    pub fn run<F>(&self, key: K, work: F) -> FetchResult<V>
    where
        F: FnOnce() -> FetchResult<V>,
    {
        let slot = match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let slot = Arc::clone(entry.get());
                drop(entry);
                debug!(key = %key.to_string(), "joining in-flight download");
                return slot.wait();
            }
            Entry::Vacant(entry) => {
                let slot = Arc::new(Slot::new());
                entry.insert(Arc::clone(&slot));
                slot
            }
        };

        let mut guard = LeaderGuard {
            owner: self,
            key,
            slot,
            outcome: None,
        };
        let result = work();
        guard.outcome = Some(result.clone());
        result
    }

    /// Number of keys with work currently running.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_caller_runs_work() {
        let inflight: InFlight<String, u32> = InFlight::new();
        let result = inflight.run("a".to_string(), || Ok(5));
        assert_eq!(result.unwrap(), 5);
        assert_eq!(inflight.pending(), 0);
    }

    #[test]
    fn test_concurrent_callers_share_one_run() {
        let inflight: Arc<InFlight<String, u32>> = Arc::new(InFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let inflight = Arc::clone(&inflight);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    inflight.run("k".to_string(), || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        Ok(42)
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 42);
        }
        // Threads that arrive after the leader finished run again; with the
        // barrier and a 100ms leader that should not happen.
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(inflight.pending(), 0);
    }

    #[test]
    fn test_error_is_shared_then_released() {
        let inflight: InFlight<String, u32> = InFlight::new();
        let err = inflight
            .run("k".to_string(), || {
                Err(FetchError::Http {
                    url: "u".to_string(),
                    status: 500,
                })
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 500, .. }));

        // Released: the next caller runs fresh work.
        assert_eq!(inflight.run("k".to_string(), || Ok(1)).unwrap(), 1);
    }

    #[test]
    fn test_panicking_leader_releases_waiters() {
        let inflight: Arc<InFlight<String, u32>> = Arc::new(InFlight::new());
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let inflight = Arc::clone(&inflight);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                let _ = inflight.run("k".to_string(), || {
                    started.wait();
                    thread::sleep(Duration::from_millis(50));
                    panic!("leader failed");
                });
            })
        };

        started.wait();
        let result = inflight.run("k".to_string(), || Ok(7));
        assert!(leader.join().is_err());
        // Either we joined the doomed leader or ran after it was released.
        match result {
            Ok(v) => assert_eq!(v, 7),
            Err(e) => assert!(matches!(e, FetchError::Abandoned(_))),
        }
        assert_eq!(inflight.pending(), 0);
    }
}
