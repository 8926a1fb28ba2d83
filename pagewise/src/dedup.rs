//! In-flight deduplication of concurrent reads
//!
//! Concurrent calls to [`Singleflight::run`] with the same key collapse into a
//! single execution whose result is broadcast to every waiting caller. Nothing
//! is cached: once the leader finishes, the next call with that key executes
//! again.
//!
//! Keys carry no transaction identity, so reads made inside a transaction
//! must bypass the group and go straight to the store.
//!
//! # Example
//!
//! ```rust
//! use pagewise::dedup::{dedup_key, Singleflight};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let group: Singleflight<String, Result<u64, String>> = Singleflight::new();
//! let (value, shared) = group
//!     .run(dedup_key("GetUcUserById", 7), || async { Ok(7) })
//!     .await;
//! assert_eq!(value, Ok(7));
//! assert!(!shared);
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

/// Key for a read of `id` by `operation`, e.g. `GetUcUserById_7`
pub fn dedup_key(operation: &str, id: impl Display) -> String {
    format!("{operation}_{id}")
}

enum Slot<V> {
    Leader(broadcast::Sender<V>),
    Follower(broadcast::Receiver<V>),
}

/// Registry of in-flight executions keyed by `K`, each producing a `V`.
///
/// `V` is typically a `Result`; errors are shared with followers exactly like
/// successes.
pub struct Singleflight<K, V> {
    in_flight: DashMap<K, broadcast::Sender<V>>,
}

impl<K, V> Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }

    /// Runs `f` unless an execution for `key` is already in flight, in which
    /// case its result is awaited instead.
    ///
    /// Returns the value and whether it was shared with other callers. If the
    /// leader is dropped or panics before producing a value, a waiting caller
    /// takes over and executes `f` itself.
    pub async fn run<F, Fut>(&self, key: K, f: F) -> (V, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let tx = loop {
            match self.acquire(key.clone()) {
                Slot::Leader(tx) => break tx,
                Slot::Follower(mut rx) => {
                    if let Ok(value) = rx.recv().await {
                        return (value, true);
                    }
                    tracing::debug!("in-flight leader vanished, retrying");
                }
            }
        };

        let guard = Guard {
            group: self,
            key,
            done: false,
        };
        let value = f().await;
        let shared = tx.send(value.clone()).is_ok_and(|followers| followers > 0);
        guard.complete();
        (value, shared)
    }

    /// Number of keys currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn acquire(&self, key: K) -> Slot<V> {
        match self.in_flight.entry(key) {
            Entry::Occupied(entry) => Slot::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx.clone());
                Slot::Leader(tx)
            }
        }
    }
}

impl<K, V> Default for Singleflight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters the key when the leader finishes, panics or is cancelled
struct Guard<'a, K: Hash + Eq, V> {
    group: &'a Singleflight<K, V>,
    key: K,
    done: bool,
}

impl<K: Hash + Eq, V> Guard<'_, K, V> {
    fn complete(mut self) {
        self.group.in_flight.remove(&self.key);
        self.done = true;
    }
}

impl<K: Hash + Eq, V> Drop for Guard<'_, K, V> {
    fn drop(&mut self) {
        if !self.done {
            self.group.in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_dedup_key_format() {
        assert_eq!(dedup_key("GetUcUserById", 42), "GetUcUserById_42");
    }

    #[tokio::test]
    async fn test_concurrent_calls_execute_once() {
        let group = Arc::new(Singleflight::<String, Result<u64, String>>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles = (0..10)
            .map(|_| {
                let group = group.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    group
                        .run("GetUcUserById_1".to_string(), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(1)
                        })
                        .await
                })
            })
            .collect::<Vec<_>>();

        let mut shared = 0;
        for handle in handles {
            let (value, was_shared) = handle.await.unwrap();
            assert_eq!(value, Ok(1));
            shared += usize::from(was_shared);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared, 10);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let group = Arc::new(Singleflight::<String, Result<u64, String>>::new());

        let slow = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .run("k".to_string(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err("data is not found".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (value, shared) = group.run("k".to_string(), || async { Ok(5) }).await;

        assert_eq!(value, Err("data is not found".to_string()));
        assert!(shared);
        assert_eq!(slow.await.unwrap().0, Err("data is not found".to_string()));
    }

    #[tokio::test]
    async fn test_sequential_calls_execute_again() {
        let group = Singleflight::<u64, u64>::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let (value, shared) = group
                .run(9, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    9
                })
                .await;
            assert_eq!(value, 9);
            assert!(!shared);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_follower_takes_over_after_cancelled_leader() {
        let group = Arc::new(Singleflight::<u64, u64>::new());

        let leader = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .run(1, || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        0
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let follower = {
            let group = group.clone();
            tokio::spawn(async move { group.run(1, || async { 2 }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        let (value, shared) = follower.await.unwrap();
        assert_eq!(value, 2);
        assert!(!shared);
        assert_eq!(group.in_flight(), 0);
    }
}
