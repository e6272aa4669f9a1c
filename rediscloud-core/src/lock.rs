//! Keyed mutual exclusion for remote resources
//!
//! Two mutations of the same remote resource must not interleave. Callers
//! share one `KeyedMutex` (injected, never global) and hold a `KeyedGuard`
//! for the duration of a mutation.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A set of async mutexes addressed by key
pub struct KeyedMutex<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_default().clone()
    }

    /// Wait until the key is free and take it
    pub async fn lock(&self, key: K, operation: &str) -> KeyedGuard<K> {
        let slot = self.slot(&key);
        debug!("Waiting for lock on {} ({})", key, operation);
        let guard = slot.lock_owned().await;
        debug!("Acquired lock on {} ({})", key, operation);
        KeyedGuard::new(key, operation, guard)
    }

    /// Take the key only if nobody holds it
    pub fn try_lock(&self, key: K, operation: &str) -> Option<KeyedGuard<K>> {
        let slot = self.slot(&key);
        let guard = slot.try_lock_owned().ok()?;
        Some(KeyedGuard::new(key, operation, guard))
    }

    /// Check if a key is currently held
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash + Clone + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a key until dropped
pub struct KeyedGuard<K: Display> {
    key: K,
    operation: String,
    acquired: DateTime<Utc>,
    _guard: OwnedMutexGuard<()>,
}

impl<K: Display> KeyedGuard<K> {
    fn new(key: K, operation: &str, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            key,
            operation: operation.to_string(),
            acquired: Utc::now(),
            _guard: guard,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// When the lock was taken
    pub fn acquired(&self) -> DateTime<Utc> {
        self.acquired
    }
}

impl<K: Display> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        let held = Utc::now() - self.acquired;
        debug!(
            "Released lock on {} ({}) after {}ms",
            self.key,
            self.operation,
            held.num_milliseconds()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedMutex::new();
        let guard = locks.lock(1234i64, "update").await;
        assert!(locks.is_locked(&1234));
        assert!(locks.try_lock(1234, "delete").is_none());
        assert_eq!(guard.operation(), "update");

        drop(guard);
        assert!(!locks.is_locked(&1234));
        assert!(locks.try_lock(1234, "delete").is_some());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks = KeyedMutex::new();
        let _first = locks.lock(1i64, "update").await;
        let second = locks.try_lock(2, "update");
        assert!(second.is_some());
        assert_eq!(*second.unwrap().key(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_proceeds_after_release() {
        let locks = Arc::new(KeyedMutex::new());
        let guard = locks.lock(7i64, "create").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.lock(7, "delete").await;
                guard.operation().to_string()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        assert_eq!(contender.await.unwrap(), "delete");
    }

    #[test]
    fn unknown_key_is_not_locked() {
        let locks: KeyedMutex<i64> = KeyedMutex::default();
        assert!(!locks.is_locked(&99));
    }
}
