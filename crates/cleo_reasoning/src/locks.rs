//! Keyed FIFO locks.
//!
//! Each key maps to a fair tokio mutex, so work for one conversation (or
//! one user) runs in arrival order while unrelated keys never wait on each
//! other. Entries are removed once nobody holds or waits for them.

use cleo_core::ConversationKey;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

struct LockEntry {
    mutex: Arc<tokio::sync::Mutex<()>>,
    /// Callers waiting for the mutex.
    queued: AtomicUsize,
}

type LockMap<K> = Arc<Mutex<HashMap<K, Arc<LockEntry>>>>;

pub struct KeyedLocks<K> {
    entries: LockMap<K>,
}

pub type ConversationLocks = KeyedLocks<ConversationKey>;
pub type ConversationGuard = KeyedGuard<ConversationKey>;

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// A queued or held lock. Dropping it while still queued gives up the
/// place in line.
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    entry: Option<Arc<LockEntry>>,
    entries: LockMap<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &K) -> KeyedGuard<K> {
        let entry = {
            let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let entry = Arc::clone(map.entry(key.clone()).or_insert_with(|| {
                Arc::new(LockEntry {
                    mutex: Arc::new(tokio::sync::Mutex::new(())),
                    queued: AtomicUsize::new(0),
                })
            }));
            entry.queued.fetch_add(1, Ordering::SeqCst);
            entry
        };
        let mutex = Arc::clone(&entry.mutex);
        let mut pending = KeyedGuard {
            key: key.clone(),
            entry: Some(entry),
            entries: Arc::clone(&self.entries),
            guard: None,
        };

        let guard = mutex.lock_owned().await;
        if let Some(entry) = &pending.entry {
            entry.queued.fetch_sub(1, Ordering::SeqCst);
        }
        pending.guard = Some(guard);
        pending
    }

    /// Number of keys with a live lock entry.
    pub fn active(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<K: Eq + Hash> KeyedGuard<K> {
    /// Whether another caller for this key is waiting behind us.
    pub fn has_newer_waiters(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.queued.load(Ordering::SeqCst) > 0)
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        if self.guard.take().is_none() {
            // gave up while queued
            entry.queued.fetch_sub(1, Ordering::SeqCst);
        }
        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // every reference is released under the map lock, so whoever
        // releases last sees only the map's own reference
        drop(entry);
        let idle = map
            .get(&self.key)
            .is_some_and(|current| Arc::strong_count(current) == 1 && current.queued.load(Ordering::SeqCst) == 0);
        if idle {
            map.remove(&self.key);
        }
    }
}
