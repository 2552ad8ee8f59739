//! Cache and batch layer
//!
//! TTL'd key-value cache plus list batching. `pop_batch` removes and
//! returns items in a single critical section, so concurrent consumers
//! of the same key never see the same item twice.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<Value>>,
}

/// Shared in-process cache
#[derive(Clone, Default)]
pub struct Cache {
    inner: Arc<Mutex<Inner>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, optionally with a time-to-live
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    /// Fetch a value; expired entries are dropped on read
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.expired() => {
                inner.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Append a value to the batch list for `key`
    pub fn push_batch(&self, key: &str, value: Value) {
        let mut inner = self.inner.lock();
        inner.lists.entry(key.to_string()).or_default().push_back(value);
    }

    /// Remove and return up to `max` items from the batch list.
    /// Atomic: two concurrent consumers never receive the same item.
    pub fn pop_batch(&self, key: &str, max: usize) -> Vec<Value> {
        let mut inner = self.inner.lock();
        let Some(list) = inner.lists.get_mut(key) else {
            return Vec::new();
        };
        let take = max.min(list.len());
        let items = list.drain(..take).collect();
        if list.is_empty() {
            inner.lists.remove(key);
        }
        items
    }
}
