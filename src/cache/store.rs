//! Storage for uploaded file handles

use crate::gemini::RemoteHandle;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// One uploaded PDF, keyed by the URL it was downloaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_url: String,
    pub handle: RemoteHandle,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(source_url: impl Into<String>, handle: RemoteHandle, content_hash: Option<String>) -> Self {
        Self {
            source_url: source_url.into(),
            handle,
            content_hash,
            created_at: Utc::now(),
        }
    }

    /// False once the remote side has dropped the file
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.handle.expires_at().map_or(true, |expires| expires > now)
    }
}

/// Backing store for [`CacheEntry`] values.
///
/// Implementations must make `put` atomic: a concurrent `get` sees either the
/// previous entry or the new one.
pub trait HandleStore: Send + Sync {
    fn get(&self, url: &str) -> Option<CacheEntry>;
    fn put(&self, entry: CacheEntry);
    fn remove(&self, url: &str) -> Option<CacheEntry>;
    /// Remove `entry` only if it is still the value stored for its URL.
    fn remove_entry(&self, entry: &CacheEntry) -> bool;
    fn len(&self) -> usize;
    fn clear(&self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StoreInner {
    lru: LruCache<String, CacheEntry>,
    total_bytes: usize,
}

/// In-memory LRU store with entry count and byte budget limits.
/// Only inline handles count against the byte budget.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    max_bytes: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(StoreInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Get total inline bytes currently stored
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }
}

impl HandleStore for MemoryStore {
    fn get(&self, url: &str) -> Option<CacheEntry> {
        self.inner.lock().lru.get(url).cloned()
    }

    /// Rejects entries larger than max_bytes entirely.
    /// Evicts LRU entries until byte budget is satisfied.
    fn put(&self, entry: CacheEntry) {
        let new_size = entry.handle.weight();

        if new_size > self.max_bytes {
            tracing::debug!(url = %entry.source_url, size = new_size, "Entry exceeds cache budget, not cached");
            return;
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&entry.source_url) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.handle.weight());
        }

        while inner.total_bytes + new_size > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((evicted_url, evicted)) => {
                    tracing::debug!(url = %evicted_url, "Evicted cached PDF");
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.handle.weight());
                }
                None => break,
            }
        }

        inner.total_bytes += new_size;
        if let Some((_, evicted)) = inner.lru.push(entry.source_url.clone(), entry) {
            // push only returns a different key here: same-key entries were popped above
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted.handle.weight());
        }
    }

    fn remove(&self, url: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        let removed = inner.lru.pop(url)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(removed.handle.weight());
        Some(removed)
    }

    fn remove_entry(&self, entry: &CacheEntry) -> bool {
        let mut inner = self.inner.lock();
        if inner.lru.peek(&entry.source_url) != Some(entry) {
            return false;
        }
        inner.lru.pop(&entry.source_url);
        inner.total_bytes = inner.total_bytes.saturating_sub(entry.handle.weight());
        true
    }

    fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.total_bytes = 0;
    }
}
