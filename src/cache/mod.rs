//! Upload cache keyed on PDF URL
//!
//! A PDF is downloaded and uploaded at most once per URL while its remote
//! handle stays live. Concurrent misses for the same URL wait on a per-URL
//! lock, so only the first caller uploads and the rest read its entry.

mod store;

pub use store::{CacheEntry, HandleStore, MemoryStore};

use crate::error::Result;
use crate::gemini::{GeminiApi, RemoteHandle};
use crate::source::PdfFetcher;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

type InflightMap = parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Fetch-and-upload cache for remote file handles
pub struct FileCache {
    store: Box<dyn HandleStore>,
    fetcher: Arc<dyn PdfFetcher>,
    api: Arc<dyn GeminiApi>,
    inflight: InflightMap,
}

impl FileCache {
    pub fn new(
        store: Box<dyn HandleStore>,
        fetcher: Arc<dyn PdfFetcher>,
        api: Arc<dyn GeminiApi>,
    ) -> Self {
        Self {
            store,
            fetcher,
            api,
            inflight: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Return the remote handle for `url`, downloading and uploading it on a miss.
    ///
    /// Failures are not cached; the next call for the same URL tries again.
    pub async fn get_or_upload(&self, url: &str) -> Result<RemoteHandle> {
        if let Some(handle) = self.lookup(url) {
            tracing::info!(url = %url, cache_hit = true, "Using cached PDF");
            return Ok(handle);
        }

        let slot = InflightSlot::acquire(&self.inflight, url);
        let _guard = slot.lock.lock().await;

        // Another caller may have finished the upload while we waited
        if let Some(handle) = self.lookup(url) {
            tracing::info!(url = %url, cache_hit = true, "Using PDF uploaded by concurrent request");
            return Ok(handle);
        }

        self.upload(url).await
    }

    /// Drop the entry for `url`
    pub fn invalidate(&self, url: &str) -> bool {
        self.store.remove(url).is_some()
    }

    /// Drop every entry whose handle has the given remote name
    pub fn invalidate_handle(&self, urls: &[String], name: &str) -> usize {
        urls.iter()
            .filter_map(|url| self.store.get(url))
            .filter(|entry| entry.handle.name() == Some(name))
            .filter(|entry| self.store.remove_entry(entry))
            .count()
    }

    pub fn entry(&self, url: &str) -> Option<CacheEntry> {
        self.store.get(url)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn lookup(&self, url: &str) -> Option<RemoteHandle> {
        let entry = self.store.get(url)?;
        if entry.is_live(Utc::now()) {
            return Some(entry.handle);
        }
        tracing::info!(url = %url, "Cached file handle expired, re-uploading");
        // A concurrent upload may already have replaced it
        self.store.remove_entry(&entry);
        None
    }

    async fn upload(&self, url: &str) -> Result<RemoteHandle> {
        tracing::info!(url = %url, cache_hit = false, "Downloading PDF for upload");
        let pdf = self.fetcher.fetch(url).await?;
        let handle = self.api.upload_pdf(&pdf).await?;

        self.store
            .put(CacheEntry::new(url, handle.clone(), Some(pdf.content_hash)));
        tracing::info!(url = %url, handle = ?handle.name(), "Cached uploaded PDF");
        Ok(handle)
    }
}

/// Per-URL upload lock, removed from the map by its last holder (also on cancellation)
struct InflightSlot<'a> {
    map: &'a InflightMap,
    url: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn acquire(map: &'a InflightMap, url: &str) -> Self {
        let lock = map.lock().entry(url.to_string()).or_default().clone();
        Self {
            map,
            url: url.to_string(),
            lock,
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        // One reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2
            && map.get(&self.url).is_some_and(|l| Arc::ptr_eq(l, &self.lock))
        {
            map.remove(&self.url);
        }
    }
}
