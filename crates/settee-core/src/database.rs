//! Database handle
//!
//! A [`Database`] bundles everything documents need to reach one logical
//! database: its URI, the transport, the queue of deferred writes and a pool
//! of server-issued uuids.
//!
//! Handles are shared between documents through `Rc` and mutate their queue
//! through `RefCell`. They are deliberately `!Send`: a handle serves one
//! logical flow at a time. Code that needs parallelism builds one handle per
//! worker.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::bulk::{BulkCache, BulkEntry};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::transport::{BulkItemResult, HttpTransport, Transport};

/// Shared handle to one logical database
pub struct Database {
    /// Database name
    name: String,
    /// `<server>/<name>`
    uri: String,
    transport: Rc<dyn Transport>,
    bulk_cache: RefCell<BulkCache>,
    /// Auto-flush threshold for the bulk cache
    bulk_cache_limit: Option<usize>,
    uuids: RefCell<VecDeque<String>>,
    uuid_batch_size: usize,
}

impl Database {
    /// Create a handle for `name` on the server at `server_url`
    pub fn new(transport: Rc<dyn Transport>, server_url: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            uri: format!("{}/{}", server_url.trim_end_matches('/'), name),
            transport,
            bulk_cache: RefCell::new(BulkCache::new()),
            bulk_cache_limit: None,
            uuids: RefCell::new(VecDeque::new()),
            uuid_batch_size: 1,
        }
    }

    /// Create a handle over HTTP using the given configuration
    pub fn from_config(config: &Config) -> Result<Rc<Self>> {
        let transport = HttpTransport::new(&config.server_url, config.timeout())?;
        Ok(Rc::new(Self::with_config(Rc::new(transport), config)))
    }

    /// Create a handle over any transport, applying configuration tunables
    pub fn with_config(transport: Rc<dyn Transport>, config: &Config) -> Self {
        Self::new(transport, &config.server_url, &config.database)
            .with_bulk_cache_limit(config.bulk_cache_limit)
            .with_uuid_batch_size(config.uuid_batch_size)
    }

    /// Flush automatically once the cache holds `limit` entries
    pub fn with_bulk_cache_limit(mut self, limit: Option<usize>) -> Self {
        self.bulk_cache_limit = limit.filter(|&l| l > 0);
        self
    }

    /// Fetch uuids from the server `size` at a time
    pub fn with_uuid_batch_size(mut self, size: usize) -> Self {
        self.uuid_batch_size = size.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Location of the document with the given escaped id
    pub fn location_for(&self, internal_id: &str) -> String {
        format!("{}/{}", self.uri, internal_id)
    }

    /// Next server-issued unique id
    ///
    /// Ids are requested in batches and handed out one at a time.
    pub fn next_uuid(&self) -> StoreResult<String> {
        if let Some(uuid) = self.uuids.borrow_mut().pop_front() {
            return Ok(uuid);
        }

        let batch = self.transport.uuids(self.uuid_batch_size)?;
        debug!("Fetched {} uuids for {}", batch.len(), self.name);

        let mut pool = self.uuids.borrow_mut();
        pool.extend(batch);
        pool.pop_front().ok_or_else(|| StoreError::InvalidResponse {
            location: "_uuids".to_string(),
            details: "server returned no uuids".to_string(),
        })
    }

    // ==================== Bulk Cache ====================

    /// Queue an entry for the next flush
    ///
    /// When a cache limit is configured and reached, the queue is flushed
    /// before returning. A failed automatic flush keeps every entry queued
    /// for the next flush, so the entry counts as queued either way.
    pub fn add_to_bulk_cache(&self, entry: BulkEntry) {
        let len = {
            let mut cache = self.bulk_cache.borrow_mut();
            cache.enqueue(entry);
            cache.len()
        };

        if self.bulk_cache_limit.map_or(false, |limit| len >= limit) {
            debug!("Bulk cache for {} reached {} entries", self.name, len);
            if let Err(e) = self.flush() {
                warn!(
                    "Automatic flush of {} failed, {} entries stay queued: {}",
                    self.name,
                    self.pending(),
                    e
                );
            }
        }
    }

    /// Number of queued entries
    pub fn pending(&self) -> usize {
        self.bulk_cache.borrow().len()
    }

    pub fn has_pending(&self) -> bool {
        !self.bulk_cache.borrow().is_empty()
    }

    /// Snapshot of queued entries
    pub fn pending_entries(&self) -> Vec<BulkEntry> {
        self.bulk_cache.borrow().entries().to_vec()
    }

    /// Submit every queued entry in one bulk request
    ///
    /// The queue is cleared once the request completes, whatever the
    /// per-document results say. If the request itself fails the queue is
    /// left as it was.
    pub fn flush(&self) -> StoreResult<Vec<BulkItemResult>> {
        let entries = self.bulk_cache.borrow_mut().take();
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<_> = entries.iter().map(BulkEntry::to_json).collect();
        match self.transport.bulk_docs(&self.uri, &docs) {
            Ok(results) => {
                let failed = results.iter().filter(|r| !r.is_ok()).count();
                info!(
                    "Flushed {} entries to {} ({} rejected)",
                    docs.len(),
                    self.name,
                    failed
                );
                Ok(results)
            }
            Err(e) => {
                warn!("Bulk flush to {} failed: {}", self.name, e);
                self.bulk_cache.borrow_mut().restore(entries);
                Err(e)
            }
        }
    }

    /// Flush only if something is queued
    ///
    /// Immediate writes call this first so they never overtake deferred ones.
    pub(crate) fn flush_pending(&self) -> StoreResult<()> {
        if self.has_pending() {
            self.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("pending", &self.pending())
            .finish()
    }
}
