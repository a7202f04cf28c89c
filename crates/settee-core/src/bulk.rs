//! Deferred writes
//!
//! Saves and deletes issued in deferred mode are appended here instead of
//! hitting the server. The whole queue is later submitted in one
//! `_bulk_docs` request by [`crate::Database::flush`].
//!
//! Entries are never merged: two entries for the same id are both sent, in
//! the order they were queued, and the server decides which one wins.

use serde_json::{json, Value};

/// One pending operation
#[derive(Debug, Clone, PartialEq)]
pub enum BulkEntry {
    /// Full document body, including `_id` and `_rev` when known
    Save(Value),
    /// Tombstone for the given revision
    Delete { id: String, rev: Option<String> },
}

impl BulkEntry {
    /// The `_id` this entry targets, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            BulkEntry::Save(body) => body.get("_id").and_then(Value::as_str),
            BulkEntry::Delete { id, .. } => Some(id),
        }
    }

    /// Body as sent to `_bulk_docs`
    pub fn to_json(&self) -> Value {
        match self {
            BulkEntry::Save(body) => body.clone(),
            BulkEntry::Delete { id, rev } => {
                let mut tombstone = json!({ "_id": id, "_deleted": true });
                if let Some(rev) = rev {
                    tombstone["_rev"] = json!(rev);
                }
                tombstone
            }
        }
    }
}

/// Ordered queue of pending entries for one database
#[derive(Debug, Default)]
pub struct BulkCache {
    entries: Vec<BulkEntry>,
}

impl BulkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn enqueue(&mut self, entry: BulkEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BulkEntry] {
        &self.entries
    }

    /// Remove and return every entry
    pub fn take(&mut self) -> Vec<BulkEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Put entries back at the front after a failed submit
    ///
    /// Anything queued in the meantime stays behind them.
    pub fn restore(&mut self, mut entries: Vec<BulkEntry>) {
        entries.append(&mut self.entries);
        self.entries = entries;
    }
}
