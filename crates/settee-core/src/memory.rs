//! In-memory transport
//!
//! Emulates the parts of a CouchDB server the lifecycle code relies on:
//! revision tokens, optimistic concurrency on `_rev`, `revs_info`,
//! revision-qualified deletes, `_bulk_docs` and `_uuids`.
//!
//! Every call is recorded so tests can assert on ordering. The transport can
//! also be switched offline, in which case every call fails with a transport
//! error and nothing is recorded.
//!
//! By default a revision-qualified delete may target any stored revision.
//! CouchDB only accepts deletes of leaf revisions and answers 409 for older
//! ones; [`MemoryTransport::set_leaf_only_deletes`] switches to that rule.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::id;
use crate::transport::{BulkItemResult, Transport, WriteResponse};

/// A request seen by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Put(String),
    Delete(String),
    /// Database URI and the `_id` of every submitted document, in order
    BulkDocs { database: String, ids: Vec<String> },
    Uuids(usize),
}

#[derive(Debug, Clone)]
struct Revision {
    rev: String,
    body: Value,
    deleted: bool,
}

/// Revision history of one stored document, oldest first
#[derive(Debug, Clone, Default)]
struct StoredDoc {
    revisions: Vec<Revision>,
    /// Extra leaf revisions, as produced by replication conflicts
    conflicts: Vec<Revision>,
}

impl StoredDoc {
    fn current(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    fn is_live(&self) -> bool {
        self.current().map_or(false, |r| !r.deleted)
    }

    /// Current revision or a conflicting leaf
    fn is_leaf(&self, rev: &str) -> bool {
        self.current().map_or(false, |r| r.rev == rev)
            || self.conflicts.iter().any(|r| r.rev == rev)
    }

    fn find_mut(&mut self, rev: &str) -> Option<&mut Revision> {
        self.revisions
            .iter_mut()
            .chain(self.conflicts.iter_mut())
            .find(|r| r.rev == rev)
    }
}

/// [`Transport`] that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    docs: RefCell<BTreeMap<String, StoredDoc>>,
    calls: RefCell<Vec<Call>>,
    offline: Cell<bool>,
    delete_failure: Cell<Option<ErrorKind>>,
    leaf_only_deletes: Cell<bool>,
}

impl MemoryTransport {
    /// Create an empty server
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, oldest first
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls (stored documents are kept)
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Make every subsequent call fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    /// Make every subsequent delete fail with the given kind
    ///
    /// Reads keep working, which simulates a document that changes between
    /// listing its revisions and deleting them.
    pub fn set_delete_failure(&self, kind: Option<ErrorKind>) {
        self.delete_failure.set(kind);
    }

    /// Only accept deletes of leaf revisions, as CouchDB does
    pub fn set_leaf_only_deletes(&self, leaf_only: bool) {
        self.leaf_only_deletes.set(leaf_only);
    }

    /// Current body stored at `location`, if the document is live
    pub fn document(&self, location: &str) -> Option<Value> {
        let docs = self.docs.borrow();
        let doc = docs.get(location)?;
        doc.current()
            .filter(|r| !r.deleted)
            .map(|r| with_meta(&r.body, location, &r.rev))
    }

    /// Number of live documents under `database_uri`
    pub fn live_count(&self, database_uri: &str) -> usize {
        let prefix = format!("{}/", database_uri);
        self.docs
            .borrow()
            .iter()
            .filter(|(k, d)| k.starts_with(&prefix) && d.is_live())
            .count()
    }

    /// Add a conflicting leaf revision to an existing document
    ///
    /// Returns the new revision token.
    pub fn inject_conflict(&self, location: &str, body: Value) -> Option<String> {
        let mut docs = self.docs.borrow_mut();
        let doc = docs.get_mut(location)?;
        let rev = new_rev(doc.revisions.len().saturating_sub(1));
        doc.conflicts.push(Revision {
            rev: rev.clone(),
            body,
            deleted: false,
        });
        Some(rev)
    }

    fn record(&self, call: Call) -> StoreResult<()> {
        if self.offline.get() {
            return Err(StoreError::Transport {
                location: describe(&call),
                status: None,
                message: "server unreachable".to_string(),
            });
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }

    /// Apply one write, shared by `put` and `bulk_docs`
    fn write(&self, location: &str, body: &Value) -> StoreResult<WriteResponse> {
        let mut docs = self.docs.borrow_mut();
        let doc = docs.entry(location.to_string()).or_default();

        let given_rev = body.get("_rev").and_then(Value::as_str);
        let current_rev = doc.current().filter(|r| !r.deleted).map(|r| r.rev.as_str());
        if given_rev != current_rev {
            return Err(StoreError::Conflict {
                location: location.to_string(),
                reason: "Document update conflict.".to_string(),
            });
        }

        let deleted = body
            .get("_deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if deleted && current_rev.is_none() {
            return Err(StoreError::NotFound {
                location: location.to_string(),
            });
        }

        let rev = new_rev(doc.revisions.len());
        doc.revisions.push(Revision {
            rev: rev.clone(),
            body: strip_meta(body),
            deleted,
        });

        Ok(WriteResponse {
            ok: true,
            id: id::unescape_id(doc_segment(location)),
            rev,
        })
    }

    fn revs_info(&self, path: &str) -> StoreResult<Value> {
        let docs = self.docs.borrow();
        let doc = docs
            .get(path)
            .filter(|d| d.is_live())
            .ok_or_else(|| not_found(path))?;

        let mut info: Vec<Value> = doc
            .conflicts
            .iter()
            .chain(doc.revisions.iter().rev())
            .map(|r| {
                let status = if r.deleted { "deleted" } else { "available" };
                json!({ "rev": r.rev, "status": status })
            })
            .collect();

        // Compacted history: only the newest two generations keep bodies
        for entry in info.iter_mut().skip(doc.conflicts.len() + 2) {
            if entry["status"] == "available" {
                entry["status"] = json!("missing");
            }
        }

        let current = doc.current().ok_or_else(|| not_found(path))?;
        let mut body = with_meta(&current.body, path, &current.rev);
        body["_revs_info"] = Value::Array(info);
        Ok(body)
    }
}

impl Transport for MemoryTransport {
    fn get(&self, location: &str) -> StoreResult<Value> {
        self.record(Call::Get(location.to_string()))?;

        let (path, query) = split_query(location);
        if query == Some("revs_info=true") {
            return self.revs_info(path);
        }

        self.document(path).ok_or_else(|| not_found(path))
    }

    fn put(&self, location: &str, body: &Value) -> StoreResult<WriteResponse> {
        self.record(Call::Put(location.to_string()))?;
        self.write(location, body)
    }

    fn delete(&self, location: &str) -> StoreResult<Value> {
        self.record(Call::Delete(location.to_string()))?;
        if let Some(kind) = self.delete_failure.get() {
            return Err(injected(kind, location));
        }

        let (path, query) = split_query(location);
        let rev = query
            .and_then(|q| q.strip_prefix("rev="))
            .ok_or_else(|| StoreError::Transport {
                location: location.to_string(),
                status: Some(400),
                message: "bad_request: Document rev is required".to_string(),
            })?;

        let mut docs = self.docs.borrow_mut();
        let doc = docs.get_mut(path).ok_or_else(|| not_found(path))?;
        if self.leaf_only_deletes.get() && !doc.is_leaf(rev) {
            return Err(conflict(location));
        }
        let revision = doc
            .find_mut(rev)
            .filter(|r| !r.deleted)
            .ok_or_else(|| conflict(location))?;
        revision.deleted = true;

        Ok(json!({ "ok": true, "id": id::unescape_id(doc_segment(path)), "rev": rev }))
    }

    fn bulk_docs(&self, database_uri: &str, docs: &[Value]) -> StoreResult<Vec<BulkItemResult>> {
        let ids: Vec<String> = docs
            .iter()
            .map(|d| d["_id"].as_str().unwrap_or_default().to_string())
            .collect();
        self.record(Call::BulkDocs {
            database: database_uri.to_string(),
            ids: ids.clone(),
        })?;

        let results = docs
            .iter()
            .zip(ids)
            .map(|(doc, raw_id)| {
                let location = format!("{}/{}", database_uri, id::escape_for_id(&raw_id));
                match self.write(&location, doc) {
                    Ok(written) => BulkItemResult {
                        id: raw_id,
                        rev: Some(written.rev),
                        ok: true,
                        error: None,
                        reason: None,
                    },
                    Err(e) => BulkItemResult {
                        id: raw_id,
                        rev: None,
                        ok: false,
                        error: Some(error_name(&e).to_string()),
                        reason: Some(e.to_string()),
                    },
                }
            })
            .collect();

        Ok(results)
    }

    fn uuids(&self, count: usize) -> StoreResult<Vec<String>> {
        self.record(Call::Uuids(count))?;
        Ok((0..count).map(|_| Uuid::new_v4().simple().to_string()).collect())
    }
}

fn new_rev(previous_generation: usize) -> String {
    format!("{}-{}", previous_generation + 1, Uuid::new_v4().simple())
}

fn split_query(location: &str) -> (&str, Option<&str>) {
    match location.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (location, None),
    }
}

/// The escaped id part of a document location
///
/// Design and local document ids contain one literal '/', so they span two
/// segments.
fn doc_segment(path: &str) -> &str {
    id::RESERVED_PREFIXES
        .iter()
        .find_map(|prefix| path.rfind(prefix).map(|start| &path[start..]))
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path))
}

fn strip_meta(body: &Value) -> Value {
    let mut fields = body.as_object().cloned().unwrap_or_default();
    fields.remove("_id");
    fields.remove("_rev");
    fields.remove("_deleted");
    Value::Object(fields)
}

fn with_meta(body: &Value, path: &str, rev: &str) -> Value {
    let mut fields = Map::new();
    fields.insert(
        "_id".to_string(),
        Value::String(id::unescape_id(doc_segment(path))),
    );
    fields.insert("_rev".to_string(), Value::String(rev.to_string()));
    if let Some(obj) = body.as_object() {
        fields.extend(obj.clone());
    }
    Value::Object(fields)
}

fn not_found(path: &str) -> StoreError {
    StoreError::NotFound {
        location: path.to_string(),
    }
}

fn conflict(location: &str) -> StoreError {
    StoreError::Conflict {
        location: location.to_string(),
        reason: "Document update conflict.".to_string(),
    }
}

fn injected(kind: ErrorKind, location: &str) -> StoreError {
    let location = location.to_string();
    match kind {
        ErrorKind::NotFound => StoreError::NotFound { location },
        ErrorKind::Conflict => conflict(&location),
        ErrorKind::InvalidId => StoreError::InvalidId {
            id: location,
            reason: "injected".to_string(),
        },
        ErrorKind::Transport => StoreError::Transport {
            location,
            status: Some(500),
            message: "injected".to_string(),
        },
    }
}

fn error_name(error: &StoreError) -> &'static str {
    match error {
        StoreError::Conflict { .. } => "conflict",
        StoreError::NotFound { .. } => "not_found",
        _ => "error",
    }
}

fn describe(call: &Call) -> String {
    match call {
        Call::Get(l) | Call::Put(l) | Call::Delete(l) => l.clone(),
        Call::BulkDocs { database, .. } => format!("{}/_bulk_docs", database),
        Call::Uuids(_) => "_uuids".to_string(),
    }
}
