//! Documents
//!
//! A [`Document`] is a JSON object with an identity attached. The identity
//! (caller id, escaped id, revision) lives in its own record next to the
//! payload, so user fields can never collide with the control keys the
//! server uses.
//!
//! Saving, deleting and reading back are implemented in
//! [`crate::persistence`].

use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::bulk::BulkEntry;
use crate::database::Database;
use crate::error::{StoreError, StoreResult};
use crate::id;

/// Keys used on the wire
mod keys {
    pub const ID: &str = "id";
    pub const REV: &str = "rev";
    pub const DOC_ID: &str = "_id";
    pub const DOC_REV: &str = "_rev";
    pub const DELETED: &str = "_deleted";

    /// Keys that are never stored in a payload
    pub const CONTROL: [&str; 5] = [ID, REV, DOC_ID, DOC_REV, DELETED];
}

/// Where a document is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Never saved, or moved to a new identity
    New,
    /// Has a revision on the server
    Persisted,
    /// Removed from the server by an immediate delete
    Deleted,
}

/// Identity and revision of a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Id as given by the caller
    pub(crate) id: Option<String>,
    /// URL-safe id used to build the location
    pub(crate) internal_id: Option<String>,
    /// Revision of the last successful write
    pub(crate) rev: Option<String>,
}

/// A document bound to a database
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) identity: Identity,
    pub(crate) payload: Map<String, Value>,
    pub(crate) deleted: bool,
    pub(crate) database: Rc<Database>,
}

impl Document {
    /// Create an empty, unsaved document
    pub fn new(database: Rc<Database>) -> Self {
        Self {
            identity: Identity::default(),
            payload: Map::new(),
            deleted: false,
            database,
        }
    }

    /// Create an unsaved document from a field map
    ///
    /// An `id` field becomes the caller id. Server-controlled keys (`_id`,
    /// `_rev`, `rev`, `_deleted`) are dropped.
    pub fn from_fields(
        database: Rc<Database>,
        mut fields: Map<String, Value>,
    ) -> StoreResult<Self> {
        let raw_id = fields.remove(keys::ID);
        for key in keys::CONTROL {
            fields.remove(key);
        }

        let mut doc = Self::new(database);
        doc.payload = fields;

        match raw_id {
            Some(Value::String(raw)) => doc.set_id(&raw)?,
            Some(other) => warn!("Ignoring non-string id {}", other),
            None => {}
        }
        Ok(doc)
    }

    /// Rebuild a document from a body read off the server
    pub fn from_wire(database: Rc<Database>, body: Value) -> StoreResult<Self> {
        let mut fields = match body {
            Value::Object(fields) => fields,
            other => {
                return Err(StoreError::InvalidResponse {
                    location: database.uri().to_string(),
                    details: format!("expected a JSON object, got {}", other),
                })
            }
        };

        let identity = Identity {
            id: take_string(&mut fields, keys::ID),
            internal_id: take_string(&mut fields, keys::DOC_ID)
                .map(|raw| id::escape_for_id(&raw)),
            rev: take_string(&mut fields, keys::DOC_REV),
        };
        for key in keys::CONTROL {
            fields.remove(key);
        }

        Ok(Self {
            identity,
            payload: fields,
            deleted: false,
            database,
        })
    }

    // ==================== Identity ====================

    /// Id as given by the caller
    pub fn id(&self) -> Option<&str> {
        self.identity.id.as_deref()
    }

    /// URL-safe id used in the document's location
    pub fn internal_id(&self) -> Option<&str> {
        self.identity.internal_id.as_deref()
    }

    /// Revision of the last successful write
    pub fn rev(&self) -> Option<&str> {
        self.identity.rev.as_deref()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// True until the document has a revision
    pub fn is_new(&self) -> bool {
        self.identity.rev.is_none()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.deleted {
            Lifecycle::Deleted
        } else if self.identity.rev.is_some() {
            Lifecycle::Persisted
        } else {
            Lifecycle::New
        }
    }

    /// Give the document a new caller id
    ///
    /// If the document was already saved under a different escaped id, a
    /// deletion of the old copy is queued on the database and the revision
    /// is cleared, so the next save creates the document under its new id.
    pub fn set_id(&mut self, raw: &str) -> StoreResult<()> {
        id::validate_id(raw)?;
        let escaped = id::escape_for_id(raw);

        let moved =
            !self.is_new() && self.identity.internal_id.as_deref() != Some(escaped.as_str());
        let old_rev = if moved { self.identity.rev.take() } else { None };

        let old_id = self.identity.internal_id.replace(escaped);
        self.identity.id = Some(raw.to_string());

        if let Some(old_id) = old_id.filter(|_| moved) {
            debug!("Document {} renamed to {}, queueing delete", old_id, raw);
            self.database.add_to_bulk_cache(BulkEntry::Delete {
                id: id::unescape_id(&old_id),
                rev: old_rev,
            });
        }
        Ok(())
    }

    /// Make sure the document has an internal id, fetching one if needed
    ///
    /// A caller id is escaped; without one the database hands out a uuid.
    pub fn ensure_id(&mut self) -> StoreResult<String> {
        let internal_id = match &self.identity.id {
            Some(raw) => id::escape_for_id(raw),
            None => match &self.identity.internal_id {
                Some(existing) => existing.clone(),
                None => self.database.next_uuid()?,
            },
        };
        self.identity.internal_id = Some(internal_id.clone());
        Ok(internal_id)
    }

    /// Internal id, falling back to the escaped caller id
    pub(crate) fn stored_id(&self) -> Option<String> {
        self.identity
            .internal_id
            .clone()
            .or_else(|| self.identity.id.as_deref().map(id::escape_for_id))
    }

    /// Location of the document on the server
    ///
    /// `None` until the document has any id.
    pub fn location(&self) -> Option<String> {
        self.stored_id()
            .map(|internal_id| self.database.location_for(&internal_id))
    }

    pub fn database(&self) -> &Rc<Database> {
        &self.database
    }

    // ==================== Payload ====================

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Set a payload field
    ///
    /// Control keys are refused and leave the document unchanged.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if keys::CONTROL.contains(&key.as_str()) {
            warn!("Refusing to set control key '{}' as a field", key);
            return None;
        }
        self.payload.insert(key, value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.payload.remove(key)
    }

    /// Replace every payload field, keeping identity and revision
    pub fn set_payload(&mut self, mut fields: Map<String, Value>) {
        for key in keys::CONTROL {
            fields.remove(key);
        }
        self.payload = fields;
    }

    /// Body as sent to the server
    ///
    /// `_id` carries the unescaped id; the escaped form only appears in
    /// locations.
    pub fn to_wire(&self) -> Value {
        let mut body = Map::new();
        if let Some(internal_id) = &self.identity.internal_id {
            body.insert(
                keys::DOC_ID.to_string(),
                Value::String(id::unescape_id(internal_id)),
            );
        }
        if let Some(rev) = &self.identity.rev {
            body.insert(keys::DOC_REV.to_string(), Value::String(rev.clone()));
        }
        if let Some(raw) = &self.identity.id {
            body.insert(keys::ID.to_string(), Value::String(raw.clone()));
        }
        body.extend(self.payload.clone());
        Value::Object(body)
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use serde_json::json;

    fn setup() -> (Rc<MemoryTransport>, Rc<Database>) {
        let server = Rc::new(MemoryTransport::new());
        let db = Rc::new(Database::new(server.clone(), "mem://local", "test"));
        (server, db)
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_document() {
        let (_server, db) = setup();
        let doc = Document::new(db);

        assert!(doc.is_new());
        assert_eq!(doc.lifecycle(), Lifecycle::New);
        assert!(doc.id().is_none());
        assert!(doc.location().is_none());
    }

    #[test]
    fn test_from_fields_strips_control_keys() {
        let (_server, db) = setup();
        let doc = Document::from_fields(
            db,
            fields(json!({
                "id": "my doc",
                "_id": "ignored",
                "_rev": "1-ignored",
                "rev": "ignored",
                "title": "Hello"
            })),
        )
        .unwrap();

        assert_eq!(doc.id(), Some("my doc"));
        assert_eq!(doc.internal_id(), Some("my%20doc"));
        assert!(doc.is_new());
        assert_eq!(doc.payload().len(), 1);
        assert_eq!(doc.get("title"), Some(&json!("Hello")));
    }

    #[test]
    fn test_from_fields_rejects_reserved_id() {
        let (_server, db) = setup();
        let err = Document::from_fields(db, fields(json!({ "id": "_users" }))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidId);
    }

    #[test]
    fn test_insert_refuses_control_keys() {
        let (_server, db) = setup();
        let mut doc = Document::new(db);

        assert!(doc.insert("_rev", json!("9-x")).is_none());
        assert!(doc.payload().is_empty());

        doc.insert("name", json!("value"));
        assert_eq!(doc.insert("name", json!("other")), Some(json!("value")));
        assert_eq!(doc.remove("name"), Some(json!("other")));
    }

    #[test]
    fn test_set_payload_keeps_identity() {
        let (_server, db) = setup();
        let mut doc = Document::new(db);
        doc.set_id("kept").unwrap();
        doc.insert("old", json!(1));

        doc.set_payload(fields(json!({ "new": 2, "_id": "other", "id": "other" })));

        assert_eq!(doc.id(), Some("kept"));
        assert!(doc.get("old").is_none());
        assert_eq!(doc.get("new"), Some(&json!(2)));
        assert_eq!(doc.payload().len(), 1);
    }

    #[test]
    fn test_ensure_id_uses_caller_id() {
        let (server, db) = setup();
        let mut doc = Document::new(db);
        doc.set_id("_design/foo bar").unwrap();

        assert_eq!(doc.ensure_id().unwrap(), "_design/foo%20bar");
        assert!(server.calls().is_empty());
    }

    #[test]
    fn test_ensure_id_fetches_uuid_once() {
        let (server, db) = setup();
        let mut doc = Document::new(db);

        let first = doc.ensure_id().unwrap();
        let second = doc.ensure_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(doc.internal_id(), Some(first.as_str()));
        assert_eq!(server.calls().len(), 1);
    }

    #[test]
    fn test_set_id_on_new_document_queues_nothing() {
        let (_server, db) = setup();
        let mut doc = Document::new(db.clone());
        doc.set_id("first").unwrap();
        doc.set_id("second").unwrap();

        assert_eq!(doc.internal_id(), Some("second"));
        assert_eq!(db.pending(), 0);
    }

    #[test]
    fn test_set_id_on_saved_document_queues_delete() {
        let (_server, db) = setup();
        let mut doc = Document::new(db.clone());
        doc.set_id("abc").unwrap();
        doc.identity.rev = Some("1-aaa".to_string());

        doc.set_id("xyz").unwrap();

        assert!(doc.is_new());
        assert_eq!(doc.internal_id(), Some("xyz"));
        assert_eq!(
            db.pending_entries(),
            vec![BulkEntry::Delete {
                id: "abc".to_string(),
                rev: Some("1-aaa".to_string()),
            }]
        );
    }

    #[test]
    fn test_set_same_id_keeps_revision() {
        let (_server, db) = setup();
        let mut doc = Document::new(db.clone());
        doc.set_id("abc").unwrap();
        doc.identity.rev = Some("1-aaa".to_string());

        doc.set_id("abc").unwrap();

        assert_eq!(doc.rev(), Some("1-aaa"));
        assert_eq!(db.pending(), 0);
    }

    #[test]
    fn test_wire_round_trip() {
        let (_server, db) = setup();
        let mut doc = Document::new(db.clone());
        doc.set_id("a b").unwrap();
        doc.identity.rev = Some("2-bbb".to_string());
        doc.insert("n", json!(3));

        let wire = doc.to_wire();
        assert_eq!(wire["_id"], "a b");
        assert_eq!(wire["_rev"], "2-bbb");
        assert_eq!(wire["id"], "a b");
        assert_eq!(wire["n"], 3);

        let back = Document::from_wire(db, wire).unwrap();
        assert_eq!(back.identity(), doc.identity());
        assert_eq!(back.payload(), doc.payload());
    }

    #[test]
    fn test_from_wire_rejects_non_object() {
        let (_server, db) = setup();
        assert!(Document::from_wire(db, json!([1, 2])).is_err());
    }
}
