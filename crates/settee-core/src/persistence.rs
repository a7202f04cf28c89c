//! Saving and deleting documents
//!
//! Every verb comes in two forms:
//!
//! - a masking form (`save`, `delete`) that never fails and reports what
//!   happened as an [`Outcome`], logging anything it swallowed;
//! - a strict form (`commit`, `delete_strict`) that returns the error.
//!
//! Writes are either sent immediately or queued on the database's bulk
//! cache, chosen by [`WriteMode`]. An immediate write always flushes the
//! queue first, so deferred writes are never overtaken.

use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::bulk::BulkEntry;
use crate::database::Database;
use crate::document::Document;
use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::id;
use crate::revisions::retained_revisions;
use crate::transport::WriteResponse;

/// Whether a write goes out now or waits for the next flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Immediate,
    Deferred,
}

/// What a save or delete achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The server applied the operation
    Done,
    /// The operation was queued on the bulk cache
    Deferred,
    /// The operation failed
    NotDone(ErrorKind),
}

impl Outcome {
    pub fn is_done(self) -> bool {
        self == Outcome::Done
    }

    pub fn is_deferred(self) -> bool {
        self == Outcome::Deferred
    }
}

impl Document {
    /// Build a document and save it immediately
    ///
    /// Returns `None` if the fields are invalid or the save failed.
    pub fn create(database: Rc<Database>, fields: Map<String, Value>) -> Option<Document> {
        let mut doc = match Document::from_fields(database, fields) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Create failed: {}", e);
                return None;
            }
        };
        doc.save(WriteMode::Immediate).is_done().then_some(doc)
    }

    /// Build a document and save it immediately, returning any error
    pub fn create_strict(
        database: Rc<Database>,
        fields: Map<String, Value>,
    ) -> StoreResult<Document> {
        let mut doc = Document::from_fields(database, fields)?;
        doc.commit(WriteMode::Immediate)?;
        Ok(doc)
    }

    /// Save the document, swallowing errors
    pub fn save(&mut self, mode: WriteMode) -> Outcome {
        masked("Save", self.commit(mode))
    }

    /// Save the document, returning any error
    ///
    /// On an immediate save the document takes its id and revision from the
    /// server's reply. A deferred save leaves the document untouched until the
    /// database is flushed. A failed save leaves the document unchanged.
    pub fn commit(&mut self, mode: WriteMode) -> StoreResult<Outcome> {
        self.encode_attachments();
        let internal_id = self.ensure_id()?;
        let body = self.to_wire();
        let database = Rc::clone(&self.database);

        if mode == WriteMode::Deferred {
            database.add_to_bulk_cache(BulkEntry::Save(body));
            return Ok(Outcome::Deferred);
        }

        database.flush_pending()?;

        let location = database.location_for(&internal_id);
        let response = database.transport().put(&location, &body)?;
        if !response.ok {
            return Err(StoreError::InvalidResponse {
                location,
                details: "write was not acknowledged".to_string(),
            });
        }

        debug!("Saved {} at {}", location, response.rev);
        self.apply_write(&response);
        Ok(Outcome::Done)
    }

    /// Delete the document, swallowing errors
    pub fn delete(&mut self, mode: WriteMode) -> Outcome {
        masked("Delete", self.delete_strict(mode))
    }

    /// Delete the document and every revision the server retains
    ///
    /// A document that is already gone is reported as
    /// `NotDone(ErrorKind::NotFound)` rather than an error. Conflicts and
    /// transport failures are returned.
    pub fn delete_strict(&mut self, mode: WriteMode) -> StoreResult<Outcome> {
        let Some(internal_id) = self.stored_id() else {
            debug!("Delete of a document without id, nothing stored");
            return Ok(Outcome::Done);
        };
        let database = Rc::clone(&self.database);

        if mode == WriteMode::Deferred {
            database.add_to_bulk_cache(BulkEntry::Delete {
                id: id::unescape_id(&internal_id),
                rev: self.identity.rev.clone(),
            });
            return Ok(Outcome::Deferred);
        }

        match purge(&database, &internal_id) {
            Ok(count) => {
                info!("Deleted {} ({} revisions)", internal_id, count);
                self.identity.rev = None;
                self.deleted = true;
                Ok(Outcome::Done)
            }
            Err(e) if e.is_not_found() => {
                debug!("Delete of missing document {}", internal_id);
                Ok(Outcome::NotDone(ErrorKind::NotFound))
            }
            Err(e) => Err(e),
        }
    }

    /// Read the current server copy into a new document
    ///
    /// The receiver is not modified.
    pub fn retrieve(&self) -> StoreResult<Document> {
        let location = self.location().ok_or_else(|| StoreError::NotFound {
            location: self.database.uri().to_string(),
        })?;

        let body = self.database.transport().get(&location)?;
        Document::from_wire(Rc::clone(&self.database), body)
    }

    /// Check whether the server has a live copy of this document
    pub fn exists(&self) -> bool {
        match self.location() {
            Some(location) => self.database.transport().get(&location).is_ok(),
            None => false,
        }
    }

    /// List every revision the server still holds for this document
    pub fn revisions(&self) -> Vec<String> {
        match self.location() {
            Some(location) => retained_revisions(self.database.transport(), &location),
            None => Vec::new(),
        }
    }

    /// Adopt the id and revision reported by the server
    fn apply_write(&mut self, response: &WriteResponse) {
        self.identity.internal_id = Some(id::escape_for_id(&response.id));
        self.identity.rev = Some(response.rev.clone());
        self.deleted = false;
    }

    /// Attachment bodies are sent as-is
    fn encode_attachments(&mut self) {
        if self.payload.contains_key("_attachments") {
            debug!("Attachments passed through unchanged");
        }
    }
}

/// Delete every retained revision at the document's location
///
/// Stops at the first failed delete. Returns how many revisions were removed.
fn purge(database: &Database, internal_id: &str) -> StoreResult<usize> {
    database.flush_pending()?;

    let location = database.location_for(internal_id);
    let revisions = retained_revisions(database.transport(), &location);
    for rev in &revisions {
        database
            .transport()
            .delete(&format!("{}?rev={}", location, rev))?;
    }
    Ok(revisions.len())
}

fn masked(verb: &str, result: StoreResult<Outcome>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("{} failed: {}", verb, e);
            Outcome::NotDone(e.kind())
        }
    }
}
