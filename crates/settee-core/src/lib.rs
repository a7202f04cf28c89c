//! settee core library
//!
//! This crate gives JSON documents an identity, a revision and save/delete
//! semantics on top of a CouchDB-style database, and lets writes be queued
//! and sent as a single bulk request.
//!
//! # Architecture
//!
//! - **Database**: shared handle holding the transport, the bulk cache and a
//!   pool of server-issued ids. Created once per logical database and handed
//!   to every document explicitly.
//! - **Document**: identity record plus payload map, with the lifecycle
//!   operations (`save`/`commit`, `delete`/`delete_strict`, `retrieve`).
//! - **Transport**: the seam to the server. `HttpTransport` speaks HTTP,
//!   `MemoryTransport` emulates a server in process.
//!
//! # Quick Start
//!
//! ```text
//! let db = Database::from_config(&Config::load()?)?;
//!
//! let mut doc = Document::new(db.clone());
//! doc.set_id("my document")?;
//! doc.insert("title", json!("Hello"));
//! doc.commit(WriteMode::Immediate)?;
//!
//! // Queue many writes, send them together
//! for mut other in batch {
//!     other.save(WriteMode::Deferred);
//! }
//! db.flush()?;
//! ```
//!
//! # Modules
//!
//! - `document`: identity and payload
//! - `persistence`: save, commit, delete, retrieve
//! - `database`: shared handle and bulk flush
//! - `bulk`: queued entries
//! - `revisions`: retained revision lookup
//! - `id`: id escaping and validation
//! - `transport`, `memory`: server access
//! - `config`: application configuration

pub mod bulk;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod id;
pub mod memory;
pub mod persistence;
pub mod revisions;
pub mod transport;

pub use bulk::{BulkCache, BulkEntry};
pub use config::Config;
pub use database::Database;
pub use document::{Document, Identity, Lifecycle};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use id::{escape_for_id, is_design_id, is_local_id, unescape_id, validate_id};
pub use memory::MemoryTransport;
pub use persistence::{Outcome, WriteMode};
pub use revisions::retained_revisions;
pub use transport::{BulkItemResult, HttpTransport, Transport, WriteResponse};
