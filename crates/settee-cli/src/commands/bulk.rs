//! Bulk command handler

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use settee_core::{Database, Document, Outcome, WriteMode};

use crate::output::Output;

/// Queue every JSON object in a file, then send them in one request
///
/// The file holds one JSON object per line; blank lines are skipped.
pub fn load(db: &Rc<Database>, path: &Path, output: &Output) -> Result<()> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;

    let mut queued = 0;
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {:?}", path))?;
        if line.trim().is_empty() {
            continue;
        }

        let fields = match serde_json::from_str::<Value>(&line)
            .with_context(|| format!("Line {} is not valid JSON", number + 1))?
        {
            Value::Object(fields) => fields,
            _ => anyhow::bail!("Line {} is not a JSON object", number + 1),
        };

        let mut doc = Document::from_fields(Rc::clone(db), fields)
            .with_context(|| format!("Line {} has an invalid id", number + 1))?;
        match doc.save(WriteMode::Deferred) {
            Outcome::NotDone(kind) => {
                anyhow::bail!("Line {} could not be queued ({:?})", number + 1, kind)
            }
            _ => queued += 1,
        }
    }

    debug!("Queued {} documents from {:?}", queued, path);
    let results = db.flush().context("Bulk write failed")?;
    output.print_bulk_results(&results);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use settee_core::MemoryTransport;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn memory_db() -> (Rc<MemoryTransport>, Rc<Database>) {
        let server = Rc::new(MemoryTransport::new());
        let db = Rc::new(Database::new(server.clone(), "mem://local", "cli"));
        (server, db)
    }

    #[test]
    fn test_load_queues_and_flushes() {
        let (server, db) = memory_db();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "first", "n": 1}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "second", "n": 2}}"#).unwrap();

        let output = Output::new(OutputFormat::Quiet);
        load(&db, file.path(), &output).unwrap();

        assert_eq!(db.pending(), 0);
        assert_eq!(server.live_count("mem://local/cli"), 2);
    }

    #[test]
    fn test_load_rejects_non_objects() {
        let (server, db) = memory_db();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "ok"}}"#).unwrap();
        writeln!(file, "[1, 2, 3]").unwrap();

        let output = Output::new(OutputFormat::Quiet);
        assert!(load(&db, file.path(), &output).is_err());
        assert_eq!(server.live_count("mem://local/cli"), 0);
    }
}
