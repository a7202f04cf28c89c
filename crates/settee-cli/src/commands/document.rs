//! Document command handlers

use std::rc::Rc;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use settee_core::{Database, Document, ErrorKind, Outcome, WriteMode};

use crate::output::Output;

/// Save a document, updating the server copy if one exists
pub fn put(
    db: &Rc<Database>,
    id: String,
    data: Option<String>,
    strict: bool,
    output: &Output,
) -> Result<()> {
    let fields = parse_fields(data.as_deref())?;

    let mut doc = bind(db, &id)?;
    match doc.retrieve() {
        Ok(current) => doc = current,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("Failed to read current revision"),
    }
    doc.set_payload(fields);

    let outcome = if strict {
        doc.commit(WriteMode::Immediate)
            .with_context(|| format!("Failed to save '{}'", id))?
    } else {
        doc.save(WriteMode::Immediate)
    };

    output.print_outcome("save", &id, outcome);
    if outcome.is_done() {
        output.print_document(&doc);
    }
    Ok(())
}

/// Show the server copy of a document
pub fn get(db: &Rc<Database>, id: String, output: &Output) -> Result<()> {
    let doc = bind(db, &id)?
        .retrieve()
        .with_context(|| format!("Failed to read '{}'", id))?;
    output.print_document(&doc);
    Ok(())
}

/// Report whether a document exists
pub fn exists(db: &Rc<Database>, id: String, output: &Output) -> Result<()> {
    let found = bind(db, &id)?.exists();

    if output.is_json() {
        println!("{}", serde_json::json!({ "id": id, "exists": found }));
    } else {
        println!("{}", found);
    }
    Ok(())
}

/// List retained revisions of a document
pub fn revs(db: &Rc<Database>, id: String, output: &Output) -> Result<()> {
    let revisions = bind(db, &id)?.revisions();
    output.print_revisions(&revisions);
    Ok(())
}

/// Delete a document and all of its retained revisions
pub fn delete(db: &Rc<Database>, id: String, strict: bool, output: &Output) -> Result<()> {
    let mut doc = bind(db, &id)?;

    let outcome = if strict {
        doc.delete_strict(WriteMode::Immediate)
            .with_context(|| format!("Failed to delete '{}'", id))?
    } else {
        doc.delete(WriteMode::Immediate)
    };

    output.print_outcome("delete", &id, outcome);
    if strict && outcome == Outcome::NotDone(ErrorKind::NotFound) {
        output.message("Document was already gone.");
    }
    Ok(())
}

fn bind(db: &Rc<Database>, id: &str) -> Result<Document> {
    let mut doc = Document::new(Rc::clone(db));
    doc.set_id(id)
        .with_context(|| format!("Invalid document id '{}'", id))?;
    Ok(doc)
}

/// Parse `--data` into a field map; no data means an empty document
pub(crate) fn parse_fields(data: Option<&str>) -> Result<Map<String, Value>> {
    let Some(data) = data else {
        return Ok(Map::new());
    };

    match serde_json::from_str::<Value>(data).context("Document data is not valid JSON")? {
        Value::Object(fields) => Ok(fields),
        other => bail!("Document data must be a JSON object, got: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        assert!(parse_fields(None).unwrap().is_empty());

        let fields = parse_fields(Some(r#"{"title": "Hello", "n": 1}"#)).unwrap();
        assert_eq!(fields.len(), 2);

        assert!(parse_fields(Some("[1, 2]")).is_err());
        assert!(parse_fields(Some("{not json")).is_err());
    }
}
