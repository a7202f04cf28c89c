//! Revision history lookup
//!
//! Deleting a document has to remove every revision the server still holds,
//! otherwise a conflicting leaf would resurface as the winner. This module
//! lists those revisions.

use serde::Deserialize;
use tracing::debug;

use crate::transport::Transport;

/// Status of one entry in `_revs_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevStatus {
    Available,
    Disk,
    Missing,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl RevStatus {
    /// Whether the server still holds this revision's body
    pub fn is_retained(self) -> bool {
        matches!(self, RevStatus::Available | RevStatus::Disk)
    }
}

#[derive(Debug, Deserialize)]
struct RevInfo {
    rev: String,
    status: RevStatus,
}

#[derive(Debug, Deserialize)]
struct RevsInfoBody {
    #[serde(rename = "_revs_info", default)]
    revs_info: Vec<RevInfo>,
}

/// List every retained revision of the document at `location`
///
/// Returns revisions in server order. Any failure, including a missing
/// document, yields an empty list.
pub fn retained_revisions(transport: &dyn Transport, location: &str) -> Vec<String> {
    let query = format!("{}?revs_info=true", location);

    let body = match transport.get(&query) {
        Ok(body) => body,
        Err(e) => {
            debug!("No revision info for {}: {}", location, e);
            return Vec::new();
        }
    };

    match serde_json::from_value::<RevsInfoBody>(body) {
        Ok(info) => info
            .revs_info
            .into_iter()
            .filter(|r| r.status.is_retained())
            .map(|r| r.rev)
            .collect(),
        Err(e) => {
            debug!("Unreadable revision info for {}: {}", location, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;
    use serde_json::json;

    const DOC: &str = "mem://local/test/doc";

    #[test]
    fn test_missing_document_has_no_revisions() {
        let server = MemoryTransport::new();
        assert!(retained_revisions(&server, DOC).is_empty());
    }

    #[test]
    fn test_offline_has_no_revisions() {
        let server = MemoryTransport::new();
        server.put(DOC, &json!({})).unwrap();
        server.set_offline(true);

        assert!(retained_revisions(&server, DOC).is_empty());
    }

    #[test]
    fn test_only_retained_statuses() {
        let server = MemoryTransport::new();
        let r1 = server.put(DOC, &json!({})).unwrap().rev;
        let r2 = server.put(DOC, &json!({ "_rev": r1 })).unwrap().rev;
        let r3 = server.put(DOC, &json!({ "_rev": r2.clone() })).unwrap().rev;

        // Oldest generation is reported as "missing" once compacted
        assert_eq!(retained_revisions(&server, DOC), vec![r3, r2]);
    }

    #[test]
    fn test_conflict_leaves_listed_first() {
        let server = MemoryTransport::new();
        let r1 = server.put(DOC, &json!({})).unwrap().rev;
        let leaf = server.inject_conflict(DOC, json!({ "other": true })).unwrap();

        assert_eq!(retained_revisions(&server, DOC), vec![leaf, r1]);
    }

    #[test]
    fn test_status_parsing() {
        let body = json!({
            "_revs_info": [
                { "rev": "3-c", "status": "available" },
                { "rev": "2-b", "status": "disk" },
                { "rev": "1-a", "status": "missing" },
                { "rev": "0-z", "status": "something-new" }
            ]
        });

        let info: RevsInfoBody = serde_json::from_value(body).unwrap();
        let statuses: Vec<_> = info.revs_info.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                RevStatus::Available,
                RevStatus::Disk,
                RevStatus::Missing,
                RevStatus::Unknown
            ]
        );
    }
}
