//! Document identifiers
//!
//! Callers may name documents with arbitrary strings, but the server
//! addresses documents by URL path segment. This module turns a caller id
//! into the URL-safe form used to build locations.
//!
//! Design documents (`_design/<name>`) and local documents (`_local/<name>`)
//! keep their prefix literally, so the server still recognizes them; only the
//! name part is escaped.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{StoreError, StoreResult};

/// Prefix reserved by the server for design documents
pub const DESIGN_PREFIX: &str = "_design/";

/// Prefix reserved by the server for non-replicated local documents
pub const LOCAL_PREFIX: &str = "_local/";

pub(crate) const RESERVED_PREFIXES: [&str; 2] = [DESIGN_PREFIX, LOCAL_PREFIX];

/// Everything except RFC 3986 unreserved characters gets escaped
const ID_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Check if an id names a design document
pub fn is_design_id(raw: &str) -> bool {
    raw.starts_with(DESIGN_PREFIX)
}

/// Check if an id names a local document
pub fn is_local_id(raw: &str) -> bool {
    raw.starts_with(LOCAL_PREFIX)
}

/// Escape a caller id for use as a location path segment
///
/// `_design/foo bar` becomes `_design/foo%20bar`; `a/b c` becomes `a%2Fb%20c`.
pub fn escape_for_id(raw: &str) -> String {
    match split_prefix(raw) {
        Some((prefix, name)) => format!("{}{}", prefix, escape(name)),
        None => escape(raw),
    }
}

/// Split a design or local id into its prefix and name
pub(crate) fn split_prefix(raw: &str) -> Option<(&'static str, &str)> {
    RESERVED_PREFIXES
        .iter()
        .find_map(|&prefix| raw.strip_prefix(prefix).map(|name| (prefix, name)))
}

/// Reverse [`escape_for_id`]
///
/// Used to recover the id the server stores, which is the unescaped form.
pub fn unescape_id(escaped: &str) -> String {
    percent_decode_str(escaped).decode_utf8_lossy().into_owned()
}

/// Reject ids the server would refuse
pub fn validate_id(raw: &str) -> StoreResult<()> {
    if raw.is_empty() {
        return Err(invalid(raw, "id must not be empty"));
    }

    if let Some((_, name)) = split_prefix(raw) {
        if name.is_empty() {
            return Err(invalid(raw, "document needs a name after the prefix"));
        }
        return Ok(());
    }

    if raw.starts_with('_') {
        return Err(invalid(
            raw,
            "ids starting with '_' are reserved by the server",
        ));
    }

    Ok(())
}

fn escape(s: &str) -> String {
    utf8_percent_encode(s, ID_ESCAPE).to_string()
}

fn invalid(raw: &str, reason: &str) -> StoreError {
    StoreError::InvalidId {
        id: raw.to_string(),
        reason: reason.to_string(),
    }
}
