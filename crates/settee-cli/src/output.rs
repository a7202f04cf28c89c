//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use settee_core::{BulkItemResult, Document, Outcome};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in JSON mode
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a document with its identity
    pub fn print_document(&self, doc: &Document) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:        {}", doc.id().unwrap_or("(none)"));
                println!("Stored as: {}", doc.internal_id().unwrap_or("(none)"));
                println!("Revision:  {}", doc.rev().unwrap_or("(none)"));
                if !doc.payload().is_empty() {
                    println!();
                    for (key, value) in doc.payload() {
                        println!("{}: {}", key, truncate(&value.to_string(), 60));
                    }
                }
            }
            OutputFormat::Json => {
                println!("{}", pretty(&doc.to_wire()));
            }
            OutputFormat::Quiet => {
                println!("{}", doc.rev().unwrap_or_default());
            }
        }
    }

    /// Print the outcome of a save or delete
    pub fn print_outcome(&self, verb: &str, target: &str, outcome: Outcome) {
        let status = match outcome {
            Outcome::Done => "done".to_string(),
            Outcome::Deferred => "deferred".to_string(),
            Outcome::NotDone(kind) => format!("not done ({:?})", kind),
        };

        match self.format {
            OutputFormat::Human => println!("{} {}: {}", verb, target, status),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({ "operation": verb, "id": target, "status": status })
                );
            }
            OutputFormat::Quiet => {
                if !outcome.is_done() {
                    println!("{}", status);
                }
            }
        }
    }

    /// Print a list of revisions
    pub fn print_revisions(&self, revisions: &[String]) {
        match self.format {
            OutputFormat::Human => {
                if revisions.is_empty() {
                    println!("No retained revisions.");
                    return;
                }
                for rev in revisions {
                    println!("{}", rev);
                }
                println!("\n{} revision(s)", revisions.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!(revisions));
            }
            OutputFormat::Quiet => {
                for rev in revisions {
                    println!("{}", rev);
                }
            }
        }
    }

    /// Print per-document results of a bulk flush
    pub fn print_bulk_results(&self, results: &[BulkItemResult]) {
        match self.format {
            OutputFormat::Human => {
                if results.is_empty() {
                    println!("Nothing to flush.");
                    return;
                }
                for result in results {
                    match (&result.rev, &result.error) {
                        (_, Some(error)) => println!(
                            "✗ {} | {} {}",
                            truncate(&result.id, 40),
                            error,
                            result.reason.as_deref().unwrap_or_default()
                        ),
                        (Some(rev), None) => println!("✓ {} | {}", truncate(&result.id, 40), rev),
                        (None, None) => println!("✓ {}", truncate(&result.id, 40)),
                    }
                }
                let failed = results.iter().filter(|r| !r.is_ok()).count();
                println!("\n{} written, {} rejected", results.len() - failed, failed);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!(results));
            }
            OutputFormat::Quiet => {
                for result in results.iter().filter(|r| !r.is_ok()) {
                    println!("{}", result.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééééé", 5), "éé...");
    }
}
