//! settee CLI
//!
//! Command-line interface for settee - documents with revisions on a
//! CouchDB-style server.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use settee_core::{Config, Database, MemoryTransport};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "settee")]
#[command(about = "settee - documents with revisions on a CouchDB-style server")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run against an in-process server instead of the configured one
    #[arg(long, global = true)]
    memory: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a document
    Put {
        /// Document id
        id: String,
        /// Document fields as a JSON object
        #[arg(short, long)]
        data: Option<String>,
        /// Fail instead of reporting a document that was not saved
        #[arg(long)]
        strict: bool,
    },
    /// Show a document
    Get {
        /// Document id
        id: String,
    },
    /// Check whether a document exists
    Exists {
        /// Document id
        id: String,
    },
    /// List retained revisions of a document
    Revs {
        /// Document id
        id: String,
    },
    /// Delete a document and every retained revision
    #[command(alias = "rm")]
    Delete {
        /// Document id
        id: String,
        /// Fail instead of reporting a document that was not deleted
        #[arg(long)]
        strict: bool,
    },
    /// Load JSON lines from a file and write them in one bulk request
    Bulk {
        /// File with one JSON object per line
        file: PathBuf,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, database, timeout_secs, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands don't need a server
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let db = open_database(&config, cli.memory)?;

    let result = match cli.command {
        Commands::Put { id, data, strict } => {
            commands::document::put(&db, id, data, strict, &output)
        }
        Commands::Get { id } => commands::document::get(&db, id, &output),
        Commands::Exists { id } => commands::document::exists(&db, id, &output),
        Commands::Revs { id } => commands::document::revs(&db, id, &output),
        Commands::Delete { id, strict } => commands::document::delete(&db, id, strict, &output),
        Commands::Bulk { file } => commands::bulk::load(&db, &file, &output),
        Commands::Config { .. } => Ok(()),
    };

    // Anything still queued goes out before exit, unless the command failed
    if result.is_ok() && db.has_pending() {
        debug!("Flushing {} queued writes before exit", db.pending());
        db.flush().context("Failed to flush queued writes")?;
    }

    result
}

fn open_database(config: &Config, memory: bool) -> Result<Rc<Database>> {
    if memory {
        debug!("Using in-process server");
        let transport = Rc::new(MemoryTransport::new());
        return Ok(Rc::new(Database::with_config(transport, config)));
    }

    debug!("Using server {}", config.database_uri());
    Database::from_config(config)
}

/// Send logs to stderr so stdout stays clean for command output
///
/// `RUST_LOG` wins over the `--verbose` default when set.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "settee_core={},settee={}",
            default_level, default_level
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
