//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use settee_core::Config;

use crate::output::{Output, OutputFormat};

const KEYS: &str = "server_url, database, timeout_secs, uuid_batch_size, bulk_cache_limit";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "database": config.database,
                    "timeout_secs": config.timeout_secs,
                    "uuid_batch_size": config.uuid_batch_size,
                    "bulk_cache_limit": config.bulk_cache_limit
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.database_uri());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  server_url:       {}", config.server_url);
            println!("  database:         {}", config.database);
            println!("  timeout_secs:     {}", config.timeout_secs);
            println!("  uuid_batch_size:  {}", config.uuid_batch_size);
            println!(
                "  bulk_cache_limit: {}",
                config
                    .bulk_cache_limit
                    .map(|limit| limit.to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "server_url" => {
            if value.is_empty() {
                bail!("server_url cannot be empty");
            }
            config.server_url = value.trim_end_matches('/').to_string();
        }
        "database" => {
            if value.is_empty() {
                bail!("database cannot be empty");
            }
            config.database = value.to_string();
        }
        "timeout_secs" => {
            config.timeout_secs = value
                .parse()
                .context("Invalid value for timeout_secs. Use a whole number of seconds.")?;
        }
        "uuid_batch_size" => {
            let size: usize = value
                .parse()
                .context("Invalid value for uuid_batch_size. Use a positive number.")?;
            if size == 0 {
                bail!("uuid_batch_size must be at least 1");
            }
            config.uuid_batch_size = size;
        }
        "bulk_cache_limit" => {
            config.bulk_cache_limit = if value.is_empty() || value == "none" {
                None
            } else {
                Some(
                    value
                        .parse()
                        .context("Invalid value for bulk_cache_limit. Use a number or 'none'.")?,
                )
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                KEYS
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();

        apply(&mut config, "server_url", "http://db.example:5984/").unwrap();
        apply(&mut config, "database", "notes").unwrap();
        apply(&mut config, "timeout_secs", "5").unwrap();
        apply(&mut config, "uuid_batch_size", "50").unwrap();
        apply(&mut config, "bulk_cache_limit", "200").unwrap();

        assert_eq!(config.server_url, "http://db.example:5984");
        assert_eq!(config.database, "notes");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.uuid_batch_size, 50);
        assert_eq!(config.bulk_cache_limit, Some(200));

        apply(&mut config, "bulk_cache_limit", "none").unwrap();
        assert_eq!(config.bulk_cache_limit, None);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();

        assert!(apply(&mut config, "timeout_secs", "soon").is_err());
        assert!(apply(&mut config, "uuid_batch_size", "0").is_err());
        assert!(apply(&mut config, "database", "").is_err());
        assert!(apply(&mut config, "colour", "blue").is_err());
    }

    #[test]
    fn test_set_writes_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set("database".to_string(), "archive".to_string(), Some(&path), &output).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("archive"));
    }
}
