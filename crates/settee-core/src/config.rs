//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/settee/config.toml)
//! 3. Environment variables (SETTEE_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "SETTEE";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the document server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Database name on that server
    #[serde(default = "default_database")]
    pub database: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How many uuids to fetch from the server at once
    #[serde(default = "default_uuid_batch_size")]
    pub uuid_batch_size: usize,

    /// Flush the bulk cache automatically once it holds this many entries
    #[serde(default)]
    pub bulk_cache_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
            uuid_batch_size: default_uuid_batch_size(),
            bulk_cache_limit: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SETTEE_SERVER_URL, SETTEE_DATABASE, ...)
    /// 2. Config file (~/.config/settee/config.toml or SETTEE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            self.server_url = val;
        }

        if let Ok(val) = std::env::var(format!("{}_DATABASE", ENV_PREFIX)) {
            self.database = val;
        }

        if let Ok(val) = std::env::var(format!("{}_TIMEOUT_SECS", ENV_PREFIX)) {
            self.timeout_secs = val
                .parse()
                .with_context(|| format!("Invalid {}_TIMEOUT_SECS: {}", ENV_PREFIX, val))?;
        }

        // Empty string clears the limit
        if let Ok(val) = std::env::var(format!("{}_BULK_CACHE_LIMIT", ENV_PREFIX)) {
            self.bulk_cache_limit = if val.is_empty() {
                None
            } else {
                Some(val.parse().with_context(|| {
                    format!("Invalid {}_BULK_CACHE_LIMIT: {}", ENV_PREFIX, val)
                })?)
            };
        }

        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SETTEE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("settee")
            .join("config.toml")
    }

    /// Full URI of the configured database
    pub fn database_uri(&self) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), self.database)
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:5984".to_string()
}

fn default_database() -> String {
    "settee".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_uuid_batch_size() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "SETTEE_SERVER_URL",
        "SETTEE_DATABASE",
        "SETTEE_TIMEOUT_SECS",
        "SETTEE_BULK_CACHE_LIMIT",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://127.0.0.1:5984");
        assert_eq!(config.database, "settee");
        assert_eq!(config.uuid_batch_size, 10);
        assert!(config.bulk_cache_limit.is_none());
    }

    #[test]
    fn test_database_uri() {
        let mut config = Config::default();
        assert_eq!(config.database_uri(), "http://127.0.0.1:5984/settee");

        config.server_url = "http://couch.example.com/".to_string();
        config.database = "notes".to_string();
        assert_eq!(config.database_uri(), "http://couch.example.com/notes");
    }

    #[test]
    fn test_env_override_server() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("SETTEE_SERVER_URL", "http://10.0.0.5:5984");
        env::set_var("SETTEE_DATABASE", "inventory");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.server_url, "http://10.0.0.5:5984");
        assert_eq!(config.database, "inventory");
    }

    #[test]
    fn test_env_override_bulk_cache_limit() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("SETTEE_BULK_CACHE_LIMIT", "250");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.bulk_cache_limit, Some(250));

        // Empty string clears it
        env::set_var("SETTEE_BULK_CACHE_LIMIT", "");
        config.apply_env_overrides().unwrap();
        assert!(config.bulk_cache_limit.is_none());

        env::set_var("SETTEE_BULK_CACHE_LIMIT", "lots");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_env_override_timeout() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SETTEE_TIMEOUT_SECS", "5");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_url = "http://couch:5984"
            database = "links"
            bulk_cache_limit = 100
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url, "http://couch:5984");
        assert_eq!(config.database, "links");
        assert_eq!(config.bulk_cache_limit, Some(100));
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        // Should return defaults when file doesn't exist
        assert_eq!(config.database, "settee");
        assert!(config.bulk_cache_limit.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            server_url: "http://couch:5984".to_string(),
            database: "archive".to_string(),
            timeout_secs: 12,
            uuid_batch_size: 50,
            bulk_cache_limit: Some(20),
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.server_url, config.server_url);
        assert_eq!(loaded.database, config.database);
        assert_eq!(loaded.timeout_secs, 12);
        assert_eq!(loaded.uuid_batch_size, 50);
        assert_eq!(loaded.bulk_cache_limit, Some(20));
    }
}
