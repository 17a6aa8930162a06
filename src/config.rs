use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::atomic::write_atomic;
use crate::directory::ChatdDirectory;
use crate::error::{Result, StoreError};

/// Default assistant system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Default API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// Application configuration.
///
/// Every field carries a serde default, so a config file with missing keys
/// still parses; absent keys resolve to defaults at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            api_base_url: default_api_base_url(),
            api_key: String::new(),
        }
    }
}

/// Owns the persisted configuration record.
///
/// Absence of the config file is a normal, self-healing case: the first
/// `load` writes the defaults and returns them. A file that exists but does
/// not parse is surfaced as `CorruptConfig`; falling back to defaults is the
/// caller's decision, never made silently here.
pub struct ConfigStore {
    dir: ChatdDirectory,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Create a store over the given storage directory.
    pub fn new(dir: ChatdDirectory) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    /// Load the persisted config, creating it with defaults if absent.
    pub fn load(&self) -> Result<Config> {
        if !self.dir.config_file.exists() {
            info!(
                "No config file at {}, creating defaults",
                self.dir.config_file.display()
            );
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&self.dir.config_file)?;

        let config: Config =
            serde_json::from_str(&content).map_err(|source| StoreError::CorruptConfig {
                path: self.dir.config_file.clone(),
                source,
            })?;

        debug!("Loaded config from {}", self.dir.config_file.display());
        Ok(config)
    }

    /// Overwrite the persisted config atomically.
    pub fn save(&self, config: &Config) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if !self.dir.exists() {
            self.dir.create()?;
        }

        let content = serde_json::to_string_pretty(config).map_err(io::Error::from)?;
        write_atomic(&self.dir.config_file, &content)?;

        info!("Saved config to {}", self.dir.config_file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> ConfigStore {
        ConfigStore::new(ChatdDirectory::new(temp_dir.path().join(".chatd")))
    }

    #[test]
    fn test_first_load_creates_defaults_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let config = store.load().unwrap();
        assert_eq!(config, Config::default());
        assert!(temp_dir.path().join(".chatd").join("config.json").exists());

        // Second load reads the file it just wrote.
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let config = Config {
            system_prompt: "You only tell jokes.".to_string(),
            api_base_url: "http://localhost:8080/v1".to_string(),
            api_key: "sk-test".to_string(),
        };

        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_missing_keys_resolve_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save(&Config::default()).unwrap();

        fs::write(
            temp_dir.path().join(".chatd").join("config.json"),
            r#"{"api_key": "sk-partial"}"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.api_key, "sk-partial");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_corrupt_config_is_reported_not_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save(&Config::default()).unwrap();

        let config_path = temp_dir.path().join(".chatd").join("config.json");
        fs::write(&config_path, "{not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::CorruptConfig { .. }));

        // The corrupt file is left in place for the user to inspect.
        assert_eq!(fs::read_to_string(&config_path).unwrap(), "{not json");
    }
}
