use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::relay::DEFAULT_MAX_TOKENS;

/// Model requested when the user has not picked one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Environment override for the relay credential, so the key does not have
/// to live in the settings file.
const API_KEY_ENV: &str = "VAULTCHAT_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot determine config directory")]
    NoConfigDir,
}

/// User settings, persisted as JSON in the platform config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Relay endpoint, e.g. `http://127.0.0.1:8787/api/messages`.
    pub relay_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    /// Root directory of the local object store. `None` means the platform
    /// data directory.
    pub storage_root: Option<PathBuf>,
    /// Key prefix under which notes and chat records live.
    pub bucket_prefix: String,
    /// Obsidian vault name for deep links; empty disables them.
    pub vault_name: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            relay_url: String::new(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            storage_root: None,
            bucket_prefix: String::new(),
            vault_name: String::new(),
        }
    }
}

impl ChatConfig {
    /// XDG-compliant settings path.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("vaultchat").join("settings.json"))
    }

    /// Load settings, falling back to defaults when no file exists yet.
    /// The API key may be overridden by `VAULTCHAT_API_KEY`.
    pub async fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?).await
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api_key = key.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Save settings atomically (write to temp, then rename), cleaning
    /// stray whitespace out of the fields first.
    pub async fn save(&mut self) -> Result<(), ConfigError> {
        let path = Self::default_path()?;
        self.save_to(&path).await
    }

    pub async fn save_to(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.clean();

        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = PathBuf::from(format!("{}.tmp", path.display()));
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, path).await?;

        Ok(())
    }

    /// Normalize fields the way pasted values tend to need: credentials and
    /// endpoints lose all stray whitespace (including non-breaking spaces),
    /// names are merely trimmed.
    fn clean(&mut self) {
        self.relay_url = collapse_whitespace(&self.relay_url);
        self.api_key = collapse_whitespace(&self.api_key);
        self.model = collapse_whitespace(&self.model);
        self.bucket_prefix = self.bucket_prefix.trim().to_string();
        self.vault_name = self.vault_name.trim().to_string();
    }

    /// Whether normal operation can proceed. A `false` here is a
    /// configuration error: prompt for setup, never crash.
    pub fn is_configured(&self) -> bool {
        !self.relay_url.is_empty() && !self.api_key.is_empty() && !self.model.is_empty()
    }

    /// Effective object-store root.
    pub fn storage_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage_root {
            Some(root) => Ok(root.clone()),
            None => {
                let data_dir = dirs::data_dir().ok_or(ConfigError::NoConfigDir)?;
                Ok(data_dir.join("vaultchat"))
            }
        }
    }
}

/// Collapse whitespace runs (including `\u{00A0}`) to single spaces and trim.
fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChatConfig::load_from(&dir.path().join("settings.json"))
            .await
            .unwrap();

        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!config.is_configured());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut config = ChatConfig {
            relay_url: "http://127.0.0.1:8787/api/messages".to_string(),
            api_key: "sk-test".to_string(),
            bucket_prefix: "vault/".to_string(),
            vault_name: "My Vault".to_string(),
            ..ChatConfig::default()
        };
        config.save_to(&path).await.unwrap();

        let loaded = ChatConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded.relay_url, config.relay_url);
        assert_eq!(loaded.bucket_prefix, "vault/");
        assert!(loaded.is_configured());
    }

    #[tokio::test]
    async fn test_save_cleans_pasted_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut config = ChatConfig {
            api_key: "  sk-\u{00A0}test  ".to_string(),
            vault_name: "  My Vault  ".to_string(),
            ..ChatConfig::default()
        };
        config.save_to(&path).await.unwrap();

        assert_eq!(config.api_key, "sk- test");
        assert_eq!(config.vault_name, "My Vault");
    }

    #[test]
    fn test_unknown_fields_do_not_break_parsing() {
        let config: ChatConfig =
            serde_json::from_str(r#"{"relay_url":"x","someFutureField":1}"#).unwrap();
        assert_eq!(config.relay_url, "x");
    }
}
