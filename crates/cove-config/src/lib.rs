//! Process configuration stored in ~/.cove/config.json or taken from the
//! environment.
//!
//! The encryption key is mandatory: loading fails hard when it is absent
//! so a misconfigured process never starts with secrets it cannot
//! decrypt (and never silently falls back to some other key).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use cove_crypto::{CipherKey, KeyError};

pub const ENCRYPTION_KEY_VAR: &str = "COVE_ENCRYPTION_KEY";
pub const TOKEN_SECRET_VAR: &str = "COVE_TOKEN_SECRET";
pub const DATABASE_URL_VAR: &str = "COVE_DATABASE_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("encryption key is not configured (set COVE_ENCRYPTION_KEY)")]
    MissingEncryptionKey,
    #[error("token signing secret is not configured (set COVE_TOKEN_SECRET)")]
    MissingTokenSecret,
    #[error("invalid encryption key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Service configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Hex-encoded 32-byte value encryption key.
    pub encryption_key: String,
    /// HS256 secret for credential tokens.
    pub token_secret: String,
    /// Storage backend URL (e.g. `sqlite://...`). `None` means the
    /// backend's default location.
    #[serde(default)]
    pub database_url: Option<String>,
}

impl Config {
    /// Load from the environment. Missing key or secret is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let encryption_key =
            std::env::var(ENCRYPTION_KEY_VAR).map_err(|_| ConfigError::MissingEncryptionKey)?;
        let token_secret =
            std::env::var(TOKEN_SECRET_VAR).map_err(|_| ConfigError::MissingTokenSecret)?;
        let config = Self {
            encryption_key,
            token_secret,
            database_url: std::env::var(DATABASE_URL_VAR).ok(),
        };
        // validate the key eagerly so startup fails here, not on first use
        config.cipher_key()?;
        Ok(config)
    }

    /// Load config from the default path (~/.cove/config.json).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a custom path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        if config.encryption_key.is_empty() {
            return Err(ConfigError::MissingEncryptionKey);
        }
        if config.token_secret.is_empty() {
            return Err(ConfigError::MissingTokenSecret);
        }
        config.cipher_key()?;
        Ok(config)
    }

    /// Save config to a custom path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self)?)?;
        Ok(())
    }

    /// Default config path (~/.cove/config.json).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cove")
            .join("config.json")
    }

    /// Parse the configured encryption key.
    pub fn cipher_key(&self) -> Result<CipherKey, ConfigError> {
        Ok(CipherKey::from_hex(&self.encryption_key)?)
    }
}
