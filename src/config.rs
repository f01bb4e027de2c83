//! Layered configuration.
//!
//! Sources, highest priority last:
//! 1. Built-in defaults
//! 2. `sipms.toml` in the working directory, or the file named by `SIPMS_CONFIG`
//! 3. Environment variables (`SIPMS_*`, `__` between section and key,
//!    e.g. `SIPMS_SERVER__BIND=127.0.0.1:9000`)

use crate::error::Result;
use crate::storage::{DocumentStore, MAX_UPLOAD_BYTES};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "SIPMS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "sipms.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SipmsConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("sipms.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    pub media_root: PathBuf,
    pub max_upload_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            media_root: PathBuf::from("media"),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl StorageConfig {
    pub fn document_store(&self) -> DocumentStore {
        DocumentStore::new(&self.media_root).with_max_bytes(self.max_upload_bytes)
    }
}

impl SipmsConfig {
    pub fn load() -> Result<Self> {
        Ok(Self::figment().extract()?)
    }

    pub fn figment() -> Figment {
        let file = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("SIPMS_").split("__"))
    }
}
