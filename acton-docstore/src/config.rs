//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `ACTON_DOCSTORE_`, `__` between nested keys)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-docstore/config.toml
//! 4. System directory: /etc/acton-docstore/config.toml
//! 5. Default values
//!
//! ```toml
//! [service]
//! name = "billing"
//! log_level = "debug"
//!
//! [store]
//! url = "ws://localhost:8000"
//! namespace = "billing"
//! database = "main"
//!
//! [sequence]
//! collection = "Sequence"
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::repository::{RepositoryError, RepositoryResult};

const APP_NAME: &str = "acton-docstore";
const ENV_PREFIX: &str = "ACTON_DOCSTORE_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Document store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Identifier sequences
    #[serde(default)]
    pub sequence: SequenceConfig,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, attached to log output
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

/// Document store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URL; the scheme selects the backend
    ///
    /// - `memory://` - built-in in-process store
    /// - `ws://`, `wss://`, `http://`, `https://`, `mem://` - SurrealDB
    #[serde(default = "default_store_url")]
    pub url: String,

    /// SurrealDB namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// SurrealDB database
    #[serde(default = "default_database")]
    pub database: String,

    /// Root username (optional)
    #[serde(default)]
    pub username: Option<String>,

    /// Root password (optional)
    #[serde(default)]
    pub password: Option<String>,

    /// Connection retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between connection retries, doubled on every retry
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Documents fetched per round-trip while streaming
    #[serde(default = "default_stream_batch_size")]
    pub stream_batch_size: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            namespace: default_namespace(),
            database: default_database(),
            username: None,
            password: None,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            stream_batch_size: default_stream_batch_size(),
        }
    }
}

/// Backend selected by a store URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process [`MemoryStore`](crate::store::MemoryStore)
    Memory,
    /// SurrealDB through the `any` engine
    SurrealDb,
}

impl StoreConfig {
    /// Backend selected by the URL scheme
    pub fn backend(&self) -> RepositoryResult<StoreBackend> {
        let scheme = self
            .url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        match scheme.as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "ws" | "wss" | "http" | "https" | "mem" => Ok(StoreBackend::SurrealDb),
            _ => Err(RepositoryError::connection_failed(format!(
                "Unsupported store URL '{}': expected memory://, mem://, ws(s):// or http(s)://",
                self.url
            ))),
        }
    }

    /// Base delay between connection retries
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Identifier sequence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Collection holding one counter document per entity collection
    #[serde(default = "default_sequence_collection")]
    pub collection: String,

    /// Compare-and-swap attempts before a sequence call fails with a conflict
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            collection: default_sequence_collection(),
            max_cas_attempts: default_max_cas_attempts(),
        }
    }
}

fn default_service_name() -> String {
    APP_NAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_url() -> String {
    "memory://".to_string()
}

fn default_namespace() -> String {
    "acton".to_string()
}

fn default_database() -> String {
    "docstore".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_stream_batch_size() -> u64 {
    100
}

fn default_sequence_collection() -> String {
    crate::sequence::SequenceGenerator::DEFAULT_COLLECTION.to_string()
}

fn default_max_cas_attempts() -> u32 {
    crate::sequence::SequenceGenerator::DEFAULT_MAX_CAS_ATTEMPTS
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Config files found in several locations are merged, the higher
    /// priority file winning per key. Environment variables override all
    /// file-based configs.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later merges override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        let config = figment.merge(Self::env()).extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses directory discovery. A missing file leaves the defaults
    /// in place. Environment variables still override the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Self::env())
            .extract()?;
        Ok(config)
    }

    /// Parse configuration from TOML text over the defaults, without environment overrides
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()?;
        Ok(config)
    }

    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    /// Candidate config files, highest priority first
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(APP_NAME);
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(Path::new("/etc").join(APP_NAME).join("config.toml"));
        paths
    }
}
