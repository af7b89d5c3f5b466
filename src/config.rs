//! Publisher configuration
//!
//! Configuration is a plain serde structure with defaults for everything
//! except the publisher ID. It can be built in code or loaded from a JSON
//! file in the config folder.

use crate::error::{ConfigError, Result, StorageError};
use crate::messaging::signer::SigningMethod;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The domain used when none is configured
pub const DEFAULT_DOMAIN: &str = "local";

/// Default discovery and poll interval in seconds
pub const DEFAULT_INTERVAL: u64 = 24 * 3600;

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(1)
}

/// Log verbosity of a publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Errors and warnings (default)
    #[default]
    Warn,
    /// Informational and above
    Info,
    /// Everything
    Debug,
}

impl LogLevel {
    /// The corresponding `tracing` level, for wiring into a subscriber
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

/// Complete publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Domain this publisher publishes in
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Publisher ID, unique within the domain. Required.
    pub publisher_id: String,

    /// How outbound publications are signed
    #[serde(default)]
    pub signing_method: SigningMethod,

    /// Discard inbound commands that are not validly signed
    #[serde(default = "default_true")]
    pub require_signed_inbound: bool,

    /// Seconds between discovery handler invocations
    #[serde(default = "default_interval")]
    pub discovery_interval: u64,

    /// Seconds between poll handler invocations
    #[serde(default = "default_interval")]
    pub poll_interval: u64,

    /// Folder holding the identity file and application configuration
    #[serde(default = "PublisherConfig::default_config_folder")]
    pub config_folder: PathBuf,

    /// Folder holding cached discovery state
    #[serde(default = "PublisherConfig::default_cache_folder")]
    pub cache_folder: PathBuf,

    /// Persist this publisher's nodes to the cache on change
    #[serde(default)]
    pub save_discovered_nodes: bool,

    /// Persist discovered domain publishers to the cache
    #[serde(default)]
    pub save_discovered_publishers: bool,

    /// Log verbosity, mapped onto `tracing` by the host
    #[serde(default)]
    pub log_level: LogLevel,

    /// Tick interval of the publication heartbeat
    ///
    /// One second per the bus conventions; shorten it in tests.
    #[serde(skip, default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,
}

impl PublisherConfig {
    /// Create a configuration with defaults for a publisher ID
    pub fn new(publisher_id: impl Into<String>) -> Self {
        Self {
            domain: default_domain(),
            publisher_id: publisher_id.into(),
            signing_method: SigningMethod::default(),
            require_signed_inbound: true,
            discovery_interval: DEFAULT_INTERVAL,
            poll_interval: DEFAULT_INTERVAL,
            config_folder: Self::default_config_folder(),
            cache_folder: Self::default_cache_folder(),
            save_discovered_nodes: false,
            save_discovered_publishers: false,
            log_level: LogLevel::default(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }

    /// Set the domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the signing method
    pub fn with_signing_method(mut self, method: SigningMethod) -> Self {
        self.signing_method = method;
        // unsigned publishers cannot expect their peers to sign either
        if method == SigningMethod::None {
            self.require_signed_inbound = false;
        }
        self
    }

    /// Set the config folder holding the identity file
    pub fn with_config_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.config_folder = folder.into();
        self
    }

    /// Set the cache folder holding discovery state
    pub fn with_cache_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.cache_folder = folder.into();
        self
    }

    /// Enable saving of discovered nodes and publishers to the cache
    pub fn with_cache_discovery(mut self, save: bool) -> Self {
        self.save_discovered_nodes = save;
        self.save_discovered_publishers = save;
        self
    }

    /// Set the log verbosity
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// The platform config folder for iotpub
    pub fn default_config_folder() -> PathBuf {
        directories::ProjectDirs::from("", "", "iotpub")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./iotpub-config"))
    }

    /// The platform cache folder for iotpub
    pub fn default_cache_folder() -> PathBuf {
        directories::ProjectDirs::from("", "", "iotpub")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./iotpub-cache"))
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when the publisher ID or domain is empty or
    /// contains address syntax.
    pub fn validate(&self) -> Result<()> {
        if self.publisher_id.is_empty() {
            return Err(ConfigError::MissingRequiredField {
                field: "publisher_id".to_string(),
            }
            .into());
        }
        for (field, value) in [("publisher_id", &self.publisher_id), ("domain", &self.domain)] {
            if value.is_empty() || value.contains('/') || value.contains('+') {
                return Err(ConfigError::MissingRequiredField {
                    field: field.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Save a configuration to a JSON file
pub fn save_config(path: &Path, config: &PublisherConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StorageError::from)?;
    }
    let json =
        serde_json::to_string_pretty(config).map_err(|e| StorageError::SerializationFailed {
            reason: format!("failed to serialize config: {}", e),
        })?;
    std::fs::write(path, json).map_err(StorageError::from)?;
    Ok(())
}

/// Load and validate a configuration from a JSON file
pub fn load_config(path: &Path) -> Result<PublisherConfig> {
    if !path.exists() {
        return Err(StorageError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    let json = std::fs::read_to_string(path).map_err(StorageError::from)?;
    let config: PublisherConfig =
        serde_json::from_str(&json).map_err(|e| StorageError::SerializationFailed {
            reason: format!("failed to parse config: {}", e),
        })?;
    config.validate()?;
    Ok(config)
}
