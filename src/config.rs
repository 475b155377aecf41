//! Configuration for ingestion, tiling and extraction.
//!
//! The precision recorded here is a wire-format parameter: tiles written at
//! one precision must be read by a configuration that expects the same one.
//!
//! # Example
//!
//! ```rust
//! use seamless::Config;
//!
//! let json = r#"{
//!     "precision": 6,
//!     "result_storage": "disk",
//!     "max_concurrent_uploads": 8
//! }"#;
//! let config = Config::from_json(json).unwrap();
//! assert_eq!(config.max_concurrent_uploads, 8);
//! ```
use crate::codec::{DEFAULT_PRECISION, MAX_PRECISION};
use crate::storage::StorageKind;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Store and tile configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Decimal digits kept for coordinates in tile payloads (0-15, default: 6)
    #[serde(default = "Config::default_precision")]
    pub precision: u8,

    /// Extension of tile payloads, used in both paths and object keys
    #[serde(default = "Config::default_tile_extension")]
    pub tile_extension: String,

    /// Log a progress line every this many insertions (0 disables)
    #[serde(default = "Config::default_progress_interval")]
    pub progress_interval: usize,

    /// Backend for the feature store during ingestion
    #[serde(default)]
    pub feature_storage: StorageKind,

    /// Backend for extraction results
    #[serde(default)]
    pub result_storage: StorageKind,

    /// Tiles fetched and decoded concurrently during extraction
    #[serde(default = "Config::default_fetch_parallelism")]
    pub fetch_parallelism: usize,

    /// Upper bound on simultaneous background uploads
    #[serde(default = "Config::default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,

    /// Chunks buffered between the encoder and one upload task
    #[serde(default = "Config::default_upload_buffer_chunks")]
    pub upload_buffer_chunks: usize,

    /// How long to wait for outstanding uploads before giving up
    #[serde(default = "Config::default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

impl Config {
    const fn default_precision() -> u8 {
        DEFAULT_PRECISION
    }

    fn default_tile_extension() -> String {
        "smls.gz".to_string()
    }

    const fn default_progress_interval() -> usize {
        10_000
    }

    const fn default_fetch_parallelism() -> usize {
        8
    }

    const fn default_max_concurrent_uploads() -> usize {
        4
    }

    const fn default_upload_buffer_chunks() -> usize {
        16
    }

    const fn default_upload_timeout_secs() -> u64 {
        60 * 60
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        assert!(
            precision <= MAX_PRECISION,
            "Precision must be at most {MAX_PRECISION} decimal digits"
        );
        self.precision = precision;
        self
    }

    pub fn with_tile_extension(mut self, extension: impl Into<String>) -> Self {
        self.tile_extension = extension.into();
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_feature_storage(mut self, kind: StorageKind) -> Self {
        self.feature_storage = kind;
        self
    }

    pub fn with_result_storage(mut self, kind: StorageKind) -> Self {
        self.result_storage = kind;
        self
    }

    pub fn with_fetch_parallelism(mut self, parallelism: usize) -> Self {
        assert!(parallelism > 0, "Fetch parallelism must be greater than zero");
        self.fetch_parallelism = parallelism;
        self
    }

    pub fn with_max_concurrent_uploads(mut self, uploads: usize) -> Self {
        assert!(uploads > 0, "Concurrent uploads must be greater than zero");
        self.max_concurrent_uploads = uploads;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.precision > MAX_PRECISION {
            return Err(format!(
                "Precision must be at most {MAX_PRECISION} decimal digits"
            ));
        }

        let ext = self.tile_extension.as_str();
        if ext.is_empty() || ext.starts_with('.') || ext.contains('/') || ext.contains('\\') {
            return Err(format!("Invalid tile extension '{ext}'"));
        }

        if self.fetch_parallelism == 0 {
            return Err("Fetch parallelism must be greater than zero".to_string());
        }

        if self.max_concurrent_uploads == 0 {
            return Err("Concurrent uploads must be greater than zero".to_string());
        }

        if self.upload_buffer_chunks == 0 {
            return Err("Upload buffer must hold at least one chunk".to_string());
        }

        if self.upload_timeout_secs == 0 {
            return Err("Upload timeout must be positive".to_string());
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            precision: Self::default_precision(),
            tile_extension: Self::default_tile_extension(),
            progress_interval: Self::default_progress_interval(),
            feature_storage: StorageKind::default(),
            result_storage: StorageKind::default(),
            fetch_parallelism: Self::default_fetch_parallelism(),
            max_concurrent_uploads: Self::default_max_concurrent_uploads(),
            upload_buffer_chunks: Self::default_upload_buffer_chunks(),
            upload_timeout_secs: Self::default_upload_timeout_secs(),
        }
    }
}
