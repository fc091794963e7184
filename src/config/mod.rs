//! Configuration management for mongo-s3-export
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values
//!
//! Environment variables are read through the CLI layer, see [`crate::cli`].

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::export::coordinator::{DEFAULT_PART_SIZE, ExportMode, UploadOptions};
use crate::export::request::{ExportRequest, WrapperKey, default_object_key, parse_filter};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// MongoDB connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Export job configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database to export from (falls back to the URI's default database)
    #[serde(default)]
    pub database: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Number of retry attempts on connection failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Maximum pool size
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Target bucket
    #[serde(default)]
    pub bucket: String,

    /// Bucket region
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Static access key id
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret access key
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Allow plain HTTP endpoints
    #[serde(default)]
    pub allow_http: bool,
}

/// Export job configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// Collection to export
    #[serde(default)]
    pub collection: String,

    /// Query filter as a JSON object (empty matches everything)
    #[serde(default)]
    pub filter: Option<String>,

    /// Object key (generated from collection and time when absent)
    #[serde(default)]
    pub key: Option<String>,

    /// Documents fetched per cursor batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Gzip the payload
    #[serde(default)]
    pub compression: bool,

    /// Attach export metadata to the object
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,

    /// Wrapper key for the record array (empty writes bare records)
    #[serde(default = "default_datawrapper_key")]
    pub datawrapper_key: String,

    /// Upload strategy
    #[serde(default)]
    pub mode: ExportMode,

    /// Streaming part size in MiB
    #[serde(default = "default_part_size_mb")]
    pub part_size_mb: usize,

    /// Parts uploaded concurrently for planned multipart uploads
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Show a progress spinner
    #[serde(default)]
    pub show_progress: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_batch_size() -> u32 {
    1000
}

fn default_include_metadata() -> bool {
    true
}

fn default_datawrapper_key() -> String {
    "dataList".to_string()
}

fn default_part_size_mb() -> usize {
    DEFAULT_PART_SIZE / (1024 * 1024)
}

fn default_upload_concurrency() -> usize {
    1
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: None,
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            collection: String::new(),
            filter: None,
            key: None,
            batch_size: default_batch_size(),
            compression: false,
            include_metadata: default_include_metadata(),
            datawrapper_key: default_datawrapper_key(),
            mode: ExportMode::default(),
            part_size_mb: default_part_size_mb(),
            upload_concurrency: default_upload_concurrency(),
            show_progress: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// An explicit path must exist. Without one, the default path is used
    /// when present and defaults are returned otherwise.
    ///
    /// # Arguments
    /// * `path` - Optional path to a TOML configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - `~/.mongo-s3-export/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongo-s3-export")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.export.collection.trim().is_empty() {
            return Err(ConfigError::MissingField("export.collection".to_string()).into());
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::MissingField("storage.bucket".to_string()).into());
        }
        if self.export.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "export.batch_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.export.upload_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "export.upload_concurrency".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if !self.connection.uri.starts_with("mongodb://")
            && !self.connection.uri.starts_with("mongodb+srv://")
        {
            return Err(ConfigError::InvalidValue {
                field: "connection.uri".to_string(),
                value: sanitize_uri(&self.connection.uri),
            }
            .into());
        }
        Ok(())
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }

    /// Build the export request described by this configuration
    ///
    /// # Arguments
    /// * `now` - Time used for the generated object key
    pub fn to_request(&self, now: DateTime<Local>) -> Result<ExportRequest> {
        let export = &self.export;
        let key = match export.key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => default_object_key(&export.collection, export.compression, now),
        };

        ExportRequest::new(export.collection.trim(), key)?
            .with_filter(parse_filter(export.filter.as_deref())?)
            .with_wrapper_key(WrapperKey::new(export.datawrapper_key.as_str()))
            .with_batch_size(export.batch_size)
            .map(|request| {
                request
                    .with_compression(export.compression)
                    .with_metadata(export.include_metadata)
            })
    }

    /// Upload tuning derived from the export section
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            mode: self.export.mode,
            part_size: self.export.part_size_mb.saturating_mul(1024 * 1024),
            concurrency: self.export.upload_concurrency,
        }
    }

    /// Render the configuration as TOML with credentials masked
    pub fn to_masked_toml(&self) -> Result<String> {
        let mut masked = self.clone();
        masked.connection.uri = sanitize_uri(&masked.connection.uri);
        if masked.storage.secret_access_key.is_some() {
            masked.storage.secret_access_key = Some("***".to_string());
        }
        toml::to_string_pretty(&masked)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Hide credentials in a connection URI
///
/// Everything between `://` and the last `@` is replaced by `***`.
pub fn sanitize_uri(uri: &str) -> String {
    if let (Some(proto_end), Some(host_start)) = (uri.find("://"), uri.rfind('@')) {
        if host_start > proto_end {
            return format!("{}***{}", &uri[..proto_end + 3], &uri[host_start..]);
        }
    }
    uri.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn valid() -> Config {
        let mut config = Config::default();
        config.export.collection = "users".to_string();
        config.storage.bucket = "exports".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.export.batch_size, 1000);
        assert_eq!(config.export.datawrapper_key, "dataList");
        assert!(config.export.include_metadata);
        assert!(!config.export.compression);
        assert_eq!(config.export.mode, ExportMode::Adaptive);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.connection_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            bucket = "exports"
            region = "eu-west-1"

            [export]
            collection = "orders"
            compression = true
            mode = "streaming"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.bucket, "exports");
        assert_eq!(config.storage.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.export.collection, "orders");
        assert!(config.export.compression);
        assert_eq!(config.export.mode, ExportMode::Streaming);
        assert_eq!(config.export.batch_size, 1000);
        assert_eq!(config.connection.retry_attempts, 3);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[export\ncollection = ").unwrap_err();
        assert!(err.to_string().contains("Invalid"));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::load_from_file(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(Config::default().validate().is_err());

        let mut config = valid();
        config.storage.bucket = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.export.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.connection.uri = "postgres://localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_request_defaults() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let request = valid().to_request(now).unwrap();

        assert_eq!(request.collection(), "users");
        assert_eq!(request.key(), "exports/users/users_2024-03-05_14-07-09.json");
        assert_eq!(request.wrapper_key().map(|k| k.as_str()), Some("dataList"));
        assert_eq!(request.batch_size(), 1000);
        assert!(request.include_metadata());
        assert!(request.filter().is_empty());
    }

    #[test]
    fn test_to_request_overrides() {
        let mut config = valid();
        config.export.key = Some("custom/key.json.gz".to_string());
        config.export.compression = true;
        config.export.datawrapper_key = String::new();
        config.export.filter = Some(r#"{"status":"active"}"#.to_string());

        let request = config.to_request(Local::now()).unwrap();
        assert_eq!(request.key(), "custom/key.json.gz");
        assert!(request.compression());
        assert!(request.wrapper_key().is_none());
        assert_eq!(request.filter().get_str("status").unwrap(), "active");
    }

    #[test]
    fn test_to_request_rejects_bad_filter() {
        let mut config = valid();
        config.export.filter = Some("[1,2]".to_string());
        assert!(config.to_request(Local::now()).is_err());
    }

    #[test]
    fn test_upload_options() {
        let mut config = valid();
        config.export.part_size_mb = 16;
        config.export.upload_concurrency = 4;
        let options = config.upload_options();
        assert_eq!(options.part_size, 16 * 1024 * 1024);
        assert_eq!(options.concurrency, 4);
    }

    #[test]
    fn test_sanitize_uri() {
        assert_eq!(
            sanitize_uri("mongodb://user:p@ss@host:27017/db"),
            "mongodb://***@host:27017/db"
        );
        assert_eq!(sanitize_uri("mongodb://host:27017"), "mongodb://host:27017");
    }

    #[test]
    fn test_masked_toml_hides_secrets() {
        let mut config = valid();
        config.connection.uri = "mongodb://admin:hunter2@db:27017".to_string();
        config.storage.secret_access_key = Some("topsecret".to_string());

        let rendered = config.to_masked_toml().unwrap();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("bucket = \"exports\""));
    }
}
