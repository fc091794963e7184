//! Command-line interface for mongo-s3-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Environment variable fallbacks for every export setting
//! - Configuration loading and validation
//! - The `config` subcommand

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, LogLevel, sanitize_uri};
use crate::error::Result;
use crate::export::coordinator::ExportMode;

/// Environment variable naming the wrapper key; set but empty means no wrapper
const WRAPPER_KEY_ENV: &str = "EXPORT_DATAWRAPPER_KEY";

/// Export a MongoDB collection to a single JSON object in S3
#[derive(Parser, Debug)]
#[command(
    name = "mongo-s3-export",
    version,
    about = "Export a MongoDB collection to S3 as one JSON document",
    long_about = "Streams a MongoDB collection into a single JSON object in S3-compatible storage,
with optional gzip compression and automatic multipart uploads for large payloads."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", value_name = "URI", hide_env_values = true)]
    pub uri: Option<String>,

    /// Database to export from
    #[arg(long, env = "MONGODB_DATABASE", value_name = "NAME")]
    pub database: Option<String>,

    /// Collection to export
    #[arg(long, env = "EXPORT_COLLECTION_NAME", value_name = "NAME")]
    pub collection: Option<String>,

    /// Query filter as a JSON object
    #[arg(long, env = "EXPORT_FILTER_JSON", value_name = "JSON")]
    pub filter: Option<String>,

    /// Destination object key
    #[arg(long, env = "EXPORT_S3_KEY", value_name = "KEY")]
    pub key: Option<String>,

    /// Documents fetched per cursor batch
    #[arg(long, env = "EXPORT_BATCH_SIZE", value_name = "N")]
    pub batch_size: Option<u32>,

    /// Gzip the exported object
    #[arg(
        long = "compress",
        env = "EXPORT_COMPRESSION_ENABLED",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub compression: Option<bool>,

    /// Attach export metadata to the object
    #[arg(
        long,
        env = "EXPORT_INCLUDE_METADATA",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub include_metadata: Option<bool>,

    /// Wrapper key for the record array (empty writes bare records)
    #[arg(long, env = WRAPPER_KEY_ENV, value_name = "KEY")]
    pub wrapper_key: Option<String>,

    /// Write bare records without a wrapper object (overrides --wrapper-key)
    #[arg(long)]
    pub no_wrapper: bool,

    /// Upload strategy (adaptive, streaming)
    #[arg(long, env = "EXPORT_MODE", value_name = "MODE")]
    pub mode: Option<String>,

    /// Streaming part size in MiB
    #[arg(long, env = "EXPORT_PART_SIZE_MB", value_name = "MIB")]
    pub part_size_mb: Option<usize>,

    /// Parts uploaded concurrently
    #[arg(long, env = "EXPORT_UPLOAD_CONCURRENCY", value_name = "N")]
    pub upload_concurrency: Option<usize>,

    /// Target bucket
    #[arg(long, env = "AWS_S3_BUCKET_NAME", value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// Bucket region
    #[arg(long, env = "AWS_S3_BUCKET_REGION", value_name = "REGION")]
    pub region: Option<String>,

    /// Access key id
    #[arg(long, env = "AWS_CLIENTID", value_name = "ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Secret access key
    #[arg(long, env = "AWS_SECRET", value_name = "SECRET", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Custom endpoint for S3-compatible services
    #[arg(long, env = "AWS_S3_ENDPOINT", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Allow plain HTTP endpoints
    #[arg(long)]
    pub allow_http: bool,

    /// Show a progress spinner
    #[arg(long)]
    pub progress: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for mongo-s3-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Effective configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args)?;
        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply CLI arguments to configuration
    ///
    /// Overrides configuration values with CLI arguments (or their
    /// environment variables) where provided
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) -> Result<()> {
        Self::apply_connection_args(config, args);
        Self::apply_storage_args(config, args);
        Self::apply_export_args(config, args)?;
        Self::apply_logging_args(config, args);
        Ok(())
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(uri) = &args.uri {
            config.connection.uri = uri.clone();
        }
        if let Some(database) = &args.database {
            config.connection.database = Some(database.clone());
        }
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    fn apply_storage_args(config: &mut Config, args: &CliArgs) {
        let storage = &mut config.storage;
        if let Some(bucket) = &args.bucket {
            storage.bucket = bucket.clone();
        }
        if let Some(region) = &args.region {
            storage.region = Some(region.clone());
        }
        if let Some(id) = &args.access_key_id {
            storage.access_key_id = Some(id.clone());
        }
        if let Some(secret) = &args.secret_access_key {
            storage.secret_access_key = Some(secret.clone());
        }
        if let Some(endpoint) = &args.endpoint {
            storage.endpoint = Some(endpoint.clone());
        }
        if args.allow_http {
            storage.allow_http = true;
        }
    }

    fn apply_export_args(config: &mut Config, args: &CliArgs) -> Result<()> {
        let export = &mut config.export;
        if let Some(collection) = &args.collection {
            export.collection = collection.clone();
        }
        if let Some(filter) = &args.filter {
            export.filter = Some(filter.clone());
        }
        if let Some(key) = &args.key {
            export.key = Some(key.clone());
        }
        if let Some(batch_size) = args.batch_size {
            export.batch_size = batch_size;
        }
        if let Some(compression) = args.compression {
            export.compression = compression;
        }
        if let Some(include_metadata) = args.include_metadata {
            export.include_metadata = include_metadata;
        }
        if args.no_wrapper {
            export.datawrapper_key = String::new();
        } else if let Some(wrapper_key) = &args.wrapper_key {
            export.datawrapper_key = wrapper_key.clone();
        } else if std::env::var_os(WRAPPER_KEY_ENV).is_some_and(|v| v.is_empty()) {
            // clap treats an empty variable as unset
            export.datawrapper_key = String::new();
        }
        if let Some(mode) = &args.mode {
            export.mode = mode.parse::<ExportMode>()?;
        }
        if let Some(part_size_mb) = args.part_size_mb {
            export.part_size_mb = part_size_mb;
        }
        if let Some(concurrency) = args.upload_concurrency {
            export.upload_concurrency = concurrency;
        }
        if args.progress {
            export.show_progress = true;
        }
        Ok(())
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if a subcommand was handled, false to run the export
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Config { show, validate }) => {
                if *validate {
                    match self.config.validate() {
                        Ok(()) => println!("Configuration is valid"),
                        Err(e) => println!("Configuration validation failed: {}", e),
                    }
                }
                if *show || !*validate {
                    self.show_config()?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn show_config(&self) -> Result<()> {
        let path = self
            .args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path);
        println!("Configuration file: {}", path.display());
        println!();
        println!("{}", self.config.to_masked_toml()?);
        Ok(())
    }

    /// Print banner with version and connection info
    pub fn print_banner(&self) {
        if !self.args.quiet {
            println!("mongo-s3-export {}", env!("CARGO_PKG_VERSION"));
            println!("Connecting to: {}", sanitize_uri(&self.config.connection.uri));
        }
    }
}
