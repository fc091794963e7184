//! MongoDB to S3 exporter library
//!
//! Streams a MongoDB collection into a single JSON object in S3-compatible
//! object storage. The payload is optionally gzip-compressed and uploaded
//! with a single put or a multipart upload depending on its size.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `error`: Error types and handling
//! - `export`: Serialization, buffering, upload planning and orchestration
//! - `storage`: Object storage abstraction and the `object_store` backend
//!
//! # Example
//!
//! ```no_run
//! use mongo_s3_export::{config::Config, run_export};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.export.collection = "users".to_string();
//!     config.storage.bucket = "exports".to_string();
//!
//!     let result = run_export(&config, CancellationToken::new()).await?;
//!     println!("Exported {} records", result.records_exported);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{ExportError, Result};
pub use export::{ExportCoordinator, ExportRequest, ExportResult};
pub use storage::{ObjectStorage, ObjectStoreBackend};

use export::ProgressTracker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}

/// Run one export described by `config`
///
/// Validates the configuration, connects to MongoDB and S3, and streams the
/// collection into the configured object. Cancelling `cancel_token` stops
/// the export and aborts any multipart upload in flight.
///
/// # Returns
/// * `Result<ExportResult>` - Export statistics or the wrapped failure
pub async fn run_export(config: &Config, cancel_token: CancellationToken) -> Result<ExportResult> {
    config.validate()?;
    let request = config.to_request(Local::now())?;
    let storage: Arc<dyn ObjectStorage> = Arc::new(ObjectStoreBackend::s3(&config.storage)?);

    let mut manager = ConnectionManager::new(config.connection.clone());
    let opened = match manager.connect().await {
        Ok(()) => manager.open_query(&request).await,
        Err(e) => Err(e),
    };

    let result = match opened {
        Ok(query) => {
            ExportCoordinator::new(
                request,
                Box::new(query),
                storage,
                ProgressTracker::new(config.export.show_progress),
            )
            .with_options(config.upload_options())
            .with_cancellation(cancel_token)
            .execute()
            .await
        }
        Err(e) => Err(ExportError::export_failed(e)),
    };

    manager.disconnect().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_io() {
        let err = run_export(&Config::default(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_is_wrapped() {
        let mut config = Config::default();
        config.export.collection = "users".to_string();
        config.storage.bucket = "exports".to_string();
        config.connection.uri = "mongodb://localhost:not-a-port".to_string();
        config.connection.retry_attempts = 1;

        let err = run_export(&config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::ExportFailed(_)));
        assert!(matches!(
            err.root(),
            ExportError::Retrieval(RetrievalError::ConnectionFailed(_))
        ));
    }
}
