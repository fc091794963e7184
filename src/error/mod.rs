//! Error handling for export operations.
//!
//! This module provides:
//! - A single crate-wide error type with one variant per failure class
//!   (configuration, retrieval, storage protocol, cancellation)
//! - Structured extraction of MongoDB driver errors for logging
//!
//! # Example
//!
//! ```rust,no_run
//! use mongo_s3_export::error::{ConfigError, Result};
//!
//! fn require(name: &str) -> Result<()> {
//!     if name.trim().is_empty() {
//!         return Err(ConfigError::MissingField("collection".to_string()).into());
//!     }
//!     Ok(())
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{ConfigError, ExportError, Result, RetrievalError, StorageError};
pub use mongo::ErrorInfo;
