use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// Configuration errors, raised before any I/O begins.
    Config(ConfigError),

    /// Query or cursor errors while reading documents.
    Retrieval(RetrievalError),

    /// Object storage protocol errors.
    Storage(StorageError),

    /// I/O errors (buffer encoding, local files).
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Object store client errors.
    ObjectStore(object_store::Error),

    /// JSON serialization errors.
    Json(serde_json::Error),

    /// The export was cancelled before completion.
    Cancelled,

    /// Export-level failure wrapping the originating cause.
    ExportFailed(Box<ExportError>),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing or blank required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// Retrieval-specific errors.
#[derive(Debug)]
pub enum RetrievalError {
    /// Not connected to MongoDB.
    NotConnected,

    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Opening the query failed.
    QueryFailed(String),

    /// Fetching from an open cursor failed.
    CursorFailed(String),
}

/// Object storage errors, one per step of the upload protocol.
#[derive(Debug)]
pub enum StorageError {
    /// Creating the multipart upload failed.
    InitiateFailed(Box<ExportError>),

    /// Uploading a single part failed.
    PartUploadFailed {
        part_number: u32,
        source: Box<ExportError>,
    },

    /// Completing the multipart upload failed.
    CompletionFailed(Box<ExportError>),

    /// Single-shot put failed.
    PutFailed(Box<ExportError>),

    /// The upload session was used out of order.
    InvalidState(String),

    /// The payload cannot be partitioned into an acceptable plan.
    InvalidPlan(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Retrieval(e) => write!(f, "Retrieval error: {e}"),
            ExportError::Storage(e) => write!(f, "Storage error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::MongoDb(e) => format_mongodb_error(f, e),
            ExportError::ObjectStore(e) => write!(f, "Object store error: {e}"),
            ExportError::Json(e) => write!(f, "JSON error: {e}"),
            ExportError::Cancelled => write!(f, "Export cancelled"),
            ExportError::ExportFailed(e) => write!(f, "Error during export operation: {e}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalError::NotConnected => write!(f, "Not connected to MongoDB"),
            RetrievalError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            RetrievalError::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
            RetrievalError::CursorFailed(msg) => write!(f, "Cursor error: {msg}"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InitiateFailed(e) => {
                write!(f, "Failed to initiate multipart upload: {e}")
            }
            StorageError::PartUploadFailed {
                part_number,
                source,
            } => write!(f, "Error uploading part {part_number}: {source}"),
            StorageError::CompletionFailed(e) => {
                write!(f, "Failed to complete multipart upload: {e}")
            }
            StorageError::PutFailed(e) => write!(f, "Error uploading object: {e}"),
            StorageError::InvalidState(msg) => write!(f, "Invalid upload state: {msg}"),
            StorageError::InvalidPlan(msg) => write!(f, "Invalid upload plan: {msg}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Storage(e) => Some(e),
            ExportError::Io(e) => Some(e),
            ExportError::MongoDb(e) => Some(e),
            ExportError::ObjectStore(e) => Some(e),
            ExportError::Json(e) => Some(e),
            ExportError::ExportFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for RetrievalError {}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::InitiateFailed(e)
            | StorageError::PartUploadFailed { source: e, .. }
            | StorageError::CompletionFailed(e)
            | StorageError::PutFailed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl ExportError {
    /// Wrap an error as an export-level failure.
    ///
    /// Errors that are already wrapped are returned unchanged so the
    /// caller always sees exactly one layer around the originating cause.
    pub fn export_failed(cause: ExportError) -> Self {
        match cause {
            ExportError::ExportFailed(_) => cause,
            other => ExportError::ExportFailed(Box::new(other)),
        }
    }

    /// The originating cause, unwrapping the export-level layer if present.
    pub fn root(&self) -> &ExportError {
        match self {
            ExportError::ExportFailed(inner) => inner.root(),
            other => other,
        }
    }
}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<mongodb::error::Error> for ExportError {
    fn from(err: mongodb::error::Error) -> Self {
        ExportError::MongoDb(err)
    }
}

impl From<object_store::Error> for ExportError {
    fn from(err: object_store::Error) -> Self {
        ExportError::ObjectStore(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Json(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<RetrievalError> for ExportError {
    fn from(err: RetrievalError) -> Self {
        ExportError::Retrieval(err)
    }
}

impl From<StorageError> for ExportError {
    fn from(err: StorageError) -> Self {
        ExportError::Storage(err)
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_export_failed_wraps_once() {
        let cause = ExportError::from(ConfigError::MissingField("collection".into()));
        let wrapped = ExportError::export_failed(cause);
        let rewrapped = ExportError::export_failed(wrapped);

        match &rewrapped {
            ExportError::ExportFailed(inner) => {
                assert!(matches!(**inner, ExportError::Config(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(rewrapped.root(), ExportError::Config(_)));
    }

    #[test]
    fn test_part_upload_error_chain() {
        let err = ExportError::export_failed(
            StorageError::PartUploadFailed {
                part_number: 3,
                source: Box::new(ExportError::Generic("connection reset".into())),
            }
            .into(),
        );

        let message = err.to_string();
        assert!(message.contains("Error during export operation"));
        assert!(message.contains("part 3"));
        assert!(message.contains("connection reset"));

        let storage = err.source().unwrap();
        assert_eq!(
            storage.to_string(),
            "Storage error: Error uploading part 3: connection reset"
        );
        let part = storage.source().unwrap();
        let cause = part.source().unwrap();
        assert_eq!(cause.to_string(), "connection reset");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "batch_size".into(),
            value: "0".into(),
        };
        assert_eq!(err.to_string(), "Invalid value '0' for field 'batch_size'");
    }
}
