//! Object storage backends
//!
//! The export core talks to storage only through [`ObjectStorage`], which
//! mirrors the S3 multipart protocol (create, upload part, complete, abort)
//! plus a single-shot put. [`ObjectStoreBackend`] implements it on top of
//! the `object_store` crate.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::export::metadata::ExportMetadata;

pub mod s3;

#[cfg(test)]
pub(crate) mod testing;

pub use s3::ObjectStoreBackend;

/// Content type of every exported object
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content encoding of compressed objects
pub const GZIP_CONTENT_ENCODING: &str = "gzip";

/// Opaque identifier of one in-progress multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadId(String);

impl UploadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A part accepted by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: u32,
    /// Backend-issued integrity token (S3 ETag)
    pub token: String,
}

/// Headers and metadata written with an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub metadata: Option<ExportMetadata>,
}

impl ObjectAttributes {
    /// JSON content type, `gzip` encoding when compressed
    pub fn json(compressed: bool, metadata: Option<ExportMetadata>) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            content_encoding: compressed.then(|| GZIP_CONTENT_ENCODING.to_string()),
            metadata,
        }
    }
}

/// Storage operations consumed by the export core
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Start a multipart upload and return its identifier
    ///
    /// The attributes are applied to the object once it is completed.
    async fn initiate(&self, key: &str, attributes: &ObjectAttributes) -> Result<UploadId>;

    /// Upload one part and return its integrity token
    ///
    /// Parts of one upload are started in part-number order, starting at 1.
    async fn upload_part(
        &self,
        upload_id: &UploadId,
        key: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String>;

    /// Make the object visible from parts ordered by part number
    async fn complete(&self, upload_id: &UploadId, key: &str, parts: &[CompletedPart])
        -> Result<()>;

    /// Cancel the upload and release stored parts
    async fn abort(&self, upload_id: &UploadId, key: &str) -> Result<()>;

    /// Write the whole object with one request
    async fn put(&self, key: &str, attributes: &ObjectAttributes, data: Bytes) -> Result<()>;
}
