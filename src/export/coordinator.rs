//! Export coordinator for orchestrating export operations
//!
//! Brings together the streaming query, the serializer, the buffer and the
//! upload paths. Two modes are supported:
//!
//! - [`ExportMode::Adaptive`]: the whole payload is buffered, then uploaded
//!   with a single put or a planned multipart upload depending on its size.
//! - [`ExportMode::Streaming`]: parts are flushed while records are still
//!   being read. The multipart upload is started lazily when the first part
//!   fills; smaller payloads fall back to the adaptive plan.
//!
//! Any failure aborts the in-flight multipart upload, closes the query and
//! is returned wrapped in [`ExportError::ExportFailed`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, ExportError, Result, StorageError};
use crate::storage::{ObjectAttributes, ObjectStorage};

use super::buffer::StreamingBuffer;
use super::metadata::ExportMetadata;
use super::multipart::{MultipartUploader, UploadSession};
use super::planner::{MAX_PART_SIZE, MIN_PART_SIZE, UploadPlan, UploadType};
use super::progress::ProgressTracker;
use super::request::ExportRequest;
use super::serializer::DocumentSerializer;
use super::streaming::StreamingQuery;

/// Default part size for streaming mode
pub const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;

/// Upload strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Buffer everything, then choose single or multipart by size
    #[default]
    Adaptive,

    /// Upload parts while reading
    Streaming,
}

impl FromStr for ExportMode {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "adaptive" => Ok(ExportMode::Adaptive),
            "streaming" => Ok(ExportMode::Streaming),
            _ => Err(ConfigError::InvalidValue {
                field: "mode".to_string(),
                value: s.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportMode::Adaptive => write!(f, "adaptive"),
            ExportMode::Streaming => write!(f, "streaming"),
        }
    }
}

/// Upload tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    pub mode: ExportMode,
    /// Target part size in streaming mode
    pub part_size: usize,
    /// Maximum parts in flight for planned multipart uploads
    pub concurrency: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            mode: ExportMode::Adaptive,
            part_size: DEFAULT_PART_SIZE,
            concurrency: 1,
        }
    }
}

impl UploadOptions {
    /// Part size clamped so that every flushed part is a valid non-final
    /// part and a whole member fits below the maximum part size
    pub fn effective_part_size(&self) -> usize {
        self.part_size.clamp(MIN_PART_SIZE, MAX_PART_SIZE / 2)
    }
}

/// Result of an export operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Object key written
    pub key: String,
    /// Number of records exported
    pub records_exported: u64,
    /// Bytes sent to storage (compressed size when compression is on)
    pub bytes_uploaded: u64,
    /// Upload path taken
    pub upload_type: UploadType,
    /// Number of parts (1 for a single upload)
    pub part_count: usize,
    /// Time taken for export
    pub elapsed_ms: u64,
}

/// Flushes full parts during streaming mode
struct PartFlusher<'s> {
    storage: &'s dyn ObjectStorage,
    key: &'s str,
    attributes: &'s ObjectAttributes,
    part_size: usize,
    session: &'s mut Option<UploadSession>,
}

impl PartFlusher<'_> {
    async fn flush_if_full(&mut self, buffer: &mut StreamingBuffer) -> Result<()> {
        if buffer.size() < self.part_size {
            return Ok(());
        }

        let data = Bytes::from(buffer.extract_and_reset()?);
        if self.session.is_none() {
            let session = UploadSession::initiate(self.storage, self.key, self.attributes).await?;
            *self.session = Some(session);
        }
        if let Some(session) = self.session.as_mut() {
            let size = data.len();
            let part_number = session.upload_part(self.storage, data).await?;
            info!("Uploaded part {} (size: {} bytes)", part_number, size);
        }
        Ok(())
    }
}

/// Coordinator for export operations
pub struct ExportCoordinator {
    request: ExportRequest,
    query: Box<dyn StreamingQuery>,
    storage: Arc<dyn ObjectStorage>,
    tracker: ProgressTracker,
    options: UploadOptions,
    cancel_token: Option<CancellationToken>,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    pub fn new(
        request: ExportRequest,
        query: Box<dyn StreamingQuery>,
        storage: Arc<dyn ObjectStorage>,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            request,
            query,
            storage,
            tracker,
            options: UploadOptions::default(),
            cancel_token: None,
        }
    }

    /// Override upload tuning
    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Execute the export operation
    ///
    /// # Returns
    /// * `Result<ExportResult>` - Export statistics, or the failure wrapped in
    ///   [`ExportError::ExportFailed`]
    pub async fn execute(&mut self) -> Result<ExportResult> {
        let start_time = Instant::now();
        let export_time = Local::now();

        info!(
            "Starting export from collection '{}' to '{}' (mode: {}, compression: {})",
            self.request.collection(),
            self.request.key(),
            self.options.mode,
            self.request.compression()
        );

        let mut session: Option<UploadSession> = None;
        let outcome = match self.options.mode {
            ExportMode::Adaptive => self.run_adaptive(export_time).await,
            ExportMode::Streaming => self.run_streaming(export_time, &mut session).await,
        };
        self.tracker.finish();

        match outcome {
            Ok(mut result) => {
                result.elapsed_ms = start_time.elapsed().as_millis() as u64;
                info!(
                    "Successfully completed {} upload with {} parts, {} total records",
                    result.upload_type, result.part_count, result.records_exported
                );
                Ok(result)
            }
            Err(e) => {
                error!("Error during export operation: {}", e);
                if let Some(session) = session.as_mut() {
                    session.abort(self.storage.as_ref()).await;
                }
                if let Err(close_err) = self.query.close().await {
                    warn!("Failed to close query after error: {}", close_err);
                }
                Err(ExportError::export_failed(e))
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel_token {
            Some(ref token) if token.is_cancelled() => {
                info!("Export operation cancelled by user");
                Err(ExportError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn attributes_for(
        &self,
        upload_type: UploadType,
        export_time: DateTime<Local>,
    ) -> ObjectAttributes {
        let metadata = self
            .request
            .include_metadata()
            .then(|| ExportMetadata::build(&self.request, upload_type, export_time));
        ObjectAttributes::json(self.request.compression(), metadata)
    }

    /// Drain the query into `buffer`, flushing parts when `flusher` is set
    ///
    /// The query is closed once it is exhausted.
    async fn write_records(
        &mut self,
        buffer: &mut StreamingBuffer,
        mut flusher: Option<&mut PartFlusher<'_>>,
    ) -> Result<u64> {
        let mut serializer = DocumentSerializer::new(self.request.wrapper_key().cloned());
        buffer.write(&serializer.prefix())?;

        let mut batch_count = 0u32;
        loop {
            self.check_cancelled()?;

            let Some(records) = self.query.next_batch().await? else {
                debug!("No more documents available");
                break;
            };
            batch_count += 1;
            debug!("Received batch #{} of {} records", batch_count, records.len());

            for record in &records {
                buffer.write(&serializer.serialize(record))?;
                self.tracker.update(serializer.records());
                if let Some(flusher) = flusher.as_mut() {
                    flusher.flush_if_full(buffer).await?;
                }
            }
        }

        buffer.write(&serializer.suffix())?;
        self.query.close().await?;

        info!(
            "Finished reading from MongoDB. Total records: {}",
            serializer.records()
        );
        Ok(serializer.records())
    }

    async fn run_adaptive(&mut self, export_time: DateTime<Local>) -> Result<ExportResult> {
        let mut buffer = StreamingBuffer::new(self.request.compression());
        let records = self.write_records(&mut buffer, None).await?;
        let payload = Bytes::from(buffer.extract_and_close()?);

        let (upload_type, part_count) = self.upload_payload(&payload, export_time).await?;
        Ok(ExportResult {
            key: self.request.key().to_string(),
            records_exported: records,
            bytes_uploaded: payload.len() as u64,
            upload_type,
            part_count,
            elapsed_ms: 0,
        })
    }

    async fn run_streaming(
        &mut self,
        export_time: DateTime<Local>,
        session: &mut Option<UploadSession>,
    ) -> Result<ExportResult> {
        let storage = Arc::clone(&self.storage);
        let key = self.request.key().to_string();
        let attributes = self.attributes_for(UploadType::Multipart, export_time);
        let part_size = self.options.effective_part_size();
        debug!("Streaming export with part size {} bytes", part_size);

        let mut buffer = StreamingBuffer::new(self.request.compression());
        let records = {
            let mut flusher = PartFlusher {
                storage: storage.as_ref(),
                key: &key,
                attributes: &attributes,
                part_size,
                session: &mut *session,
            };
            self.write_records(&mut buffer, Some(&mut flusher)).await?
        };
        let tail = Bytes::from(buffer.extract_and_close()?);

        let Some(open) = session.as_mut() else {
            debug!("No part filled while streaming, uploading {} bytes by plan", tail.len());
            let bytes_uploaded = tail.len() as u64;
            let (upload_type, part_count) = self.upload_payload(&tail, export_time).await?;
            return Ok(ExportResult {
                key,
                records_exported: records,
                bytes_uploaded,
                upload_type,
                part_count,
                elapsed_ms: 0,
            });
        };

        if !tail.is_empty() {
            let size = tail.len();
            let part_number = open.upload_part(storage.as_ref(), tail).await?;
            info!("Uploaded final part {} (size: {} bytes)", part_number, size);
        }
        open.complete(storage.as_ref()).await?;

        Ok(ExportResult {
            key,
            records_exported: records,
            bytes_uploaded: open.bytes_uploaded(),
            upload_type: UploadType::Multipart,
            part_count: open.parts().len(),
            elapsed_ms: 0,
        })
    }

    /// Upload a complete payload by plan
    async fn upload_payload(
        &self,
        payload: &Bytes,
        export_time: DateTime<Local>,
    ) -> Result<(UploadType, usize)> {
        let plan = UploadPlan::for_payload(payload.len())?;
        let attributes = self.attributes_for(plan.upload_type(), export_time);
        let key = self.request.key();

        match plan {
            UploadPlan::Single { length } => {
                info!("Using single upload for {} bytes", length);
                self.storage
                    .put(key, &attributes, payload.clone())
                    .await
                    .map_err(|e| StorageError::PutFailed(Box::new(e)))?;
                Ok((UploadType::Single, 1))
            }
            UploadPlan::Multipart { parts } => {
                info!(
                    "Using multipart upload for {} bytes in {} parts",
                    payload.len(),
                    parts.len()
                );
                let count = MultipartUploader::new(self.storage.as_ref(), self.options.concurrency)
                    .upload(key, &attributes, payload, &parts)
                    .await?;
                Ok((UploadType::Multipart, count))
            }
        }
    }
}
