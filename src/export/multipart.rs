//! Multipart upload coordination
//!
//! [`UploadSession`] is the state machine of one multipart transaction:
//!
//! ```text
//! (none) --initiate--> Initiated --upload_part--> Uploading --complete--> Completed
//!                          |                          |
//!                          +---------abort------------+--> Aborted
//! ```
//!
//! A session ends in exactly one of `Completed` or `Aborted`.
//! [`MultipartUploader`] drives a session over a planned payload and aborts
//! it on any failure.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, info};

use crate::error::{ExportError, Result, StorageError};
use crate::storage::{CompletedPart, ObjectAttributes, ObjectStorage, UploadId};

use super::planner::{MAX_PART_SIZE, PartSpec};

/// Lifecycle state of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    Uploading,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

fn part_failed(part_number: u32, cause: ExportError) -> ExportError {
    StorageError::PartUploadFailed {
        part_number,
        source: Box::new(cause),
    }
    .into()
}

/// One multipart transaction against the backend
#[derive(Debug)]
pub struct UploadSession {
    key: String,
    upload_id: UploadId,
    parts: Vec<CompletedPart>,
    state: SessionState,
    bytes_uploaded: u64,
}

impl UploadSession {
    /// Start a multipart upload
    ///
    /// Failure leaves nothing to abort.
    pub async fn initiate(
        storage: &dyn ObjectStorage,
        key: &str,
        attributes: &ObjectAttributes,
    ) -> Result<Self> {
        let upload_id = storage
            .initiate(key, attributes)
            .await
            .map_err(|e| StorageError::InitiateFailed(Box::new(e)))?;

        info!("Initiated multipart upload with ID: {}", upload_id);

        Ok(Self {
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            state: SessionState::Initiated,
            bytes_uploaded: 0,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    /// Part number the next sequential upload will use
    pub fn next_part_number(&self) -> u32 {
        self.parts.len() as u32 + 1
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.state.is_terminal() {
            return Err(StorageError::InvalidState(format!(
                "cannot {operation} upload {} in state {:?}",
                self.upload_id, self.state
            ))
            .into());
        }
        Ok(())
    }

    /// Upload the next part in sequence
    pub async fn upload_part(&mut self, storage: &dyn ObjectStorage, data: Bytes) -> Result<u32> {
        self.ensure_open("upload a part to")?;

        let part_number = self.next_part_number();
        if data.len() > MAX_PART_SIZE {
            return Err(part_failed(
                part_number,
                StorageError::InvalidPlan(format!(
                    "part of {} bytes exceeds {MAX_PART_SIZE}",
                    data.len()
                ))
                .into(),
            ));
        }

        let size = data.len();
        let token = storage
            .upload_part(&self.upload_id, &self.key, part_number, data)
            .await
            .map_err(|e| part_failed(part_number, e))?;

        debug!(
            "Uploaded part {} with ETag: {}, size: {} bytes",
            part_number, token, size
        );
        self.record_part(CompletedPart { part_number, token }, size)?;
        Ok(part_number)
    }

    /// Record a part uploaded outside [`UploadSession::upload_part`]
    pub fn record_part(&mut self, part: CompletedPart, size: usize) -> Result<()> {
        self.ensure_open("record a part for")?;
        if self.parts.iter().any(|p| p.part_number == part.part_number) {
            return Err(StorageError::InvalidState(format!(
                "part {} recorded twice",
                part.part_number
            ))
            .into());
        }
        self.parts.push(part);
        self.bytes_uploaded += size as u64;
        self.state = SessionState::Uploading;
        Ok(())
    }

    /// Finalize the object from the recorded parts
    ///
    /// Parts are submitted sorted by part number and must be exactly
    /// `1..=n`. On failure the session stays open so it can be aborted.
    pub async fn complete(&mut self, storage: &dyn ObjectStorage) -> Result<()> {
        self.ensure_open("complete")?;
        if self.parts.is_empty() {
            return Err(StorageError::InvalidState(format!(
                "upload {} has no parts",
                self.upload_id
            ))
            .into());
        }

        self.parts.sort_by_key(|p| p.part_number);
        if let Some((idx, part)) = self
            .parts
            .iter()
            .enumerate()
            .find(|(idx, p)| p.part_number as usize != idx + 1)
        {
            return Err(StorageError::InvalidState(format!(
                "part {} found where part {} was expected",
                part.part_number,
                idx + 1
            ))
            .into());
        }

        storage
            .complete(&self.upload_id, &self.key, &self.parts)
            .await
            .map_err(|e| StorageError::CompletionFailed(Box::new(e)))?;

        self.state = SessionState::Completed;
        info!(
            "Completed multipart upload {} with {} parts",
            self.upload_id,
            self.parts.len()
        );
        Ok(())
    }

    /// Best-effort abort
    ///
    /// Does nothing once the session is terminal. Abort failures are logged
    /// and never returned.
    pub async fn abort(&mut self, storage: &dyn ObjectStorage) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Aborted;

        match storage.abort(&self.upload_id, &self.key).await {
            Ok(()) => info!("Aborted multipart upload: {}", self.upload_id),
            Err(e) => error!("Failed to abort multipart upload {}: {}", self.upload_id, e),
        }
    }
}

/// Uploads a fully known payload according to a multipart plan
pub struct MultipartUploader<'a> {
    storage: &'a dyn ObjectStorage,
    concurrency: usize,
}

impl<'a> MultipartUploader<'a> {
    /// Create an uploader
    ///
    /// # Arguments
    /// * `storage` - Backend to upload to
    /// * `concurrency` - Maximum parts in flight (values below 1 mean 1)
    pub fn new(storage: &'a dyn ObjectStorage, concurrency: usize) -> Self {
        Self {
            storage,
            concurrency: concurrency.max(1),
        }
    }

    /// Run initiate, upload every part and complete
    ///
    /// Any failure after initiation aborts the upload before the error is
    /// returned.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of parts uploaded
    pub async fn upload(
        &self,
        key: &str,
        attributes: &ObjectAttributes,
        payload: &Bytes,
        parts: &[PartSpec],
    ) -> Result<usize> {
        let mut session = UploadSession::initiate(self.storage, key, attributes).await?;

        match self.upload_and_complete(&mut session, payload, parts).await {
            Ok(()) => Ok(session.parts().len()),
            Err(e) => {
                error!("Error during multipart upload of '{}': {}", key, e);
                session.abort(self.storage).await;
                Err(e)
            }
        }
    }

    async fn upload_and_complete(
        &self,
        session: &mut UploadSession,
        payload: &Bytes,
        parts: &[PartSpec],
    ) -> Result<()> {
        if self.concurrency == 1 {
            for spec in parts {
                let part_number = session
                    .upload_part(self.storage, payload.slice(spec.range()))
                    .await?;
                info!(
                    "Uploaded part {} of {} (size: {} bytes)",
                    part_number,
                    parts.len(),
                    spec.length
                );
            }
        } else {
            self.upload_concurrently(session, payload, parts).await?;
        }

        session.complete(self.storage).await
    }

    /// Upload parts with up to `concurrency` requests in flight
    ///
    /// Part numbers are assigned in plan order before dispatch; completion
    /// order does not matter because the session sorts before completing.
    async fn upload_concurrently(
        &self,
        session: &mut UploadSession,
        payload: &Bytes,
        parts: &[PartSpec],
    ) -> Result<()> {
        let storage = self.storage;
        let upload_id = session.upload_id().clone();
        let key = session.key().to_string();

        let uploads = parts.iter().enumerate().map(|(idx, spec)| {
            let part_number = idx as u32 + 1;
            let data = payload.slice(spec.range());
            let upload_id = &upload_id;
            let key = key.as_str();
            async move {
                let size = data.len();
                let token = storage
                    .upload_part(upload_id, key, part_number, data)
                    .await
                    .map_err(|e| part_failed(part_number, e))?;
                debug!("Uploaded part {} (size: {} bytes)", part_number, size);
                Ok::<_, ExportError>((CompletedPart { part_number, token }, size))
            }
        });

        let completed: Vec<(CompletedPart, usize)> = stream::iter(uploads)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        for (part, size) in completed {
            session.record_part(part, size)?;
        }
        info!(
            "Uploaded {} parts with concurrency {}",
            parts.len(),
            self.concurrency
        );
        Ok(())
    }
}
