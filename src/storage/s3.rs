//! `object_store` backed storage
//!
//! Single-shot writes go through [`ObjectStore::put_opts`] and multipart
//! uploads through [`ObjectStore::put_multipart_opts`], so headers and user
//! metadata are applied on both paths. Open multipart uploads live in the
//! backend, keyed by the [`UploadId`] handed to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, MultipartUpload, ObjectStore, PutMultipartOptions, PutOptions,
    PutPayload,
};
use tracing::debug;

use super::{CompletedPart, ObjectAttributes, ObjectStorage, UploadId};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};

/// An open multipart upload
struct PendingUpload {
    key: String,
    upload: Box<dyn MultipartUpload>,
    parts_started: u32,
}

/// Storage backend over any `object_store` implementation
pub struct ObjectStoreBackend<S> {
    store: Arc<S>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    next_upload: AtomicU64,
}

impl ObjectStoreBackend<AmazonS3> {
    /// Build an S3 backend from configuration
    ///
    /// Credentials come from the configured static keys when both are set,
    /// otherwise from the standard `AWS_*` environment chain.
    pub fn s3(config: &StorageConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build()?;
        debug!("Created S3 backend for bucket '{}'", config.bucket);
        Ok(Self::new(store))
    }
}

impl<S> ObjectStoreBackend<S>
where
    S: ObjectStore,
{
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self {
            store,
            uploads: Mutex::new(HashMap::new()),
            next_upload: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Number of multipart uploads neither completed nor aborted
    pub fn open_uploads(&self) -> usize {
        self.uploads().map(|uploads| uploads.len()).unwrap_or(0)
    }

    fn uploads(&self) -> Result<MutexGuard<'_, HashMap<String, PendingUpload>>> {
        self.uploads
            .lock()
            .map_err(|_| StorageError::InvalidState("upload registry poisoned".to_string()).into())
    }

    fn take_upload(&self, upload_id: &UploadId, key: &str) -> Result<PendingUpload> {
        let mut uploads = self.uploads()?;
        match uploads.remove(upload_id.as_str()) {
            Some(pending) if pending.key == key => Ok(pending),
            Some(pending) => {
                let found = pending.key.clone();
                uploads.insert(upload_id.to_string(), pending);
                Err(StorageError::InvalidState(format!(
                    "upload {upload_id} belongs to '{found}', not '{key}'"
                ))
                .into())
            }
            None => Err(unknown_upload(upload_id)),
        }
    }

    fn restore_upload(&self, upload_id: &UploadId, pending: PendingUpload) -> Result<()> {
        self.uploads()?.insert(upload_id.to_string(), pending);
        Ok(())
    }
}

fn unknown_upload(upload_id: &UploadId) -> crate::error::ExportError {
    StorageError::InvalidState(format!("no open multipart upload {upload_id}")).into()
}

/// Translate export attributes to `object_store` attributes
fn to_store_attributes(attributes: &ObjectAttributes) -> Attributes {
    let mut out = Attributes::new();
    out.insert(Attribute::ContentType, attributes.content_type.clone().into());
    if let Some(encoding) = &attributes.content_encoding {
        out.insert(Attribute::ContentEncoding, encoding.clone().into());
    }
    if let Some(metadata) = &attributes.metadata {
        for (key, value) in metadata.iter() {
            out.insert(Attribute::Metadata(key.to_string().into()), value.to_string().into());
        }
    }
    out
}

#[async_trait]
impl<S> ObjectStorage for ObjectStoreBackend<S>
where
    S: ObjectStore,
{
    async fn initiate(&self, key: &str, attributes: &ObjectAttributes) -> Result<UploadId> {
        let options = PutMultipartOptions::from(to_store_attributes(attributes));
        let upload = self
            .store
            .put_multipart_opts(&Path::from(key), options)
            .await?;

        let id = UploadId::new(format!(
            "mpu-{}",
            self.next_upload.fetch_add(1, Ordering::Relaxed)
        ));
        self.uploads()?.insert(
            id.to_string(),
            PendingUpload {
                key: key.to_string(),
                upload,
                parts_started: 0,
            },
        );
        Ok(id)
    }

    async fn upload_part(
        &self,
        upload_id: &UploadId,
        key: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        // object_store numbers parts by call order, so the part is started
        // under the lock and awaited after it is released
        let part = {
            let mut uploads = self.uploads()?;
            let pending = uploads
                .get_mut(upload_id.as_str())
                .filter(|pending| pending.key == key)
                .ok_or_else(|| unknown_upload(upload_id))?;

            let expected = pending.parts_started + 1;
            if part_number != expected {
                return Err(StorageError::InvalidState(format!(
                    "part {part_number} started where part {expected} was expected"
                ))
                .into());
            }
            pending.parts_started = part_number;
            pending.upload.put_part(PutPayload::from(data))
        };

        part.await?;
        Ok(format!("{upload_id}/{part_number}"))
    }

    async fn complete(
        &self,
        upload_id: &UploadId,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        for (idx, part) in parts.iter().enumerate() {
            if part.part_number as usize != idx + 1 {
                return Err(StorageError::InvalidState(format!(
                    "expected part {} at position {}, found part {}",
                    idx + 1,
                    idx,
                    part.part_number
                ))
                .into());
            }
        }

        let mut pending = self.take_upload(upload_id, key)?;
        if pending.parts_started as usize != parts.len() {
            let started = pending.parts_started;
            self.restore_upload(upload_id, pending)?;
            return Err(StorageError::InvalidState(format!(
                "upload {upload_id} started {started} parts but {} were listed",
                parts.len()
            ))
            .into());
        }

        match pending.upload.complete().await {
            Ok(result) => {
                debug!(
                    "Completed object '{}' with ETag: {}",
                    key,
                    result.e_tag.as_deref().unwrap_or("-")
                );
                Ok(())
            }
            Err(e) => {
                // Keep the upload so it can still be aborted
                self.restore_upload(upload_id, pending)?;
                Err(e.into())
            }
        }
    }

    async fn abort(&self, upload_id: &UploadId, key: &str) -> Result<()> {
        let mut pending = self.take_upload(upload_id, key)?;
        pending.upload.abort().await?;
        Ok(())
    }

    async fn put(&self, key: &str, attributes: &ObjectAttributes, data: Bytes) -> Result<()> {
        let options = PutOptions {
            attributes: to_store_attributes(attributes),
            ..Default::default()
        };
        self.store
            .put_opts(&Path::from(key), PutPayload::from(data), options)
            .await?;
        Ok(())
    }
}
