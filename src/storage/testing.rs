//! Recording in-memory storage with failure injection for tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{CompletedPart, ObjectAttributes, ObjectStorage, UploadId};
use crate::error::{ExportError, Result};

/// One call observed by [`MockStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initiate { key: String },
    UploadPart { upload_id: String, part_number: u32, len: usize },
    Complete { upload_id: String, part_numbers: Vec<u32> },
    Abort { upload_id: String },
    Put { key: String, len: usize },
}

/// A stored object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub attributes: ObjectAttributes,
}

#[derive(Default)]
pub(crate) struct State {
    calls: Vec<Call>,
    next_upload: u32,
    pending: BTreeMap<String, (String, ObjectAttributes, BTreeMap<u32, Bytes>)>,
    objects: BTreeMap<String, StoredObject>,
}

/// Storage double recording every call
#[derive(Default)]
pub struct MockStorage {
    pub(crate) state: Mutex<State>,
    pub fail_initiate: bool,
    pub fail_part: Option<u32>,
    pub fail_complete: bool,
    pub fail_abort: bool,
    pub fail_put: bool,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn pending_uploads(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn uploaded_part_numbers(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadPart { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }
}

fn injected(what: &str) -> ExportError {
    ExportError::Generic(format!("injected {what} failure"))
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn initiate(&self, key: &str, attributes: &ObjectAttributes) -> Result<UploadId> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Initiate {
            key: key.to_string(),
        });
        if self.fail_initiate {
            return Err(injected("initiate"));
        }
        state.next_upload += 1;
        let id = format!("upload-{}", state.next_upload);
        state.pending.insert(
            id.clone(),
            (key.to_string(), attributes.clone(), BTreeMap::new()),
        );
        Ok(UploadId::new(id))
    }

    async fn upload_part(
        &self,
        upload_id: &UploadId,
        _key: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UploadPart {
            upload_id: upload_id.to_string(),
            part_number,
            len: data.len(),
        });
        if self.fail_part == Some(part_number) {
            return Err(injected("part upload"));
        }
        let (_, _, parts) = state
            .pending
            .get_mut(upload_id.as_str())
            .ok_or_else(|| ExportError::Generic(format!("no upload {upload_id}")))?;
        parts.insert(part_number, data);
        Ok(format!("etag-{part_number}"))
    }

    async fn complete(
        &self,
        upload_id: &UploadId,
        key: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Complete {
            upload_id: upload_id.to_string(),
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });
        if self.fail_complete {
            return Err(injected("complete"));
        }
        let (_, attributes, stored) = state
            .pending
            .remove(upload_id.as_str())
            .ok_or_else(|| ExportError::Generic(format!("no upload {upload_id}")))?;

        let mut data = Vec::new();
        for part in parts {
            let bytes = stored
                .get(&part.part_number)
                .ok_or_else(|| ExportError::Generic(format!("missing part {}", part.part_number)))?;
            assert_eq!(part.token, format!("etag-{}", part.part_number));
            data.extend_from_slice(bytes);
        }
        state
            .objects
            .insert(key.to_string(), StoredObject { data, attributes });
        Ok(())
    }

    async fn abort(&self, upload_id: &UploadId, _key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Abort {
            upload_id: upload_id.to_string(),
        });
        if self.fail_abort {
            return Err(injected("abort"));
        }
        state.pending.remove(upload_id.as_str());
        Ok(())
    }

    async fn put(&self, key: &str, attributes: &ObjectAttributes, data: Bytes) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Put {
            key: key.to_string(),
            len: data.len(),
        });
        if self.fail_put {
            return Err(injected("put"));
        }
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                attributes: attributes.clone(),
            },
        );
        Ok(())
    }
}
