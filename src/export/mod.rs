//! Export module for collection-to-object-storage exports
//!
//! The export pipeline turns a MongoDB query into one JSON object in object
//! storage:
//!
//! 1. **StreamingQuery**: pulls records from the cursor in batches
//! 2. **DocumentSerializer**: frames records as `{"<wrapper>":[r1,r2,...]}`
//! 3. **StreamingBuffer**: accumulates bytes, optionally through gzip
//! 4. **UploadPlan**: decides single or multipart upload from the payload size
//! 5. **UploadSession / MultipartUploader**: run the multipart transaction
//!    and abort it on any failure
//!
//! These components are orchestrated by the **ExportCoordinator**.
//!
//! # Example
//!
//! ```no_run
//! // let query = Box::new(CursorStreamingQuery::new(cursor, 1000, "users"));
//! // let request = ExportRequest::new("users", "exports/users.json")?;
//! // let mut coordinator =
//! //     ExportCoordinator::new(request, query, storage, ProgressTracker::new(false));
//! // let result = coordinator.execute().await?;
//! ```

pub mod buffer;
pub mod coordinator;
pub mod metadata;
pub mod multipart;
pub mod planner;
pub mod progress;
pub mod request;
pub mod serializer;
pub mod streaming;

pub use buffer::StreamingBuffer;
pub use coordinator::{ExportCoordinator, ExportMode, ExportResult, UploadOptions};
pub use metadata::ExportMetadata;
pub use multipart::{MultipartUploader, SessionState, UploadSession};
pub use planner::{PartSpec, UploadPlan, UploadType};
pub use progress::ProgressTracker;
pub use request::{ExportRequest, WrapperKey, default_object_key, parse_filter};
pub use serializer::{DocumentSerializer, Record};
pub use streaming::{CursorStreamingQuery, StreamingQuery};
