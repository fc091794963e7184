//! Streaming record sources for export operations
//!
//! A [`StreamingQuery`] yields records in batches without loading the whole
//! result set into memory. The MongoDB implementation renders each document
//! as relaxed Extended JSON, which is the record text the exporter writes.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Cursor;
use mongodb::bson::{Bson, Document};
use tracing::{debug, info};

use crate::error::{Result, RetrievalError};

use super::serializer::Record;

/// Trait for streaming query results in batches
#[async_trait]
pub trait StreamingQuery: Send {
    /// Fetch the next batch of records
    ///
    /// # Returns
    /// * `Result<Option<Vec<Record>>>` - Next batch, or None if exhausted
    async fn next_batch(&mut self) -> Result<Option<Vec<Record>>>;

    /// Close the query and release server resources
    ///
    /// Safe to call more than once; only the first call has an effect.
    async fn close(&mut self) -> Result<()>;
}

/// Render one document as relaxed Extended JSON
pub fn document_to_record(doc: Document) -> Result<Record> {
    let value = Bson::Document(doc).into_relaxed_extjson();
    Ok(Record::new(serde_json::to_string(&value)?))
}

/// Cursor-backed streaming query for `find` results
pub struct CursorStreamingQuery {
    cursor: Option<Cursor<Document>>,
    batch_size: u32,
    total_fetched: u64,
    collection: String,
    closed: bool,
}

impl CursorStreamingQuery {
    /// Create a new cursor streaming query
    ///
    /// # Arguments
    /// * `cursor` - MongoDB cursor from a find operation
    /// * `batch_size` - Number of documents to pull per batch
    /// * `collection` - Collection name for logging
    pub fn new(cursor: Cursor<Document>, batch_size: u32, collection: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor),
            batch_size,
            total_fetched: 0,
            collection: collection.into(),
            closed: false,
        }
    }
}

#[async_trait]
impl StreamingQuery for CursorStreamingQuery {
    async fn next_batch(&mut self) -> Result<Option<Vec<Record>>> {
        if self.closed {
            return Ok(None);
        }

        let cursor = match self.cursor.as_mut() {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut batch = Vec::with_capacity(self.batch_size as usize);

        for _ in 0..self.batch_size {
            match cursor.try_next().await {
                Ok(Some(doc)) => batch.push(document_to_record(doc)?),
                Ok(None) => break,
                Err(e) => {
                    // Dropping the cursor kills it on the server
                    self.cursor = None;
                    self.closed = true;
                    return Err(RetrievalError::CursorFailed(e.to_string()).into());
                }
            }
        }

        if batch.is_empty() {
            debug!(
                "Cursor on '{}' exhausted after {} documents",
                self.collection, self.total_fetched
            );
            self.cursor = None;
            self.closed = true;
            Ok(None)
        } else {
            self.total_fetched += batch.len() as u64;
            debug!(
                "Fetched batch of {} documents (total: {})",
                batch.len(),
                self.total_fetched
            );
            Ok(Some(batch))
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.cursor = None;
            self.closed = true;
            info!(
                "Closed cursor on '{}' after fetching {} documents",
                self.collection, self.total_fetched
            );
        }
        Ok(())
    }
}

impl Drop for CursorStreamingQuery {
    fn drop(&mut self) {
        if !self.closed {
            debug!("CursorStreamingQuery dropped without explicit close");
            self.cursor = None;
        }
    }
}
