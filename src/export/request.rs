//! Export request value objects
//!
//! An [`ExportRequest`] is validated once at construction and is immutable
//! for the duration of one export.

use std::fmt;

use chrono::{DateTime, Local};
use mongodb::bson::{Bson, Document};

use crate::error::{ConfigError, Result};

/// Field name under which exported records are nested
///
/// Blank names are not representable: an absent wrapper is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperKey(String);

impl WrapperKey {
    /// Create a wrapper key, returning `None` for empty or blank input
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            None
        } else {
            Some(Self(name))
        }
    }

    /// The raw field name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WrapperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the core needs to run one export
#[derive(Debug, Clone)]
pub struct ExportRequest {
    collection: String,
    filter: Document,
    key: String,
    wrapper_key: Option<WrapperKey>,
    batch_size: u32,
    compression: bool,
    include_metadata: bool,
}

impl ExportRequest {
    /// Create a request for `collection` written to `key`
    ///
    /// Defaults: empty filter, no wrapper key, batch size 1000, no
    /// compression, metadata included.
    ///
    /// # Returns
    /// * `Result<Self>` - Request or a configuration error for blank identifiers
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        let key = key.into();

        if collection.trim().is_empty() {
            return Err(ConfigError::MissingField("collection".to_string()).into());
        }
        if key.trim().is_empty() {
            return Err(ConfigError::MissingField("key".to_string()).into());
        }

        Ok(Self {
            collection,
            filter: Document::new(),
            key,
            wrapper_key: None,
            batch_size: 1000,
            compression: false,
            include_metadata: true,
        })
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_wrapper_key(mut self, wrapper_key: Option<WrapperKey>) -> Self {
        self.wrapper_key = wrapper_key;
        self
    }

    /// Set the cursor batch size; zero is rejected
    pub fn with_batch_size(mut self, batch_size: u32) -> Result<Self> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".to_string(),
                value: batch_size.to_string(),
            }
            .into());
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_metadata(mut self, include_metadata: bool) -> Self {
        self.include_metadata = include_metadata;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn wrapper_key(&self) -> Option<&WrapperKey> {
        self.wrapper_key.as_ref()
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn include_metadata(&self) -> bool {
        self.include_metadata
    }

    /// Filter rendered as relaxed Extended JSON, `{}` when empty
    pub fn filter_text(&self) -> String {
        if self.filter.is_empty() {
            return "{}".to_string();
        }
        Bson::Document(self.filter.clone())
            .into_relaxed_extjson()
            .to_string()
    }
}

/// Parse a JSON filter into a BSON document
///
/// Accepts Extended JSON (`{"_id": {"$oid": "..."}}`). `None` or blank
/// input yields an empty filter.
///
/// # Returns
/// * `Result<Document>` - Parsed filter or a configuration error
pub fn parse_filter(filter_json: Option<&str>) -> Result<Document> {
    let text = match filter_json {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Ok(Document::new()),
    };

    let invalid = |reason: String| ConfigError::InvalidValue {
        field: "filter".to_string(),
        value: reason,
    };

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| invalid(format!("{text} ({e})")))?;

    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(invalid(format!("{text} (expected an object, got {other})")).into()),
        Err(e) => Err(invalid(format!("{text} ({e})")).into()),
    }
}

/// Destination key used when none is configured
///
/// Format: `exports/<collection>/<collection>_<yyyy-MM-dd_HH-mm-ss>.json[.gz]`
pub fn default_object_key(collection: &str, compression: bool, now: DateTime<Local>) -> String {
    let timestamp = now.format("%Y-%m-%d_%H-%M-%S");
    let extension = if compression { ".json.gz" } else { ".json" };
    format!("exports/{collection}/{collection}_{timestamp}{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mongodb::bson::{doc, oid::ObjectId};

    use crate::error::ExportError;

    #[test]
    fn test_wrapper_key_blank_is_absent() {
        assert!(WrapperKey::new("").is_none());
        assert!(WrapperKey::new("   ").is_none());
        assert_eq!(WrapperKey::new("dataList").unwrap().as_str(), "dataList");
    }

    #[test]
    fn test_request_rejects_blank_identifiers() {
        let err = ExportRequest::new(" ", "exports/a.json").unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::MissingField(ref f)) if f == "collection"
        ));

        let err = ExportRequest::new("users", "").unwrap_err();
        assert!(matches!(err, ExportError::Config(ConfigError::MissingField(ref f)) if f == "key"));
    }

    #[test]
    fn test_request_rejects_zero_batch_size() {
        let request = ExportRequest::new("users", "exports/users.json").unwrap();
        assert!(request.with_batch_size(0).is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request = ExportRequest::new("users", "exports/users.json").unwrap();
        assert_eq!(request.batch_size(), 1000);
        assert!(!request.compression());
        assert!(request.include_metadata());
        assert!(request.wrapper_key().is_none());
        assert_eq!(request.filter_text(), "{}");
    }

    #[test]
    fn test_parse_filter_empty() {
        assert!(parse_filter(None).unwrap().is_empty());
        assert!(parse_filter(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_filter_extended_json() {
        let text = r#"{"_id": {"$oid": "507f1f77bcf86cd799439011"}, "age": {"$gt": 21}}"#;
        let filter = parse_filter(Some(text)).unwrap();
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(filter, doc! { "_id": oid, "age": { "$gt": 21 } });
    }

    #[test]
    fn test_parse_filter_rejects_non_objects() {
        assert!(parse_filter(Some("[1, 2]")).is_err());
        assert!(parse_filter(Some("{not json")).is_err());
    }

    #[test]
    fn test_filter_text_round_trips() {
        let request = ExportRequest::new("users", "k")
            .unwrap()
            .with_filter(doc! { "status": "active" });
        assert_eq!(request.filter_text(), r#"{"status":"active"}"#);
    }

    #[test]
    fn test_default_object_key() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            default_object_key("orders", false, now),
            "exports/orders/orders_2024-03-09_14-05-07.json"
        );
        assert_eq!(
            default_object_key("orders", true, now),
            "exports/orders/orders_2024-03-09_14-05-07.json.gz"
        );
    }
}
