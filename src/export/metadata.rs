//! Object metadata attached to exported artifacts

use std::collections::BTreeMap;

use chrono::{DateTime, Local};

use super::planner::UploadType;
use super::request::ExportRequest;

/// Constant `format` tag
pub const FORMAT_TAG: &str = "json-array";

/// Descriptive attributes stored with the exported object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportMetadata {
    entries: BTreeMap<String, String>,
}

impl ExportMetadata {
    /// Build the metadata map for one export
    ///
    /// `export_time` is the export start; it is the only field that differs
    /// between two builds with the same request and upload type.
    pub fn build(
        request: &ExportRequest,
        upload_type: UploadType,
        export_time: DateTime<Local>,
    ) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("collection".to_string(), request.collection().to_string());
        entries.insert(
            "datawrapperKey".to_string(),
            request
                .wrapper_key()
                .map(|k| k.as_str().to_string())
                .unwrap_or_default(),
        );
        entries.insert(
            "exportTime".to_string(),
            export_time
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        );
        entries.insert("filter".to_string(), request.filter_text());
        entries.insert("batchSize".to_string(), request.batch_size().to_string());
        entries.insert("compressed".to_string(), request.compression().to_string());
        entries.insert("uploadType".to_string(), upload_type.as_str().to_string());
        entries.insert("format".to_string(), FORMAT_TAG.to_string());
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mongodb::bson::doc;

    use crate::export::request::WrapperKey;

    fn request() -> ExportRequest {
        ExportRequest::new("orders", "exports/orders.json")
            .unwrap()
            .with_filter(doc! { "status": "paid" })
            .with_wrapper_key(WrapperKey::new("dataList"))
            .with_batch_size(500)
            .unwrap()
            .with_compression(true)
    }

    #[test]
    fn test_metadata_fields() {
        let metadata = ExportMetadata::build(&request(), UploadType::Multipart, Local::now());

        assert_eq!(metadata.len(), 8);
        assert_eq!(metadata.get("collection"), Some("orders"));
        assert_eq!(metadata.get("datawrapperKey"), Some("dataList"));
        assert_eq!(metadata.get("filter"), Some(r#"{"status":"paid"}"#));
        assert_eq!(metadata.get("batchSize"), Some("500"));
        assert_eq!(metadata.get("compressed"), Some("true"));
        assert_eq!(metadata.get("uploadType"), Some("multipart"));
        assert_eq!(metadata.get("format"), Some("json-array"));
        assert!(metadata.get("exportTime").is_some());
    }

    #[test]
    fn test_metadata_defaults_without_wrapper_or_filter() {
        let request = ExportRequest::new("orders", "k").unwrap();
        let metadata = ExportMetadata::build(&request, UploadType::Single, Local::now());

        assert_eq!(metadata.get("datawrapperKey"), Some(""));
        assert_eq!(metadata.get("filter"), Some("{}"));
        assert_eq!(metadata.get("uploadType"), Some("single"));
        assert_eq!(metadata.get("compressed"), Some("false"));
    }

    #[test]
    fn test_rebuild_differs_only_in_export_time() {
        let request = request();
        let now = Local::now();
        let first = ExportMetadata::build(&request, UploadType::Single, now);
        let second =
            ExportMetadata::build(&request, UploadType::Single, now + Duration::seconds(5));

        let differing: Vec<&str> = first
            .iter()
            .zip(second.iter())
            .filter(|(a, b)| a != b)
            .map(|((k, _), _)| k)
            .collect();
        assert_eq!(differing, vec!["exportTime"]);
    }
}
