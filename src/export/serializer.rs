//! JSON document serializer
//!
//! Turns a stream of pre-serialized records into one JSON document. With a
//! wrapper key the output is `{"<key>":[r0,r1,...]}`; without one the records
//! are concatenated as-is.

use std::fmt;

use super::request::WrapperKey;

/// One retrieved record as pre-serialized JSON text
///
/// The export core never looks inside a record; it only concatenates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(String);

impl Record {
    pub fn new(json: impl Into<String>) -> Self {
        Self(json.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fragment to append for one record
///
/// A separating comma is emitted only inside a wrapper array and never
/// before the first record.
pub fn fragment(record: &Record, is_first: bool, has_wrapper: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(record.as_bytes().len() + 1);
    if has_wrapper && !is_first {
        out.push(b',');
    }
    out.extend_from_slice(record.as_bytes());
    out
}

/// Stateful serializer tracking the first-record flag
#[derive(Debug, Clone)]
pub struct DocumentSerializer {
    wrapper_key: Option<WrapperKey>,
    records: u64,
}

impl DocumentSerializer {
    pub fn new(wrapper_key: Option<WrapperKey>) -> Self {
        Self {
            wrapper_key,
            records: 0,
        }
    }

    pub fn has_wrapper(&self) -> bool {
        self.wrapper_key.is_some()
    }

    /// Bytes that open the document (`{"<key>":[` or nothing)
    pub fn prefix(&self) -> Vec<u8> {
        match &self.wrapper_key {
            Some(key) => {
                // serde_json quoting keeps odd field names valid JSON
                let quoted = serde_json::Value::String(key.as_str().to_string()).to_string();
                format!("{{{quoted}:[").into_bytes()
            }
            None => Vec::new(),
        }
    }

    /// Bytes for the next record
    pub fn serialize(&mut self, record: &Record) -> Vec<u8> {
        let out = fragment(record, self.records == 0, self.has_wrapper());
        self.records += 1;
        out
    }

    /// Bytes that close the document (`]}` or nothing)
    pub fn suffix(&self) -> Vec<u8> {
        if self.has_wrapper() {
            b"]}".to_vec()
        } else {
            Vec::new()
        }
    }

    /// Number of records serialized so far
    pub fn records(&self) -> u64 {
        self.records
    }
}
