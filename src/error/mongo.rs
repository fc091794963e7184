use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured error information extracted from MongoDB errors.
///
/// Serialized as compact JSON so a failed export leaves a single
/// greppable log line.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format MongoDB errors as compact JSON wrapped in an `error` field.
///
/// Used by the parent module's `Display` implementation for
/// `ExportError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });
    let json_output = serde_json::to_string(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "MongoDB error: {json_output}")
}

/// Extract structured information from a MongoDB error using the driver API.
///
/// An export only reads, so the interesting kinds are command failures
/// (bad filter, missing privileges, cursor timeouts) and connectivity.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = get_error_name(command_error.code);
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Get a human-readable error name from a MongoDB error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        2 => "BadValue",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        43 => "CursorNotFound",
        50 => "MaxTimeMSExpired",
        _ => return None,
    };

    Some(name.to_string())
}
