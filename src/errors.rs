use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Every error the capture and submission pipeline can raise.
///
/// Errors are cloned into flow state (inline field errors, step banners,
/// re-entry state), so every variant carries owned data only.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FlowError {
    #[error("required value missing")]
    RequiredValueMissing,

    /// The server rejected one field, or the form when `field` is absent.
    #[error("{message}")]
    UploadFormEntry {
        field: Option<String>,
        message: String,
    },

    /// The server rejected the submission as a whole.
    #[error("submission rejected with {} field error(s)", .entries.len())]
    UploadFormEntries {
        entries: Vec<FormEntryError>,
        remaining_attempts: Option<u32>,
        hints: bool,
        is_failed_result: bool,
        pii: Option<BTreeMap<String, String>>,
    },

    #[error("user or system denied camera access")]
    CameraAccessDeclined,

    #[error("camera capture failed: {0}")]
    CameraFailed(String),

    /// Device-level failure which is expected to succeed on a fresh attempt.
    #[error("capture interrupted, try again")]
    CaptureRetry,

    #[error("image has glare")]
    Glare,

    #[error("image is blurry")]
    Blurry,

    #[error("file type {mime_type} is not accepted")]
    InvalidFileType { mime_type: String },

    /// Image is byte-identical to one the server already rejected.
    #[error("image already failed verification")]
    ResubmitFailedImage,

    #[error("background upload failed for {}", .fields.join(", "))]
    BackgroundEncryptedUpload {
        base_field: String,
        fields: Vec<String>,
    },

    /// Internal signal that the server is still processing the submission.
    #[error("submission pending")]
    RetrySubmission,

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unknown(String),
}

/// One field-scoped rejection reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormEntryError {
    #[serde(default)]
    pub field: Option<String>,
    pub message: String,
}

impl From<FormEntryError> for FlowError {
    fn from(entry: FormEntryError) -> Self {
        FlowError::UploadFormEntry {
            field: entry.field,
            message: entry.message,
        }
    }
}

/// Coarse grouping used to decide how an error is recovered and displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Required-field and MIME-type checks; never leave the client.
    InputValidation,
    /// Access denial, device failure, quality rejection.
    CaptureDevice,
    /// Background upload or foreground network failure.
    Transport,
    /// Field-level rejection reported by the server.
    ServerField,
    /// Not a failure; the server is still working.
    Pending,
    Internal,
}

impl FlowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FlowError::RequiredValueMissing
            | FlowError::InvalidFileType { .. }
            | FlowError::ResubmitFailedImage => ErrorCategory::InputValidation,
            FlowError::CameraAccessDeclined
            | FlowError::CameraFailed(_)
            | FlowError::CaptureRetry
            | FlowError::Glare
            | FlowError::Blurry => ErrorCategory::CaptureDevice,
            FlowError::BackgroundEncryptedUpload { .. } | FlowError::Network(_) => {
                ErrorCategory::Transport
            }
            FlowError::UploadFormEntry { .. } | FlowError::UploadFormEntries { .. } => {
                ErrorCategory::ServerField
            }
            FlowError::RetrySubmission => ErrorCategory::Pending,
            FlowError::Config(_) | FlowError::Unknown(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the error counts toward troubleshooting escalation.
    pub fn is_capture_failure(&self) -> bool {
        matches!(self, FlowError::Glare | FlowError::Blurry)
    }
}

pub type FlowResult<T> = Result<T, FlowError>;

/// Configuration load/save/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write config file: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for FlowError {
    fn from(error: ConfigError) -> Self {
        FlowError::Config(error.to_string())
    }
}

/// Failures below the HTTP response level (connection, TLS, timeout).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("invalid response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(error.to_string())
        }
    }
}

impl From<TransportError> for FlowError {
    fn from(error: TransportError) -> Self {
        FlowError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_entry_conversion() {
        let error: FlowError = FormEntryError {
            field: Some("front".to_string()),
            message: "Image has glare".to_string(),
        }
        .into();
        assert_eq!(error.to_string(), "Image has glare");
        assert_eq!(error.category(), ErrorCategory::ServerField);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            FlowError::RequiredValueMissing.category(),
            ErrorCategory::InputValidation
        );
        assert_eq!(
            FlowError::CameraAccessDeclined.category(),
            ErrorCategory::CaptureDevice
        );
        assert_eq!(
            FlowError::BackgroundEncryptedUpload {
                base_field: "back".to_string(),
                fields: vec!["back".to_string()],
            }
            .category(),
            ErrorCategory::Transport
        );
        assert_eq!(FlowError::RetrySubmission.category(), ErrorCategory::Pending);
    }

    #[test]
    fn test_background_upload_display_lists_fields() {
        let error = FlowError::BackgroundEncryptedUpload {
            base_field: "front".to_string(),
            fields: vec!["front".to_string(), "back".to_string()],
        };
        assert_eq!(error.to_string(), "background upload failed for front, back");
    }

    #[test]
    fn test_transport_error_into_network() {
        let error: FlowError = TransportError::Timeout.into();
        assert_eq!(error, FlowError::Network("request timed out".to_string()));
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_value(FlowError::Glare).unwrap();
        assert_eq!(json["kind"], "glare");
    }
}
