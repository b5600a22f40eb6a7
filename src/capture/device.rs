//! Capture device contract
//!
//! The capture device is a vendor SDK that loads asynchronously, owns the
//! camera stream and overlay while a capture runs, and reports progress via
//! callbacks. Implementations forward those callbacks as [`DeviceEvent`]s on
//! the channel handed to [`CaptureDevice::start`].

use crate::errors::FlowError;
use crate::quality::CropResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Outcome of loading and initializing the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceLoad {
    Ready { camera_supported: bool },
    ScriptLoadFailed,
    InitializeFailed { code: u16, description: String },
}

/// Failures reported by the device, either from `start` or as an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFailure {
    /// User or system denied camera access
    CameraAccessDenied,
    CameraNotSupported,
    /// Required page elements for the overlay are not available
    MissingElements,
    AlreadyStarted,
    /// Capture started after a failure already occurred
    RepeatFailure,
    /// GPU high-water failure on some mobile browsers; retryable
    SequenceBreak,
    CropFailure,
    Unknown(String),
}

impl DeviceFailure {
    /// Stable description used in analytics
    pub fn normalized_message(&self) -> &'static str {
        match self {
            DeviceFailure::CameraAccessDenied => "User or system denied camera access",
            DeviceFailure::CameraNotSupported => "Camera not supported",
            DeviceFailure::MissingElements => "Required page elements are not available",
            DeviceFailure::AlreadyStarted => "Capture already started",
            DeviceFailure::RepeatFailure => {
                "Capture started after failure already occurred (REPEAT_FAIL_CODE)"
            }
            DeviceFailure::SequenceBreak => "iOS 15 GPU Highwater failure (SEQUENCE_BREAK_CODE)",
            DeviceFailure::CropFailure => "Cropping failure",
            DeviceFailure::Unknown(_) => "Unknown error",
        }
    }

    /// Failures which mean the device cannot start a capture at all
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            DeviceFailure::CameraNotSupported
                | DeviceFailure::MissingElements
                | DeviceFailure::RepeatFailure
        )
    }
}

impl From<DeviceFailure> for FlowError {
    fn from(failure: DeviceFailure) -> Self {
        match failure {
            DeviceFailure::CameraAccessDenied => FlowError::CameraAccessDeclined,
            DeviceFailure::SequenceBreak => FlowError::CaptureRetry,
            other => FlowError::CameraFailed(other.normalized_message().to_string()),
        }
    }
}

/// Raw callback from the device during a capture
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Frame captured, cropping not yet started
    Captured { width: u32, height: u32 },
    CropStarted,
    /// `None` means the device failed to crop
    Cropped(Option<CropResult>),
    Failed(DeviceFailure),
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Load and initialize the device. Called at most once per adapter.
    async fn load(&self) -> DeviceLoad;

    /// Begin a capture, sending progress to `events` until it ends.
    async fn start(&self, events: mpsc::UnboundedSender<DeviceEvent>)
        -> Result<(), DeviceFailure>;

    /// Release the camera stream and overlay. Must be safe to call when idle.
    async fn end(&self);
}

/// Device for hosts where the capture SDK runs outside this process.
/// Crops arrive through [`FieldCapture::on_cropped`](super::FieldCapture::on_cropped)
/// instead of a session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalDevice;

#[async_trait]
impl CaptureDevice for ExternalDevice {
    async fn load(&self) -> DeviceLoad {
        DeviceLoad::Ready {
            camera_supported: false,
        }
    }

    async fn start(&self, _events: mpsc::UnboundedSender<DeviceEvent>) -> Result<(), DeviceFailure> {
        Err(DeviceFailure::CameraNotSupported)
    }

    async fn end(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mapping() {
        assert_eq!(
            FlowError::from(DeviceFailure::CameraAccessDenied),
            FlowError::CameraAccessDeclined
        );
        assert_eq!(
            FlowError::from(DeviceFailure::SequenceBreak),
            FlowError::CaptureRetry
        );
        assert_eq!(
            FlowError::from(DeviceFailure::CropFailure),
            FlowError::CameraFailed("Cropping failure".to_string())
        );
    }

    #[test]
    fn test_start_failures() {
        assert!(DeviceFailure::CameraNotSupported.is_start_failure());
        assert!(!DeviceFailure::CameraAccessDenied.is_start_failure());
        assert!(!DeviceFailure::SequenceBreak.is_start_failure());
    }
}
