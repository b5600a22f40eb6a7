//! Capture device integration
//!
//! [`CaptureAdapter`] owns the vendor device and its readiness, and makes
//! sure only one capture session holds the camera at a time.
//! [`FieldCapture`] layers quality assessment, attempt tracking and
//! analytics on top for a single form field.

pub mod adapter;
pub mod device;
pub mod field;

pub use adapter::{
    CaptureAdapter, CaptureEvent, CaptureSession, DeviceReadiness, FallbackAffordance,
};
pub use device::{CaptureDevice, DeviceEvent, DeviceFailure, DeviceLoad, ExternalDevice};
pub use field::{FieldCapture, FieldCaptureResult};
