//! Testing utilities for idcapture
//!
//! Synthetic document images plus scripted stand-ins for the capture
//! device, the network, and the analytics sink.

pub mod mocks;
pub mod synthetic_data;

pub use crate::analytics::RecordingAnalytics;
pub use mocks::{CaptureScript, MockCaptureDevice, MockTransport, TransportCall};
pub use synthetic_data::{synthetic_crop, synthetic_jpeg, synthetic_png, CARD_DIMENSIONS};
