//! Analytics event sink
//!
//! Capture attempts, device failures and background uploads are reported as
//! named events with a JSON payload. The default sink writes them to the log.

use serde_json::Value;
use std::sync::{Arc, Mutex};

pub const EVENT_SDK_LOADED: &str = "IdV: Acuant SDK loaded";
pub const EVENT_CAPTURE_FAILED: &str = "IdV: Image capture failed";
pub const EVENT_NATIVE_CAMERA_FORCED: &str = "IdV: Native camera forced after failed attempts";
pub const EVENT_UPLOAD_ENCRYPTION: &str = "IdV: document capture async upload encryption";
pub const EVENT_UPLOAD_SUBMITTED: &str = "IdV: document capture async upload submitted";

/// "image added" event name for a field
pub fn image_added_event(field: &str) -> String {
    format!("IdV: {} image added", field)
}

pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: &str, payload: Value);
}

/// Writes events through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn track(&self, event: &str, payload: Value) {
        log::info!(target: "idcapture::analytics", "{} {}", event, payload);
    }
}

/// Keeps every event in memory, for assertions
#[derive(Debug, Default, Clone)]
pub struct RecordingAnalytics {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_named(&self, name: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(event, _)| event == name)
            .map(|(_, payload)| payload)
            .collect()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn track(&self, event: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.to_string(), payload));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink() {
        let sink = RecordingAnalytics::new();
        sink.track(EVENT_UPLOAD_ENCRYPTION, serde_json::json!({ "success": true }));
        sink.track(&image_added_event("front"), serde_json::json!({}));

        assert_eq!(sink.events().len(), 2);
        assert_eq!(
            sink.events_named(EVENT_UPLOAD_ENCRYPTION)[0]["success"],
            true
        );
        assert_eq!(sink.events()[1].0, "IdV: front image added");
    }
}
