use crate::config::CaptureConfig;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::assessor::CaptureAssessment;

/// Document sides that keep failed-submission fingerprints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSide {
    Front,
    Back,
    Passport,
}

impl DocumentSide {
    pub fn from_field(field: &str) -> Option<Self> {
        match field {
            "front" => Some(DocumentSide::Front),
            "back" => Some(DocumentSide::Back),
            "passport" => Some(DocumentSide::Passport),
            _ => None,
        }
    }
}

/// Flags describing the most recent failed attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptMetadata {
    pub is_assessed_as_glare: bool,
    pub is_assessed_as_blurry: bool,
    pub is_assessed_as_unsupported: bool,
}

impl From<&CaptureAssessment> for AttemptMetadata {
    fn from(assessment: &CaptureAssessment) -> Self {
        Self {
            is_assessed_as_glare: assessment.is_glare(),
            is_assessed_as_blurry: assessment.is_blurry(),
            is_assessed_as_unsupported: false,
        }
    }
}

/// Instructions a capture step shows for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepContent {
    Default,
    Troubleshooting,
}

/// Failed-attempt bookkeeping for one flow instance.
///
/// Per-field counters drive troubleshooting escalation and reset on a
/// successful capture or an explicit dismissal. Flow-wide counters decide
/// when the native camera is forced instead of the guided capture.
#[derive(Debug, Clone)]
pub struct FailedCaptureAttempts {
    max_failed_attempts_before_tips: u32,
    max_capture_attempts_before_native_camera: u32,
    max_submission_attempts_before_native_camera: u32,
    per_field: HashMap<String, u32>,
    failed_capture_attempts: u32,
    failed_submission_attempts: u32,
    failed_camera_permission_attempts: u32,
    last_attempt_metadata: AttemptMetadata,
    failed_fingerprints: HashMap<DocumentSide, Vec<String>>,
    selfie_capture_enabled: bool,
}

impl FailedCaptureAttempts {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            max_failed_attempts_before_tips: config.max_failed_attempts_before_tips,
            max_capture_attempts_before_native_camera: config
                .max_capture_attempts_before_native_camera,
            max_submission_attempts_before_native_camera: config
                .max_submission_attempts_before_native_camera,
            per_field: HashMap::new(),
            failed_capture_attempts: 0,
            failed_submission_attempts: 0,
            failed_camera_permission_attempts: 0,
            last_attempt_metadata: AttemptMetadata::default(),
            failed_fingerprints: HashMap::new(),
            selfie_capture_enabled: false,
        }
    }

    pub fn with_selfie_capture(mut self, enabled: bool) -> Self {
        self.selfie_capture_enabled = enabled;
        self
    }

    pub fn record_failure(&mut self, field: &str, metadata: AttemptMetadata) {
        let count = self.per_field.entry(field.to_string()).or_insert(0);
        *count += 1;
        self.failed_capture_attempts += 1;
        self.last_attempt_metadata = metadata;
        log::debug!(
            "Failed capture on {}: {} consecutive, {} total",
            field,
            count,
            self.failed_capture_attempts
        );
    }

    pub fn record_success(&mut self, field: &str) {
        self.per_field.remove(field);
        self.failed_capture_attempts = 0;
    }

    /// User chose "try again" from the troubleshooting content.
    pub fn dismiss_troubleshooting(&mut self, field: &str) {
        self.per_field.remove(field);
    }

    pub fn failed_attempts(&self, field: &str) -> u32 {
        self.per_field.get(field).copied().unwrap_or(0)
    }

    pub fn content_for(&self, field: &str) -> StepContent {
        if self.failed_attempts(field) >= self.max_failed_attempts_before_tips {
            StepContent::Troubleshooting
        } else {
            StepContent::Default
        }
    }

    pub fn failed_capture_attempts(&self) -> u32 {
        self.failed_capture_attempts
    }

    pub fn failed_submission_attempts(&self) -> u32 {
        self.failed_submission_attempts
    }

    pub fn last_attempt_metadata(&self) -> AttemptMetadata {
        self.last_attempt_metadata
    }

    pub fn record_camera_permission_failure(&mut self) -> u32 {
        self.failed_camera_permission_attempts += 1;
        self.failed_camera_permission_attempts
    }

    pub fn failed_camera_permission_attempts(&self) -> u32 {
        self.failed_camera_permission_attempts
    }

    /// Record a rejected submission along with fingerprints of the images the
    /// server failed, so an identical re-upload can be caught locally.
    pub fn record_submission_failure(&mut self, failed_images: &[(DocumentSide, &[u8])]) {
        self.failed_submission_attempts += 1;
        for (side, bytes) in failed_images {
            let fingerprint = fingerprint(bytes);
            let entry = self.failed_fingerprints.entry(*side).or_default();
            if !entry.contains(&fingerprint) {
                entry.push(fingerprint);
            }
        }
    }

    pub fn is_known_failed_image(&self, side: DocumentSide, bytes: &[u8]) -> bool {
        let print = fingerprint(bytes);
        self.failed_fingerprints
            .get(&side)
            .map(|prints| prints.contains(&print))
            .unwrap_or(false)
    }

    /// Guided capture is abandoned for the native camera once either limit is
    /// reached. Selfie capture never forces it, to keep liveness detection.
    pub fn force_native_camera(&self) -> bool {
        if self.selfie_capture_enabled {
            return false;
        }
        self.failed_capture_attempts >= self.max_capture_attempts_before_native_camera
            || self.failed_submission_attempts >= self.max_submission_attempts_before_native_camera
    }
}

/// URL-safe base64 SHA-256 digest
pub fn fingerprint(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}
