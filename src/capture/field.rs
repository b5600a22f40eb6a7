use crate::analytics::{
    image_added_event, AnalyticsSink, EVENT_CAPTURE_FAILED, EVENT_NATIVE_CAMERA_FORCED,
};
use crate::errors::FlowError;
use crate::input::{self, FieldValue, ImageMetadata};
use crate::quality::{
    AttemptMetadata, CaptureAssessment, CropResult, DocumentSide, FailedCaptureAttempts,
    QualityAssessor, StepContent,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::adapter::{CaptureAdapter, FallbackAffordance};
use super::device::DeviceFailure;

/// Outcome of one capture or upload attempt for a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCaptureResult {
    Accepted {
        value: FieldValue,
        metadata: ImageMetadata,
        assessment: Option<CaptureAssessment>,
    },
    Rejected(FlowError),
    /// Guided capture was not started; the host should open its file picker
    UploadRequired,
}

impl FieldCaptureResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FieldCaptureResult::Accepted { .. })
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            FieldCaptureResult::Rejected(error) => Some(error),
            _ => None,
        }
    }
}

/// Capture and upload handling for a single image field.
///
/// Attempts are numbered from 1 and counted across both capture and manual
/// upload. The failed-attempt tracker is shared by every field of a flow.
pub struct FieldCapture {
    field: String,
    adapter: CaptureAdapter,
    assessor: QualityAssessor,
    attempts: Arc<Mutex<FailedCaptureAttempts>>,
    analytics: Arc<dyn AnalyticsSink>,
    accepted_mime_types: Vec<String>,
    attempt: u32,
    camera_declined: bool,
}

impl FieldCapture {
    pub fn new(
        field: impl Into<String>,
        adapter: CaptureAdapter,
        assessor: QualityAssessor,
        attempts: Arc<Mutex<FailedCaptureAttempts>>,
        analytics: Arc<dyn AnalyticsSink>,
        accepted_mime_types: Vec<String>,
    ) -> Self {
        Self {
            field: field.into(),
            adapter,
            assessor,
            attempts,
            analytics,
            accepted_mime_types,
            attempt: 0,
            camera_declined: false,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Attempts made so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Whether guided capture is bypassed for this field, after a camera
    /// permission denial or once the native camera limit is reached.
    pub async fn is_upload_forced(&self) -> bool {
        self.camera_declined || self.attempts.lock().await.force_native_camera()
    }

    /// What the field input should offer next
    pub async fn affordance(&self) -> FallbackAffordance {
        if self.is_upload_forced().await {
            return FallbackAffordance::ForcedUpload;
        }
        self.adapter.readiness().await.fallback()
    }

    /// Run the guided capture for this field. When upload is forced the
    /// device is not started.
    pub async fn capture(&mut self) -> FieldCaptureResult {
        if self.is_upload_forced().await {
            log::info!("Guided capture skipped for {}, upload forced", self.field);
            return FieldCaptureResult::UploadRequired;
        }
        match self.adapter.capture(&self.field).await {
            Ok(crop) => self.on_cropped(crop).await,
            Err((error, failure)) => self.on_device_failure(error, failure).await,
        }
    }

    /// Assess a crop result and either accept it or raise glare/blur.
    pub async fn on_cropped(&mut self, crop: CropResult) -> FieldCaptureResult {
        let attempt = self.next_attempt();
        let assessment = self.assessor.assess(&crop, attempt);
        let (media, metadata) = input::from_capture(&crop, attempt);

        let payload = self.assessor.analytics_payload(&crop, &assessment, &metadata);
        self.analytics
            .track(&image_added_event(&self.field), payload);

        match assessment.failure_error() {
            Some(error) => {
                self.record_failed_attempt(AttemptMetadata::from(&assessment))
                    .await;
                FieldCaptureResult::Rejected(error)
            }
            None => {
                self.camera_declined = false;
                self.attempts.lock().await.record_success(&self.field);
                FieldCaptureResult::Accepted {
                    value: media.into(),
                    metadata,
                    assessment: Some(assessment),
                }
            }
        }
    }

    pub async fn on_device_failure(
        &mut self,
        error: FlowError,
        failure: DeviceFailure,
    ) -> FieldCaptureResult {
        self.analytics.track(
            EVENT_CAPTURE_FAILED,
            serde_json::json!({
                "field": self.field,
                "error": failure.normalized_message(),
            }),
        );

        if failure == DeviceFailure::CameraAccessDenied {
            self.camera_declined = true;
            let count = self
                .attempts
                .lock()
                .await
                .record_camera_permission_failure();
            log::info!(
                "Camera access declined for {} ({} time(s))",
                self.field,
                count
            );
        } else {
            log::warn!("Capture failed for {}: {}", self.field, error);
        }

        FieldCaptureResult::Rejected(error)
    }

    /// Accept a manually selected file.
    ///
    /// The MIME type is checked before anything else. A byte-identical copy
    /// of an image the server already failed is rejected.
    pub async fn upload(&mut self, name: &str, mime_type: &str, bytes: &[u8]) -> FieldCaptureResult {
        let attempt = self.next_attempt();
        let (media, metadata) =
            match input::from_upload(name, mime_type, bytes, &self.accepted_mime_types, attempt) {
                Ok(normalized) => normalized,
                Err(error) => return FieldCaptureResult::Rejected(error),
            };

        if let Some(side) = DocumentSide::from_field(&self.field) {
            if self.attempts.lock().await.is_known_failed_image(side, bytes) {
                log::info!("Rejected resubmission of failed {} image", self.field);
                return FieldCaptureResult::Rejected(FlowError::ResubmitFailedImage);
            }
        }

        self.analytics.track(
            &image_added_event(&self.field),
            serde_json::json!({
                "width": metadata.width,
                "height": metadata.height,
                "mimeType": metadata.mime_type,
                "source": "upload",
                "attempt": metadata.attempt,
                "size": metadata.size,
            }),
        );

        FieldCaptureResult::Accepted {
            value: media.into(),
            metadata,
            assessment: None,
        }
    }

    async fn record_failed_attempt(&self, metadata: AttemptMetadata) {
        let mut attempts = self.attempts.lock().await;
        let was_forced = attempts.force_native_camera();
        attempts.record_failure(&self.field, metadata);
        if !was_forced && attempts.force_native_camera() {
            self.analytics.track(
                EVENT_NATIVE_CAMERA_FORCED,
                serde_json::json!({
                    "field": self.field,
                    "failed_capture_attempts": attempts.failed_capture_attempts(),
                    "failed_submission_attempts": attempts.failed_submission_attempts(),
                }),
            );
        }
    }

    pub async fn content(&self) -> StepContent {
        self.attempts.lock().await.content_for(&self.field)
    }

    pub async fn dismiss_troubleshooting(&self) {
        self.attempts
            .lock()
            .await
            .dismiss_troubleshooting(&self.field);
    }

    /// Release the device if this field holds it.
    pub async fn cancel(&self) -> bool {
        self.adapter.end_capture(&self.field).await
    }
}
