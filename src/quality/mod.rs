/// Capture quality gating module
///
/// Assesses cropped captures against glare and sharpness thresholds and
/// tracks failed attempts per field so a step can escalate to
/// troubleshooting content.
pub mod assessor;
pub mod attempts;

pub use assessor::{
    Assessment, CaptureAssessment, CapturedImage, CropResult, Dimensions, DocumentType,
    QualityAssessor,
};
pub use attempts::{AttemptMetadata, DocumentSide, FailedCaptureAttempts, StepContent};
