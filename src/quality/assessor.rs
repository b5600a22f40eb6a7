use crate::config::CaptureConfig;
use crate::errors::FlowError;
use crate::input::{ImageMetadata, ImageSource};
use serde::{Deserialize, Serialize};

/// Document type reported by the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    None,
    Id,
    Passport,
}

impl DocumentType {
    /// Map the device's numeric card type
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => DocumentType::Id,
            2 => DocumentType::Passport,
            _ => DocumentType::None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::None => "none",
            DocumentType::Id => "id",
            DocumentType::Passport => "passport",
        }
    }
}

/// Cropped image returned by the device, base64 without data URL prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedImage {
    pub data: String,
    pub width: u32,
    pub height: u32,
}

/// Crop result with the device's quality heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropResult {
    pub image: CapturedImage,
    pub document_type: DocumentType,
    pub glare: f64,
    pub sharpness: f64,
    pub moire: f64,
    pub dpi: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Accept/reject verdict for a single capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Success,
    Glare,
    Blurry,
}

impl Assessment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Assessment::Success => "success",
            Assessment::Glare => "glare",
            Assessment::Blurry => "blurry",
        }
    }
}

/// Result of assessing one capture attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureAssessment {
    pub assessment: Assessment,
    pub glare_score: f64,
    pub sharpness_score: f64,
    pub dimensions: Dimensions,
    pub source: ImageSource,
    pub attempt: u32,
}

impl CaptureAssessment {
    pub fn is_success(&self) -> bool {
        self.assessment == Assessment::Success
    }

    pub fn is_glare(&self) -> bool {
        self.assessment == Assessment::Glare
    }

    pub fn is_blurry(&self) -> bool {
        self.assessment == Assessment::Blurry
    }

    /// Typed field error for a rejected capture
    pub fn failure_error(&self) -> Option<FlowError> {
        match self.assessment {
            Assessment::Success => None,
            Assessment::Glare => Some(FlowError::Glare),
            Assessment::Blurry => Some(FlowError::Blurry),
        }
    }
}

/// Glare/sharpness gate applied to every crop result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityAssessor {
    pub glare_threshold: f64,
    pub sharpness_threshold: f64,
}

impl Default for QualityAssessor {
    fn default() -> Self {
        Self {
            glare_threshold: 50.0,
            sharpness_threshold: 50.0,
        }
    }
}

impl QualityAssessor {
    pub fn new(glare_threshold: f64, sharpness_threshold: f64) -> Self {
        Self {
            glare_threshold,
            sharpness_threshold,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.glare_threshold, config.sharpness_threshold)
    }

    /// Glare is reported first when both checks fail.
    pub fn assess(&self, crop: &CropResult, attempt: u32) -> CaptureAssessment {
        let is_glare = crop.glare < self.glare_threshold;
        let is_blurry = crop.sharpness < self.sharpness_threshold;

        let assessment = if is_glare {
            Assessment::Glare
        } else if is_blurry {
            Assessment::Blurry
        } else {
            Assessment::Success
        };

        log::debug!(
            "Assessed capture attempt {}: glare={:.1}/{:.1} sharpness={:.1}/{:.1} -> {}",
            attempt,
            crop.glare,
            self.glare_threshold,
            crop.sharpness,
            self.sharpness_threshold,
            assessment.as_str()
        );

        CaptureAssessment {
            assessment,
            glare_score: crop.glare,
            sharpness_score: crop.sharpness,
            dimensions: Dimensions {
                width: crop.image.width,
                height: crop.image.height,
            },
            source: ImageSource::Capture,
            attempt,
        }
    }

    /// Analytics payload for the "image added" event of a capture
    pub fn analytics_payload(
        &self,
        crop: &CropResult,
        assessment: &CaptureAssessment,
        metadata: &ImageMetadata,
    ) -> serde_json::Value {
        serde_json::json!({
            "width": metadata.width,
            "height": metadata.height,
            "mimeType": metadata.mime_type,
            "source": "acuant",
            "attempt": metadata.attempt,
            "size": metadata.size,
            "documentType": crop.document_type.label(),
            "dpi": crop.dpi,
            "moire": crop.moire,
            "glare": crop.glare,
            "glareScoreThreshold": self.glare_threshold,
            "isAssessedAsGlare": assessment.is_glare(),
            "sharpness": crop.sharpness,
            "sharpnessScoreThreshold": self.sharpness_threshold,
            "isAssessedAsBlurry": assessment.is_blurry(),
            "assessment": assessment.assessment.as_str(),
        })
    }
}

#[cfg(test)]
pub(crate) fn crop(glare: f64, sharpness: f64) -> CropResult {
    CropResult {
        image: CapturedImage {
            data: "aGVsbG8=".to_string(),
            width: 1024,
            height: 640,
        },
        document_type: DocumentType::Id,
        glare,
        sharpness,
        moire: 99.0,
        dpi: 300,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::from_capture;

    #[test]
    fn test_success_when_above_thresholds() {
        let assessor = QualityAssessor::default();
        let result = assessor.assess(&crop(80.0, 80.0), 1);
        assert!(result.is_success());
        assert_eq!(result.failure_error(), None);
        assert_eq!(result.dimensions.width, 1024);
    }

    #[test]
    fn test_glare_just_below_threshold() {
        let assessor = QualityAssessor::default();
        let result = assessor.assess(&crop(49.0, 80.0), 1);
        assert_eq!(result.assessment, Assessment::Glare);
        assert_eq!(result.failure_error(), Some(FlowError::Glare));
    }

    #[test]
    fn test_threshold_is_inclusive_pass() {
        let assessor = QualityAssessor::default();
        assert!(assessor.assess(&crop(50.0, 50.0), 1).is_success());
    }

    #[test]
    fn test_blurry() {
        let assessor = QualityAssessor::default();
        let result = assessor.assess(&crop(70.0, 10.0), 3);
        assert_eq!(result.assessment, Assessment::Blurry);
        assert_eq!(result.attempt, 3);
    }

    #[test]
    fn test_glare_wins_over_blur() {
        let assessor = QualityAssessor::new(60.0, 60.0);
        let result = assessor.assess(&crop(10.0, 10.0), 1);
        assert_eq!(result.assessment, Assessment::Glare);
    }

    #[test]
    fn test_analytics_payload() {
        let assessor = QualityAssessor::default();
        let c = crop(49.0, 80.0);
        let assessment = assessor.assess(&c, 1);
        let (_, metadata) = from_capture(&c, 1);
        let payload = assessor.analytics_payload(&c, &assessment, &metadata);
        assert_eq!(payload["assessment"], "glare");
        assert_eq!(payload["isAssessedAsGlare"], true);
        assert_eq!(payload["documentType"], "id");
        assert_eq!(payload["size"], 5);
    }

    #[test]
    fn test_document_type_codes() {
        assert_eq!(DocumentType::from_code(1), DocumentType::Id);
        assert_eq!(DocumentType::from_code(2), DocumentType::Passport);
        assert_eq!(DocumentType::from_code(0), DocumentType::None);
    }
}
