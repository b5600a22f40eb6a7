use crate::capture::{DeviceFailure, FallbackAffordance, FieldCaptureResult};
use crate::errors::FlowError;
use crate::input::ImageMetadata;
use crate::quality::{CaptureAssessment, CropResult, StepContent};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tauri::command;

use super::flow::{get_flow, FlowSession, FlowState};

/// Result of handing an image to a field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldImageResponse {
    pub accepted: bool,
    pub metadata: Option<ImageMetadata>,
    pub assessment: Option<CaptureAssessment>,
    pub content: StepContent,
    /// `forced_upload` after a camera denial or repeated failures
    pub affordance: FallbackAffordance,
    pub state: FlowState,
}

/// Accepted images become the field's value; rejections become its error.
async fn apply_result(
    flow_id: &str,
    field: &str,
    session: &mut FlowSession,
    result: FieldCaptureResult,
) -> FieldImageResponse {
    let (accepted, metadata, assessment) = match result {
        FieldCaptureResult::Accepted {
            value,
            metadata,
            assessment,
        } => {
            session.flow.set_field_value(field, value);
            (true, Some(metadata), assessment)
        }
        FieldCaptureResult::Rejected(error) => {
            session.flow.set_field_error(field, error);
            (false, None, None)
        }
        FieldCaptureResult::UploadRequired => (false, None, None),
    };

    let (content, affordance) = match session.captures.get(field) {
        Some(capture) => (capture.content().await, capture.affordance().await),
        None => (StepContent::Default, FallbackAffordance::UploadOnly),
    };

    FieldImageResponse {
        accepted,
        metadata,
        assessment,
        content,
        affordance,
        state: FlowState::of(flow_id, session),
    }
}

/// Accept a manually selected file for an image field
#[command]
pub async fn upload_field_file(
    flow_id: String,
    field: String,
    name: String,
    mime_type: String,
    data_base64: String,
) -> Result<FieldImageResponse, String> {
    log::info!("Upload of {} ({}) for field {}", name, mime_type, field);

    let bytes = STANDARD
        .decode(data_base64.as_bytes())
        .map_err(|e| format!("Invalid file data: {}", e))?;

    let entry = get_flow(&flow_id).await?;
    let mut session = entry.session.lock().await;
    let result = session
        .field_capture(&entry.pipeline, &field)
        .upload(&name, &mime_type, &bytes)
        .await;

    Ok(apply_result(&flow_id, &field, &mut session, result).await)
}

/// Hand a crop produced by the webview capture SDK to the quality gate
#[command]
pub async fn submit_field_capture(
    flow_id: String,
    field: String,
    crop: CropResult,
) -> Result<FieldImageResponse, String> {
    let entry = get_flow(&flow_id).await?;
    let mut session = entry.session.lock().await;
    let result = session
        .field_capture(&entry.pipeline, &field)
        .on_cropped(crop)
        .await;

    Ok(apply_result(&flow_id, &field, &mut session, result).await)
}

/// Report a capture SDK failure for a field
#[command]
pub async fn report_capture_failure(
    flow_id: String,
    field: String,
    failure: DeviceFailure,
) -> Result<FieldImageResponse, String> {
    let entry = get_flow(&flow_id).await?;
    let mut session = entry.session.lock().await;
    let error = FlowError::from(failure.clone());
    let result = session
        .field_capture(&entry.pipeline, &field)
        .on_device_failure(error, failure)
        .await;

    Ok(apply_result(&flow_id, &field, &mut session, result).await)
}

/// Instructions or troubleshooting tips for a field
#[command]
pub async fn get_step_content(flow_id: String, field: String) -> Result<StepContent, String> {
    let entry = get_flow(&flow_id).await?;
    let mut session = entry.session.lock().await;
    Ok(session
        .field_capture(&entry.pipeline, &field)
        .content()
        .await)
}

/// "Try again" from the troubleshooting tips
#[command]
pub async fn dismiss_troubleshooting(flow_id: String, field: String) -> Result<StepContent, String> {
    let entry = get_flow(&flow_id).await?;
    let mut session = entry.session.lock().await;
    let capture = session.field_capture(&entry.pipeline, &field);
    capture.dismiss_troubleshooting().await;
    Ok(capture.content().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::flow::start_flow;
    use crate::messages::{ErrorDisplay, Messages};
    use crate::testing::{synthetic_crop, synthetic_png};

    #[tokio::test]
    async fn test_upload_sets_value() {
        let state = start_flow(None, None).await.unwrap();
        let response = upload_field_file(
            state.flow_id.clone(),
            "front".to_string(),
            "front.png".to_string(),
            "image/png".to_string(),
            STANDARD.encode(synthetic_png(8, 6, 1)),
        )
        .await
        .unwrap();

        assert!(response.accepted);
        assert_eq!(response.metadata.unwrap().width, Some(8));
        assert!(response.state.values.contains_key("front"));
    }

    #[tokio::test]
    async fn test_rejected_capture_sets_field_error() {
        let state = start_flow(None, None).await.unwrap();
        let response = submit_field_capture(
            state.flow_id.clone(),
            "front".to_string(),
            synthetic_crop(49.0, 80.0),
        )
        .await
        .unwrap();

        assert!(!response.accepted);
        assert_eq!(response.state.errors.len(), 1);
        assert_eq!(
            get_step_content(state.flow_id, "front".to_string())
                .await
                .unwrap(),
            StepContent::Default
        );
        assert_eq!(response.affordance, FallbackAffordance::UploadOnly);
    }

    #[tokio::test]
    async fn test_camera_denial_forces_upload() {
        let state = start_flow(None, None).await.unwrap();
        let response = report_capture_failure(
            state.flow_id.clone(),
            "back".to_string(),
            DeviceFailure::CameraAccessDenied,
        )
        .await
        .unwrap();

        assert!(!response.accepted);
        assert_eq!(response.affordance, FallbackAffordance::ForcedUpload);
        assert_eq!(
            response.state.errors,
            vec![ErrorDisplay::Inline {
                field: "back".to_string(),
                message: Messages::english()
                    .render(&FlowError::CameraAccessDeclined)
                    .unwrap(),
            }]
        );
    }
}
