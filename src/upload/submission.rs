use crate::errors::{FlowError, FlowResult, FormEntryError};
use crate::flow::FormValue;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::transport::{Transport, TransportResponse};

/// Image fields sent through background upload in async mode
pub const ASYNC_MEDIA_FIELDS: [&str; 3] = ["front", "back", "selfie"];

/// Non-error outcome of a submission or status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Success,
    /// Server accepted the submission and is still processing it
    Pending,
    /// Server asked the client to navigate elsewhere
    Redirect(String),
}

impl SubmissionResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, SubmissionResult::Pending)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServerResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default, alias = "isPending")]
    is_pending: Option<bool>,
    #[serde(default)]
    errors: Option<Vec<FormEntryError>>,
    #[serde(default)]
    remaining_attempts: Option<u32>,
    #[serde(default)]
    hints: Option<bool>,
    #[serde(default)]
    result_failed: Option<bool>,
    #[serde(default)]
    ocr_pii: Option<BTreeMap<String, String>>,
    #[serde(default)]
    redirect: Option<String>,
}

/// Interpret a submission or status response.
///
/// A followed redirect (final URL differs from `endpoint`) and an explicit
/// `redirect` on failure both yield [`SubmissionResult::Redirect`].
pub fn parse_response(endpoint: &str, response: &TransportResponse) -> FlowResult<SubmissionResult> {
    if !response.url.is_empty() && response.url != endpoint {
        log::info!("Submission redirected to {}", response.url);
        return Ok(SubmissionResult::Redirect(response.url.clone()));
    }

    if response.status == 202 {
        return Ok(SubmissionResult::Pending);
    }

    let parsed: Option<ServerResponse> = serde_json::from_slice(&response.body).ok();

    match parsed {
        Some(body) if body.success == Some(true) && response.is_success() => {
            if body.is_pending == Some(true) {
                Ok(SubmissionResult::Pending)
            } else {
                Ok(SubmissionResult::Success)
            }
        }
        Some(ServerResponse {
            redirect: Some(redirect),
            ..
        }) => {
            log::info!("Submission failed with redirect to {}", redirect);
            Ok(SubmissionResult::Redirect(redirect))
        }
        Some(ServerResponse {
            errors: Some(entries),
            remaining_attempts,
            hints,
            result_failed,
            ocr_pii,
            ..
        }) => {
            log::info!(
                "Submission rejected with {} error(s), {:?} attempt(s) remaining",
                entries.len(),
                remaining_attempts
            );
            Err(FlowError::UploadFormEntries {
                entries,
                remaining_attempts,
                hints: hints.unwrap_or(false),
                is_failed_result: result_failed.unwrap_or(false),
                pii: ocr_pii,
            })
        }
        Some(body) if response.is_success() && body.success != Some(false) => {
            Ok(SubmissionResult::Success)
        }
        None if response.is_success() => Ok(SubmissionResult::Success),
        _ => {
            let message = if response.status_text.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                response.status_text.clone()
            };
            log::warn!("Unhandled submission response {}: {}", response.status, message);
            Err(FlowError::Network(message))
        }
    }
}

/// Form fields for the foreground request.
///
/// In async mode the raw document images are left out; the background
/// upload patch carries their IVs and URLs instead.
pub fn build_payload(
    values: &FormValue,
    background_patch: &FormValue,
    is_async: bool,
    flow_path: &str,
) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = values
        .iter()
        .filter(|(field, _)| !(is_async && ASYNC_MEDIA_FIELDS.contains(&field.as_str())))
        .chain(background_patch.iter())
        .map(|(field, value)| (field.clone(), value.to_form_string()))
        .collect();
    fields.push(("flow_path".to_string(), flow_path.to_string()));
    fields
}

/// Foreground submission and status endpoint client
#[derive(Clone)]
pub struct SubmissionClient {
    transport: Arc<dyn Transport>,
    endpoint: String,
    status_endpoint: Option<String>,
}

impl SubmissionClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: impl Into<String>,
        status_endpoint: Option<String>,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            status_endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_status_endpoint(&self) -> bool {
        self.status_endpoint.is_some()
    }

    pub async fn submit(&self, fields: &[(String, String)]) -> FlowResult<SubmissionResult> {
        let response = self.transport.post_form(&self.endpoint, fields).await?;
        parse_response(&self.endpoint, &response)
    }

    /// Re-check a pending submission. Without a status endpoint the
    /// submission endpoint's answer is final.
    pub async fn check_status(&self) -> FlowResult<SubmissionResult> {
        let endpoint = self
            .status_endpoint
            .as_deref()
            .ok_or_else(|| FlowError::Config("no status endpoint configured".to_string()))?;
        let response = self.transport.get(endpoint).await?;
        parse_response(endpoint, &response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{FieldValue, MediaValue};

    const ENDPOINT: &str = "https://example.com/api/verify/images";

    fn response(status: u16, body: &str) -> TransportResponse {
        TransportResponse::new(ENDPOINT, status, body.to_string())
    }

    #[test]
    fn test_success() {
        assert_eq!(
            parse_response(ENDPOINT, &response(200, r#"{"success":true}"#)),
            Ok(SubmissionResult::Success)
        );
    }

    #[test]
    fn test_accepted_is_pending() {
        assert_eq!(
            parse_response(ENDPOINT, &response(202, r#"{"success":true}"#)),
            Ok(SubmissionResult::Pending)
        );
        assert_eq!(
            parse_response(ENDPOINT, &response(200, r#"{"success":true,"isPending":true}"#)),
            Ok(SubmissionResult::Pending)
        );
    }

    #[test]
    fn test_form_entry_errors() {
        let body = r#"{
            "success": false,
            "errors": [
                {"field": "front", "message": "Please fill in this field"},
                {"field": "back", "message": "Please fill in this field"}
            ],
            "remaining_attempts": 3,
            "hints": true,
            "result_failed": true,
            "ocr_pii": {"first_name": "Fakey", "last_name": "McFakerson", "dob": "1938-10-06"}
        }"#;
        match parse_response(ENDPOINT, &response(400, body)) {
            Err(FlowError::UploadFormEntries {
                entries,
                remaining_attempts,
                hints,
                is_failed_result,
                pii,
            }) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].field.as_deref(), Some("front"));
                assert_eq!(entries[1].message, "Please fill in this field");
                assert_eq!(remaining_attempts, Some(3));
                assert!(hints);
                assert!(is_failed_result);
                assert_eq!(pii.unwrap()["first_name"], "Fakey");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_redirects() {
        assert_eq!(
            parse_response(ENDPOINT, &response(418, r##"{"success":false,"redirect":"#teapot"}"##)),
            Ok(SubmissionResult::Redirect("#teapot".to_string()))
        );
        assert_eq!(
            parse_response(ENDPOINT, &response(200, "").with_url("https://example.com/next")),
            Ok(SubmissionResult::Redirect("https://example.com/next".to_string()))
        );
    }

    #[test]
    fn test_unhandled_uses_status_text() {
        assert_eq!(
            parse_response(ENDPOINT, &response(500, "").with_status_text("Server error")),
            Err(FlowError::Network("Server error".to_string()))
        );
        assert_eq!(
            parse_response(ENDPOINT, &response(502, "<html>")),
            Err(FlowError::Network("HTTP 502".to_string()))
        );
    }

    #[test]
    fn test_payload_async_strips_images() {
        let mut values = FormValue::new();
        values.insert(
            "front".to_string(),
            FieldValue::Media(MediaValue {
                data: "data:image/png;base64,AA==".to_string(),
                name: None,
            }),
        );
        values.insert("phone".to_string(), FieldValue::from("5555550100"));
        let mut patch = FormValue::new();
        patch.insert("front_image_url".to_string(), FieldValue::from("https://s3/front"));

        let fields = build_payload(&values, &patch, true, "standard");
        let names: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["phone", "front_image_url", "flow_path"]);

        let fields = build_payload(&values, &FormValue::new(), false, "hybrid");
        assert_eq!(fields[0].1, "data:image/png;base64,AA==");
        assert_eq!(fields.last().unwrap().1, "hybrid");
    }
}
