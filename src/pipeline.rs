//! Document capture orchestration
//!
//! [`DocumentCapture`] owns one verification attempt end to end: it builds
//! the step flow, hands out per-field capture handlers, and on completion
//! runs the background upload, the foreground submission and status
//! polling. A rejected or unresolved submission produces a [`ReentryState`]
//! that remounts the flow on the review step with the held values, so a
//! retry re-sends them without re-capturing anything.

use crate::analytics::AnalyticsSink;
use crate::capture::{CaptureAdapter, FieldCapture};
use crate::config::IdCaptureConfig;
use crate::errors::{FlowError, FlowResult};
use crate::flow::{FlowOptions, FormSteps, FormValue, History, Step, StepError, Transition};
use crate::input::{data_url_bytes, FieldValue};
use crate::poll::{PollHandle, PollOutcome, StatusPoller};
use crate::quality::{DocumentSide, FailedCaptureAttempts, QualityAssessor};
use crate::upload::{build_payload, BackgroundUploader, EncryptionKey, SubmissionClient, Transport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DOCUMENTS_STEP: &str = "documents";
pub const SELFIE_STEP: &str = "selfie";
pub const REVIEW_STEP: &str = "review";

/// Image fields whose failed submissions are fingerprinted
const FINGERPRINTED_FIELDS: [&str; 3] = ["front", "back", "passport"];

/// Steps of the document capture flow. The review step shows the document
/// inputs again so server rejections can be resolved in place.
pub fn document_steps(selfie: bool) -> Vec<Step> {
    let mut steps = vec![Step::new(DOCUMENTS_STEP)
        .with_title("Add photos of your ID")
        .required("front")
        .required("back")];
    if selfie {
        steps.push(
            Step::new(SELFIE_STEP)
                .with_title("Take a photo of yourself")
                .required("selfie"),
        );
    }
    steps.push(
        Step::new(REVIEW_STEP)
            .with_title("Check your images and try again")
            .required("front")
            .required("back"),
    );
    steps
}

/// Everything needed to remount the flow after a failed submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReentryState {
    pub step: String,
    pub values: FormValue,
    pub errors: Vec<StepError>,
    pub remaining_attempts: Option<u32>,
    pub hints: bool,
    pub is_failed_result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii: Option<BTreeMap<String, String>>,
}

impl ReentryState {
    /// Split a submission error into inline field errors and a step banner.
    pub fn from_error(values: FormValue, error: FlowError) -> Self {
        let mut state = Self {
            step: REVIEW_STEP.to_string(),
            values,
            errors: Vec::new(),
            remaining_attempts: None,
            hints: false,
            is_failed_result: false,
            pii: None,
        };

        match error {
            FlowError::UploadFormEntries {
                entries,
                remaining_attempts,
                hints,
                is_failed_result,
                pii,
            } => {
                state.errors = entries
                    .into_iter()
                    .map(|entry| match entry.field.clone() {
                        Some(field) => StepError::field(field, entry.into()),
                        None => StepError::step(entry.into()),
                    })
                    .collect();
                state.remaining_attempts = remaining_attempts;
                state.hints = hints;
                state.is_failed_result = is_failed_result;
                state.pii = pii;
            }
            other => state.errors.push(StepError::step(other)),
        }
        state
    }

    pub fn flow_options(&self, config: &IdCaptureConfig) -> FlowOptions {
        FlowOptions {
            initial_step: Some(self.step.clone()),
            initial_values: self.values.clone(),
            initial_active_errors: self.errors.clone(),
            prompt_on_navigate: config.flow.prompt_on_navigate,
            title_format: config.flow.title_format.clone(),
        }
    }
}

/// How a submission attempt ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Completed { values: FormValue },
    Redirect { url: String },
    /// The flow still has unresolved fields
    Blocked { errors: Vec<StepError> },
    /// Remount the flow from this state and let the user retry
    Retry { state: ReentryState },
    /// Polling was cancelled by teardown
    Cancelled,
}

pub type CompletionCallback = Arc<dyn Fn(&FormValue) + Send + Sync>;

pub struct DocumentCapture {
    config: IdCaptureConfig,
    uploader: BackgroundUploader,
    client: SubmissionClient,
    attempts: Arc<tokio::sync::Mutex<FailedCaptureAttempts>>,
    analytics: Arc<dyn AnalyticsSink>,
    selfie: bool,
    poll: std::sync::Mutex<Option<PollHandle>>,
    on_complete: Option<CompletionCallback>,
}

impl DocumentCapture {
    pub fn new(
        config: IdCaptureConfig,
        transport: Arc<dyn Transport>,
        key: Option<EncryptionKey>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let uploader = BackgroundUploader::new(
            transport.clone(),
            config.submission.background_upload_urls.clone(),
            key,
            analytics.clone(),
        );
        let client = SubmissionClient::new(
            transport,
            config.submission.endpoint.clone(),
            config.submission.status_endpoint.clone(),
        );
        let attempts = FailedCaptureAttempts::new(&config.capture);

        Self {
            config,
            uploader,
            client,
            attempts: Arc::new(tokio::sync::Mutex::new(attempts)),
            analytics,
            selfie: false,
            poll: std::sync::Mutex::new(None),
            on_complete: None,
        }
    }

    /// Add the selfie step. Selfie capture never falls back to the native
    /// camera.
    pub fn with_selfie(mut self, selfie: bool) -> Self {
        self.selfie = selfie;
        self.attempts = Arc::new(tokio::sync::Mutex::new(
            FailedCaptureAttempts::new(&self.config.capture).with_selfie_capture(selfie),
        ));
        self
    }

    pub fn with_on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn config(&self) -> &IdCaptureConfig {
        &self.config
    }

    pub fn attempts(&self) -> Arc<tokio::sync::Mutex<FailedCaptureAttempts>> {
        self.attempts.clone()
    }

    pub fn steps(&self) -> Vec<Step> {
        document_steps(self.selfie)
    }

    pub fn flow_options(&self) -> FlowOptions {
        FlowOptions {
            prompt_on_navigate: self.config.flow.prompt_on_navigate,
            title_format: self.config.flow.title_format.clone(),
            ..FlowOptions::new()
        }
    }

    /// Mount a fresh flow on the first step
    pub fn mount(&self, history: Box<dyn History>) -> FormSteps {
        FormSteps::new(self.steps(), self.flow_options(), history)
    }

    /// Mount the flow again after a failed submission
    pub fn remount(&self, state: &ReentryState, history: Box<dyn History>) -> FormSteps {
        log::info!(
            "Re-entering flow on {} with {} error(s)",
            state.step,
            state.errors.len()
        );
        FormSteps::new(self.steps(), state.flow_options(&self.config), history)
    }

    /// Capture handler for one image field, sharing this attempt's tracker
    pub fn field_capture(&self, field: &str, adapter: CaptureAdapter) -> FieldCapture {
        FieldCapture::new(
            field,
            adapter,
            QualityAssessor::from_config(&self.config.capture),
            self.attempts.clone(),
            self.analytics.clone(),
            self.config.capture.accepted_mime_types.clone(),
        )
    }

    /// Complete the flow and submit its value.
    pub async fn submit_flow(&self, flow: &mut FormSteps) -> FlowResult<SubmissionOutcome> {
        let values = match flow.complete() {
            Transition::Completed { values } => values,
            Transition::Blocked { errors, .. } => {
                return Ok(SubmissionOutcome::Blocked { errors });
            }
            _ => {
                return Err(FlowError::Unknown(
                    "flow is already completed or unmounted".to_string(),
                ));
            }
        };

        // A redirect leaves the flow behind: no prompt, no late updates.
        let outcome = self.submit(values).await;
        if let SubmissionOutcome::Redirect { url } = &outcome {
            log::info!("Submission redirected to {}", url);
            flow.unmount();
        }
        Ok(outcome)
    }

    /// Upload and submit a completed form value.
    ///
    /// Background uploads settle before the foreground request is sent; if
    /// any fails, nothing is submitted.
    pub async fn submit(&self, values: FormValue) -> SubmissionOutcome {
        let patch = match self.uploader.upload_all(&values).await {
            Ok(patch) => patch,
            Err(error) => return self.retry(values, error),
        };

        let fields = build_payload(
            &values,
            &patch,
            self.config.submission.is_async(),
            &self.config.submission.flow_path,
        );
        log::info!("Submitting {} field(s) to {}", fields.len(), self.client.endpoint());

        let initial = match self.client.submit(&fields).await {
            Ok(result) => result,
            Err(error) => {
                if let FlowError::UploadFormEntries { .. } = error {
                    self.record_submission_failure(&values).await;
                }
                return self.retry(values, error);
            }
        };

        let mut poller = StatusPoller::from_config(&self.config.submission);
        if let Ok(mut poll) = self.poll.lock() {
            *poll = Some(poller.handle());
        }
        let resolved = poller.resolve(initial, &self.client).await;
        if let Ok(mut poll) = self.poll.lock() {
            *poll = None;
        }

        match resolved {
            Ok(PollOutcome::Success) => {
                log::info!("Submission succeeded");
                if let Some(callback) = &self.on_complete {
                    callback(&values);
                }
                SubmissionOutcome::Completed { values }
            }
            Ok(PollOutcome::Redirect(url)) => SubmissionOutcome::Redirect { url },
            Ok(PollOutcome::StillPending) => self.retry(values, FlowError::RetrySubmission),
            Ok(PollOutcome::Cancelled) => SubmissionOutcome::Cancelled,
            Err(error) => {
                if let FlowError::UploadFormEntries { .. } = error {
                    self.record_submission_failure(&values).await;
                }
                self.retry(values, error)
            }
        }
    }

    fn retry(&self, values: FormValue, error: FlowError) -> SubmissionOutcome {
        log::warn!("Submission failed: {}", error);
        SubmissionOutcome::Retry {
            state: ReentryState::from_error(values, error),
        }
    }

    async fn record_submission_failure(&self, values: &FormValue) {
        let images: Vec<(DocumentSide, Vec<u8>)> = FINGERPRINTED_FIELDS
            .iter()
            .filter_map(|field| {
                let side = DocumentSide::from_field(field)?;
                let media = values.get(*field).and_then(FieldValue::as_media)?;
                data_url_bytes(&media.data).ok().map(|bytes| (side, bytes))
            })
            .collect();
        let borrowed: Vec<(DocumentSide, &[u8])> = images
            .iter()
            .map(|(side, bytes)| (*side, bytes.as_slice()))
            .collect();

        self.attempts
            .lock()
            .await
            .record_submission_failure(&borrowed);
    }

    /// Whether a status poll is in flight
    pub fn is_polling(&self) -> bool {
        self.poll
            .lock()
            .map(|poll| poll.is_some())
            .unwrap_or(false)
    }

    /// Stop any in-flight status polling. No further requests are made.
    pub fn unmount(&self) {
        if let Ok(poll) = self.poll.lock() {
            if let Some(handle) = poll.as_ref() {
                handle.cancel();
            }
        }
    }
}
