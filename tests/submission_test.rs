//! End-to-end submission tests
//!
//! Background upload, foreground submission, re-entry after rejection and
//! error rendering, all over the scripted transport.

use idcapture::analytics::{EVENT_UPLOAD_ENCRYPTION, EVENT_UPLOAD_SUBMITTED};
use idcapture::config::IdCaptureConfig;
use idcapture::errors::FlowError;
use idcapture::flow::{FormValue, MemoryHistory, StepError};
use idcapture::input::{FieldValue, MediaValue};
use idcapture::messages::{ErrorDisplay, Messages};
use idcapture::pipeline::{DocumentCapture, SubmissionOutcome, REVIEW_STEP};
use idcapture::testing::{MockTransport, RecordingAnalytics};
use idcapture::upload::{build_payload, EncryptionKey, SubmissionClient, TransportResponse};
use std::sync::Arc;
use std::time::Duration;

const ENDPOINT: &str = "/api/verify/images";
const STATUS: &str = "/api/verify/status";
const FRONT_URL: &str = "https://uploads.example/front";
const BACK_URL: &str = "https://uploads.example/back";

fn media(data: &str) -> FieldValue {
    FieldValue::Media(MediaValue {
        data: data.to_string(),
        name: None,
    })
}

fn values() -> FormValue {
    let mut values = FormValue::new();
    values.insert("front".to_string(), media("data:image/jpeg;base64,AAEC"));
    values.insert("back".to_string(), media("data:image/jpeg;base64,AwQF"));
    values.insert("phone".to_string(), FieldValue::from("5555550100"));
    values
}

fn async_config() -> IdCaptureConfig {
    let mut config = IdCaptureConfig::default();
    config
        .submission
        .background_upload_urls
        .insert("front".to_string(), FRONT_URL.to_string());
    config
        .submission
        .background_upload_urls
        .insert("back".to_string(), BACK_URL.to_string());
    config
}

fn pipeline(
    config: IdCaptureConfig,
    transport: &Arc<MockTransport>,
    analytics: &RecordingAnalytics,
) -> DocumentCapture {
    DocumentCapture::new(
        config,
        transport.clone(),
        Some(EncryptionKey::generate()),
        Arc::new(analytics.clone()),
    )
}

#[tokio::test]
async fn test_no_upload_urls_behaves_like_plain_submission() {
    let with_pipeline = Arc::new(MockTransport::new());
    let capture = pipeline(
        IdCaptureConfig::default(),
        &with_pipeline,
        &RecordingAnalytics::new(),
    );
    let outcome = capture.submit(values()).await;
    assert_eq!(outcome, SubmissionOutcome::Completed { values: values() });

    let plain = Arc::new(MockTransport::new());
    let client = SubmissionClient::new(plain.clone(), ENDPOINT, None);
    client
        .submit(&build_payload(&values(), &FormValue::new(), false, "standard"))
        .await
        .unwrap();

    assert_eq!(with_pipeline.calls(), plain.calls());
}

#[tokio::test]
async fn test_async_submission_carries_upload_patch() {
    let transport = Arc::new(MockTransport::new());
    let analytics = RecordingAnalytics::new();
    let capture = pipeline(async_config(), &transport, &analytics);

    let outcome = capture.submit(values()).await;
    assert!(matches!(outcome, SubmissionOutcome::Completed { .. }));

    assert_eq!(transport.calls_to(FRONT_URL)[0].method, "PUT");
    assert_eq!(transport.calls_to(BACK_URL)[0].method, "PUT");

    let post = &transport.calls_to(ENDPOINT)[0];
    assert_eq!(post.field("front"), None);
    assert_eq!(post.field("back"), None);
    assert_eq!(post.field("front_image_url"), Some(FRONT_URL));
    assert_eq!(post.field("back_image_url"), Some(BACK_URL));
    assert!(post.field("front_image_iv").is_some());
    assert_eq!(post.field("phone"), Some("5555550100"));
    assert_eq!(post.field("flow_path"), Some("standard"));

    assert_eq!(analytics.events_named(EVENT_UPLOAD_ENCRYPTION).len(), 2);
    assert_eq!(analytics.events_named(EVENT_UPLOAD_SUBMITTED).len(), 2);
}

#[tokio::test]
async fn test_background_failure_blocks_foreground_and_shows_banner() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(BACK_URL, TransportResponse::new(BACK_URL, 403, "denied"));
    let capture = pipeline(async_config(), &transport, &RecordingAnalytics::new());

    let state = match capture.submit(values()).await {
        SubmissionOutcome::Retry { state } => state,
        other => panic!("unexpected {:?}", other),
    };
    assert!(transport.calls_to(ENDPOINT).is_empty());
    assert_eq!(
        state.errors,
        vec![StepError::step(FlowError::BackgroundEncryptedUpload {
            base_field: "back".to_string(),
            fields: vec!["back".to_string()],
        })]
    );

    // Retry re-sends the held values without capturing again
    let flow = capture.remount(&state, Box::new(MemoryHistory::new()));
    assert_eq!(flow.current_step_name(), Some(REVIEW_STEP));
    assert_eq!(flow.values(), &values());

    let displays = Messages::english().render_flow(&flow);
    assert_eq!(
        displays,
        vec![ErrorDisplay::Banner {
            message: "We couldn't upload your photos. Please try again.".to_string()
        }]
    );
}

#[tokio::test]
async fn test_server_field_error_shows_only_on_that_field() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(
        ENDPOINT,
        TransportResponse::new(
            ENDPOINT,
            400,
            r#"{"success":false,"errors":[{"field":"front","message":"Image has glare"}]}"#,
        ),
    );
    let capture = pipeline(IdCaptureConfig::default(), &transport, &RecordingAnalytics::new());

    let state = match capture.submit(values()).await {
        SubmissionOutcome::Retry { state } => state,
        other => panic!("unexpected {:?}", other),
    };
    let flow = capture.remount(&state, Box::new(MemoryHistory::new()));

    assert_eq!(
        Messages::english().render_flow(&flow),
        vec![ErrorDisplay::Inline {
            field: "front".to_string(),
            message: "Image has glare".to_string()
        }]
    );
    assert!(flow.field_error("back").is_none());
}

#[tokio::test]
async fn test_retry_after_rejection_resubmits_held_values() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_response(
        ENDPOINT,
        TransportResponse::new(ENDPOINT, 500, "").with_status_text("Internal Server Error"),
    );
    let capture = pipeline(IdCaptureConfig::default(), &transport, &RecordingAnalytics::new());
    let mut flow = capture.mount(Box::new(MemoryHistory::new()));
    flow.set_value(values());

    let state = match capture.submit_flow(&mut flow).await.unwrap() {
        SubmissionOutcome::Retry { state } => state,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(
        state.errors,
        vec![StepError::step(FlowError::Network(
            "Internal Server Error".to_string()
        ))]
    );

    let mut flow = capture.remount(&state, Box::new(MemoryHistory::new()));
    let outcome = capture.submit_flow(&mut flow).await.unwrap();
    assert_eq!(outcome, SubmissionOutcome::Completed { values: values() });

    let posts = transport.calls_to(ENDPOINT);
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].fields, posts[1].fields);
}

#[tokio::test]
async fn test_unmount_during_polling_stops_requests() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(ENDPOINT, TransportResponse::new(ENDPOINT, 202, ""));
    let mut config = IdCaptureConfig::default();
    config.submission.status_endpoint = Some(STATUS.to_string());
    config.submission.status_poll_interval_ms = Some(200);
    let capture = Arc::new(pipeline(config, &transport, &RecordingAnalytics::new()));

    let running = capture.clone();
    let task = tokio::spawn(async move { running.submit(values()).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(capture.is_polling());
    capture.unmount();

    assert_eq!(task.await.unwrap(), SubmissionOutcome::Cancelled);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(transport.calls_to(STATUS).is_empty());
}

#[tokio::test]
async fn test_still_pending_offers_retry_banner() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(ENDPOINT, TransportResponse::new(ENDPOINT, 202, ""));
    transport.respond_to(
        STATUS,
        TransportResponse::new(STATUS, 200, r#"{"success":true,"isPending":true}"#),
    );
    let mut config = IdCaptureConfig::default();
    config.submission.status_endpoint = Some(STATUS.to_string());
    let capture = pipeline(config, &transport, &RecordingAnalytics::new());

    match capture.submit(values()).await {
        SubmissionOutcome::Retry { state } => {
            assert_eq!(state.errors, vec![StepError::step(FlowError::RetrySubmission)]);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(transport.calls_to(STATUS).len(), 1);
}

#[tokio::test]
async fn test_independent_flows_submit_concurrently() {
    let transport = Arc::new(MockTransport::new());
    let captures: Vec<DocumentCapture> = (0..4)
        .map(|_| pipeline(async_config(), &transport, &RecordingAnalytics::new()))
        .collect();

    let outcomes =
        futures::future::join_all(captures.iter().map(|capture| capture.submit(values()))).await;

    assert!(outcomes
        .iter()
        .all(|outcome| matches!(outcome, SubmissionOutcome::Completed { .. })));
    assert_eq!(transport.calls_to(ENDPOINT).len(), 4);
    assert_eq!(transport.calls_to(FRONT_URL).len(), 4);

    // Every flow encrypts under a fresh IV
    let mut ivs: Vec<String> = transport
        .calls_to(ENDPOINT)
        .iter()
        .filter_map(|call| call.field("front_image_iv").map(str::to_string))
        .collect();
    ivs.sort();
    ivs.dedup();
    assert_eq!(ivs.len(), 4);
}
