//! Status poller tests
//!
//! Run with: cargo test --test poll_test

use idcapture::errors::FlowError;
use idcapture::poll::{PollOutcome, StatusPoller};
use idcapture::testing::MockTransport;
use idcapture::upload::{SubmissionClient, SubmissionResult, TransportResponse};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const ENDPOINT: &str = "/api/verify/images";
const STATUS: &str = "/api/verify/status";

fn pending() -> TransportResponse {
    TransportResponse::new(STATUS, 200, r#"{"success":true,"isPending":true}"#)
}

fn done() -> TransportResponse {
    TransportResponse::new(STATUS, 200, r#"{"success":true}"#)
}

fn client(transport: &Arc<MockTransport>) -> SubmissionClient {
    SubmissionClient::new(transport.clone(), ENDPOINT, Some(STATUS.to_string()))
}

#[tokio::test]
async fn test_not_pending_resolves_without_requests() {
    let transport = Arc::new(MockTransport::new());
    let mut poller = StatusPoller::new(Some(Duration::from_millis(5)), None);

    let outcome = poller
        .resolve(SubmissionResult::Success, &client(&transport))
        .await;
    assert_eq!(outcome, Ok(PollOutcome::Success));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_polls_until_not_pending() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_response(STATUS, pending());
    transport.queue_response(STATUS, pending());
    transport.queue_response(STATUS, done());
    let mut poller = StatusPoller::new(Some(Duration::from_millis(5)), None);

    let outcome = poller
        .resolve(SubmissionResult::Pending, &client(&transport))
        .await;
    assert_eq!(outcome, Ok(PollOutcome::Success));
    assert_eq!(transport.calls_to(STATUS).len(), 3);
}

#[tokio::test]
async fn test_without_interval_checks_once() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(STATUS, pending());
    let mut poller = StatusPoller::new(None, None);

    let outcome = poller
        .resolve(SubmissionResult::Pending, &client(&transport))
        .await;
    assert_eq!(outcome, Ok(PollOutcome::StillPending));
    assert_eq!(transport.calls_to(STATUS).len(), 1);
}

#[tokio::test]
async fn test_max_attempts_bounds_polling() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(STATUS, pending());
    let mut poller = StatusPoller::new(Some(Duration::from_millis(1)), Some(3));

    let outcome = poller
        .resolve(SubmissionResult::Pending, &client(&transport))
        .await;
    assert_eq!(outcome, Ok(PollOutcome::StillPending));
    assert_eq!(transport.calls_to(STATUS).len(), 3);
}

#[tokio::test]
async fn test_hard_error_ends_polling() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_response(STATUS, pending());
    transport.fail(STATUS, "connection reset");
    let mut poller = StatusPoller::new(Some(Duration::from_millis(1)), None);

    let outcome = poller
        .resolve(SubmissionResult::Pending, &client(&transport))
        .await;
    assert_eq!(
        outcome,
        Err(FlowError::Network("request failed: connection reset".to_string()))
    );
    assert_eq!(transport.calls_to(STATUS).len(), 2);
}

#[tokio::test]
async fn test_redirect_while_polling() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(
        STATUS,
        TransportResponse::new(STATUS, 200, "").with_url("https://example.com/next"),
    );
    let mut poller = StatusPoller::new(None, None);

    let outcome = poller
        .resolve(SubmissionResult::Pending, &client(&transport))
        .await;
    assert_eq!(
        outcome,
        Ok(PollOutcome::Redirect("https://example.com/next".to_string()))
    );
}

#[tokio::test]
async fn test_cancel_during_wait_makes_no_further_requests() {
    let transport = Arc::new(MockTransport::new());
    transport.respond_to(STATUS, pending());
    let mut poller = StatusPoller::new(Some(Duration::from_millis(100)), None);
    let handle = poller.handle();
    let client = client(&transport);

    let task = tokio::spawn(async move { poller.resolve(SubmissionResult::Pending, &client).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    assert_eq!(task.await.unwrap(), Ok(PollOutcome::Cancelled));
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(transport.calls_to(STATUS).is_empty());
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn test_cancel_during_request() {
    let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(200)));
    transport.respond_to(STATUS, done());
    let mut poller = StatusPoller::new(None, None);
    let handle = poller.handle();
    let client = client(&transport);

    let task = tokio::spawn(async move { poller.resolve(SubmissionResult::Pending, &client).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    assert_eq!(task.await.unwrap(), Ok(PollOutcome::Cancelled));
    assert_eq!(transport.calls_to(STATUS).len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Polling succeeds exactly when some status response is not pending,
    /// and stops at the first one that is not.
    #[test]
    fn resolves_iff_some_response_not_pending(
        flags in prop::collection::vec(any::<bool>(), 1..6),
    ) {
        let (outcome, calls) = tokio_test::block_on(async {
            let transport = Arc::new(MockTransport::new());
            transport.respond_to(STATUS, pending());
            for is_pending in &flags {
                transport.queue_response(STATUS, if *is_pending { pending() } else { done() });
            }
            let mut poller = StatusPoller::new(
                Some(Duration::from_millis(1)),
                Some(flags.len() as u32),
            );
            let outcome = poller
                .resolve(SubmissionResult::Pending, &client(&transport))
                .await;
            (outcome, transport.calls_to(STATUS).len())
        });

        let first_done = flags.iter().position(|is_pending| !is_pending);
        match first_done {
            Some(index) => {
                prop_assert_eq!(outcome, Ok(PollOutcome::Success));
                prop_assert_eq!(calls, index + 1);
            }
            None => {
                prop_assert_eq!(outcome, Ok(PollOutcome::StillPending));
                prop_assert_eq!(calls, flags.len());
            }
        }
    }
}
