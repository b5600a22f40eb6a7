//! Submission status polling
//!
//! A submission answered with "pending" is re-checked against the status
//! endpoint. With an interval configured the poller sleeps and re-checks
//! until the answer is no longer pending; without one it makes a single
//! check. Only the pending signal is retried; hard errors end polling.

use crate::config::SubmissionConfig;
use crate::errors::{FlowError, FlowResult};
use crate::upload::{SubmissionClient, SubmissionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Final state of a polling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Redirect(String),
    /// Polling stopped while the server still reported pending
    StillPending,
    /// The flow was torn down before resolution
    Cancelled,
}

/// Remaining budget while a submission is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub attempts_remaining: Option<u32>,
    pub interval: Option<Duration>,
    pub checks: u32,
}

impl PollState {
    fn exhausted(&self) -> bool {
        match (self.attempts_remaining, self.interval) {
            (Some(0), _) => true,
            // A single best-effort refresh when no interval is set
            (_, None) => self.checks >= 1,
            _ => false,
        }
    }
}

/// Cancels a poller from outside, e.g. when the flow unmounts
#[derive(Debug, Clone)]
pub struct PollHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        log::debug!("Cancelling status polling");
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

pub struct StatusPoller {
    interval: Option<Duration>,
    max_attempts: Option<u32>,
    handle: PollHandle,
    cancelled: watch::Receiver<bool>,
}

impl StatusPoller {
    pub fn new(interval: Option<Duration>, max_attempts: Option<u32>) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            interval,
            max_attempts,
            handle: PollHandle {
                cancel: Arc::new(tx),
            },
            cancelled: rx,
        }
    }

    pub fn from_config(config: &SubmissionConfig) -> Self {
        Self::new(config.status_poll_interval(), config.status_poll_max_attempts)
    }

    pub fn handle(&self) -> PollHandle {
        self.handle.clone()
    }

    async fn wait_cancelled(cancelled: &mut watch::Receiver<bool>) {
        // The sender lives in our own handle, so this only returns on cancel.
        let _ = cancelled.wait_for(|cancelled| *cancelled).await;
    }

    /// Resolve an initial submission result, polling while it is pending.
    pub async fn resolve(
        &mut self,
        initial: SubmissionResult,
        client: &SubmissionClient,
    ) -> FlowResult<PollOutcome> {
        let mut state = PollState {
            attempts_remaining: self.max_attempts,
            interval: self.interval,
            checks: 0,
        };
        let mut result = initial;

        loop {
            match result {
                SubmissionResult::Success => return Ok(PollOutcome::Success),
                SubmissionResult::Redirect(url) => return Ok(PollOutcome::Redirect(url)),
                SubmissionResult::Pending => {}
            }
            log::debug!("{} (check {})", FlowError::RetrySubmission, state.checks);

            if self.handle.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }
            if state.exhausted() || !client.has_status_endpoint() {
                log::info!("Submission still pending after {} check(s)", state.checks);
                return Ok(PollOutcome::StillPending);
            }

            if let Some(interval) = state.interval {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = Self::wait_cancelled(&mut self.cancelled) => {
                        return Ok(PollOutcome::Cancelled);
                    }
                }
            }

            state.checks += 1;
            if let Some(remaining) = state.attempts_remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }

            result = tokio::select! {
                checked = client.check_status() => checked?,
                _ = Self::wait_cancelled(&mut self.cancelled) => {
                    return Ok(PollOutcome::Cancelled);
                }
            };
        }
    }
}
