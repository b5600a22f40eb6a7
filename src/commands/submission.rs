use crate::flow::{MemoryHistory, Transition};
use crate::pipeline::SubmissionOutcome;
use serde::{Deserialize, Serialize};
use tauri::command;

use super::flow::{get_flow, FlowState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub outcome: SubmissionOutcome,
    pub state: FlowState,
}

/// Complete the flow and submit it: background upload, foreground request,
/// then status polling while the server reports pending.
///
/// A failed submission remounts the flow on the review step with the held
/// values and the server's errors.
#[command]
pub async fn submit_flow(flow_id: String) -> Result<SubmissionResponse, String> {
    let entry = get_flow(&flow_id).await?;

    // The session lock is released while the network is in use so that
    // `end_flow` and `flow_state` stay responsive.
    let values = {
        let mut session = entry.session.lock().await;
        match session.flow.complete() {
            Transition::Completed { values } => values,
            Transition::Blocked { errors, .. } => {
                return Ok(SubmissionResponse {
                    outcome: SubmissionOutcome::Blocked { errors },
                    state: FlowState::of(&flow_id, &session),
                });
            }
            _ => return Err(format!("Flow {} is not active", flow_id)),
        }
    };

    let outcome = entry.pipeline.submit(values).await;

    let mut session = entry.session.lock().await;
    match &outcome {
        SubmissionOutcome::Redirect { url } => {
            log::info!("Flow {} redirected to {}", flow_id, url);
            session.flow.unmount();
        }
        SubmissionOutcome::Retry { state } => {
            session.flow = entry
                .pipeline
                .remount(state, Box::new(MemoryHistory::new()));
        }
        SubmissionOutcome::Cancelled => session.flow.unmount(),
        _ => {}
    }

    Ok(SubmissionResponse {
        state: FlowState::of(&flow_id, &session),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::flow::start_flow;

    #[tokio::test]
    async fn test_incomplete_flow_is_blocked() {
        let state = start_flow(None, None).await.unwrap();
        let response = submit_flow(state.flow_id).await.unwrap();
        assert!(matches!(response.outcome, SubmissionOutcome::Blocked { .. }));
        assert!(!response.state.is_completed);
    }
}
