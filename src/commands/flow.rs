use crate::analytics::LogAnalytics;
use crate::capture::{CaptureAdapter, ExternalDevice, FieldCapture};
use crate::config::IdCaptureConfig;
use crate::flow::{FocusTarget, FormSteps, FormValue, MemoryHistory, Transition};
use crate::input::FieldValue;
use crate::messages::{ErrorDisplay, Messages};
use crate::pipeline::DocumentCapture;
use crate::upload::{EncryptionKey, HttpTransport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tauri::command;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::config::current_config;

/// One mounted flow and the capture handlers of its image fields
pub(crate) struct FlowSession {
    pub flow: FormSteps,
    pub captures: HashMap<String, FieldCapture>,
    pub messages: Messages,
}

impl FlowSession {
    /// Capture handler for `field`, created on first use
    pub fn field_capture(&mut self, pipeline: &DocumentCapture, field: &str) -> &mut FieldCapture {
        self.captures.entry(field.to_string()).or_insert_with(|| {
            let adapter =
                CaptureAdapter::new(Arc::new(ExternalDevice), Arc::new(LogAnalytics), false);
            pipeline.field_capture(field, adapter)
        })
    }
}

/// Registry entry. The pipeline sits outside the session lock so teardown
/// can cancel polling while a submission holds the session.
#[derive(Clone)]
pub(crate) struct FlowEntry {
    pub pipeline: Arc<DocumentCapture>,
    pub session: Arc<Mutex<FlowSession>>,
}

lazy_static::lazy_static! {
    static ref FLOW_REGISTRY: Arc<RwLock<HashMap<String, FlowEntry>>> = Arc::new(RwLock::new(HashMap::new()));
}

pub(crate) async fn get_flow(flow_id: &str) -> Result<FlowEntry, String> {
    FLOW_REGISTRY
        .read()
        .await
        .get(flow_id)
        .cloned()
        .ok_or_else(|| format!("Flow not found: {}", flow_id))
}

/// Flow state as rendered by the webview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowState {
    pub flow_id: String,
    pub step: Option<String>,
    pub step_index: usize,
    pub step_count: usize,
    pub title: Option<String>,
    pub values: FormValue,
    pub errors: Vec<ErrorDisplay>,
    pub focus: Option<FocusTarget>,
    pub history_fragment: Option<String>,
    pub is_completed: bool,
    pub prompt_on_navigate: bool,
}

impl FlowState {
    pub(crate) fn of(flow_id: &str, session: &FlowSession) -> Self {
        let flow = &session.flow;
        Self {
            flow_id: flow_id.to_string(),
            step: flow.current_step_name().map(str::to_string),
            step_index: flow.current_index(),
            step_count: flow.steps().len(),
            title: flow.title(),
            values: flow.values().clone(),
            errors: session.messages.render_flow(flow),
            focus: flow.focus().cloned(),
            history_fragment: flow.history_fragment(),
            is_completed: flow.is_completed(),
            prompt_on_navigate: flow.is_guard_armed(),
        }
    }
}

/// Navigation result plus the state after it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowUpdate {
    pub transition: Transition,
    pub state: FlowState,
}

fn messages_for(config: &IdCaptureConfig) -> Messages {
    Messages::for_locale(&config.flow.locale).unwrap_or_else(|| {
        log::warn!("Unsupported locale {}, using English", config.flow.locale);
        Messages::english()
    })
}

/// Start a document capture flow
#[command]
pub async fn start_flow(
    selfie: Option<bool>,
    encryption_key: Option<String>,
) -> Result<FlowState, String> {
    let config = current_config()?;
    config.validate().map_err(|e| e.to_string())?;

    let key = encryption_key
        .as_deref()
        .map(EncryptionKey::from_base64)
        .transpose()
        .map_err(|e| e.to_string())?;
    let transport = HttpTransport::new(config.submission.request_timeout())
        .map_err(|e| format!("Failed to create transport: {}", e))?;

    let messages = messages_for(&config);
    let pipeline = DocumentCapture::new(config, Arc::new(transport), key, Arc::new(LogAnalytics))
        .with_selfie(selfie.unwrap_or(false));
    let flow = pipeline.mount(Box::new(MemoryHistory::new()));

    let flow_id = Uuid::new_v4().to_string();
    let session = FlowSession {
        flow,
        captures: HashMap::new(),
        messages,
    };
    let state = FlowState::of(&flow_id, &session);

    FLOW_REGISTRY.write().await.insert(
        flow_id.clone(),
        FlowEntry {
            pipeline: Arc::new(pipeline),
            session: Arc::new(Mutex::new(session)),
        },
    );

    log::info!("Started flow {}", flow_id);
    Ok(state)
}

async fn navigate(
    flow_id: &str,
    action: impl FnOnce(&mut FormSteps) -> Transition,
) -> Result<FlowUpdate, String> {
    let entry = get_flow(flow_id).await?;
    let mut session = entry.session.lock().await;
    let transition = action(&mut session.flow);
    Ok(FlowUpdate {
        transition,
        state: FlowState::of(flow_id, &session),
    })
}

/// Submit the current step
#[command]
pub async fn flow_advance(flow_id: String) -> Result<FlowUpdate, String> {
    navigate(&flow_id, FormSteps::advance).await
}

#[command]
pub async fn flow_retreat(flow_id: String) -> Result<FlowUpdate, String> {
    navigate(&flow_id, FormSteps::retreat).await
}

/// Back/forward navigation in the webview landed on `fragment`
#[command]
pub async fn flow_history_pop(
    flow_id: String,
    fragment: Option<String>,
) -> Result<FlowUpdate, String> {
    navigate(&flow_id, |flow| flow.on_history_pop(fragment.as_deref())).await
}

#[command]
pub async fn flow_set_value(
    flow_id: String,
    field: String,
    value: FieldValue,
) -> Result<FlowState, String> {
    let entry = get_flow(&flow_id).await?;
    let mut session = entry.session.lock().await;
    session.flow.set_field_value(&field, value);
    Ok(FlowState::of(&flow_id, &session))
}

#[command]
pub async fn flow_register_field(
    flow_id: String,
    field: String,
    is_required: bool,
) -> Result<FlowState, String> {
    let entry = get_flow(&flow_id).await?;
    let mut session = entry.session.lock().await;
    session.flow.register_field(&field, is_required);
    Ok(FlowState::of(&flow_id, &session))
}

#[command]
pub async fn flow_state(flow_id: String) -> Result<FlowState, String> {
    let entry = get_flow(&flow_id).await?;
    let session = entry.session.lock().await;
    Ok(FlowState::of(&flow_id, &session))
}

/// Tear down a flow: stop polling, release capture handlers, forget it.
#[command]
pub async fn end_flow(flow_id: String) -> Result<(), String> {
    let entry = FLOW_REGISTRY
        .write()
        .await
        .remove(&flow_id)
        .ok_or_else(|| format!("Flow not found: {}", flow_id))?;

    entry.pipeline.unmount();
    let mut session = entry.session.lock().await;
    for capture in session.captures.values() {
        capture.cancel().await;
    }
    session.flow.unmount();

    log::info!("Ended flow {}", flow_id);
    Ok(())
}
