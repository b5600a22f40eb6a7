//! Scripted collaborators
//!
//! [`MockCaptureDevice`] plays back scripted device behaviour per capture and
//! counts start/end calls. [`MockTransport`] answers requests from canned
//! responses and records every call.

use crate::capture::{CaptureDevice, DeviceEvent, DeviceFailure, DeviceLoad};
use crate::errors::TransportError;
use crate::upload::{Transport, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// What the device does when the next capture starts
#[derive(Debug, Clone)]
pub enum CaptureScript {
    /// Send these events right away
    Events(Vec<DeviceEvent>),
    /// Refuse to start
    StartFailure(DeviceFailure),
    /// Start and wait for [`MockCaptureDevice::emit`]
    Hold,
}

#[derive(Debug, Default)]
struct DeviceState {
    starts: usize,
    ends: usize,
    loads: usize,
    sender: Option<mpsc::UnboundedSender<DeviceEvent>>,
}

#[derive(Debug)]
pub struct MockCaptureDevice {
    load: DeviceLoad,
    scripts: Mutex<VecDeque<CaptureScript>>,
    state: Mutex<DeviceState>,
}

impl MockCaptureDevice {
    pub fn new(load: DeviceLoad) -> Self {
        Self {
            load,
            scripts: Mutex::new(VecDeque::new()),
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Device with a working camera
    pub fn ready() -> Self {
        Self::new(DeviceLoad::Ready {
            camera_supported: true,
        })
    }

    /// Queue behaviour for the next capture. Unscripted captures hold.
    pub fn script(&self, script: CaptureScript) -> &Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
        self
    }

    /// Send an event to the capture in progress. Returns false when no
    /// capture is listening.
    pub fn emit(&self, event: DeviceEvent) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.sender.as_ref().map(|tx| tx.send(event).is_ok()))
            .unwrap_or(false)
    }

    pub fn starts(&self) -> usize {
        self.state.lock().map(|s| s.starts).unwrap_or(0)
    }

    pub fn ends(&self) -> usize {
        self.state.lock().map(|s| s.ends).unwrap_or(0)
    }

    pub fn loads(&self) -> usize {
        self.state.lock().map(|s| s.loads).unwrap_or(0)
    }

    /// Whether a capture currently holds the camera
    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.sender.is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CaptureDevice for MockCaptureDevice {
    async fn load(&self) -> DeviceLoad {
        if let Ok(mut state) = self.state.lock() {
            state.loads += 1;
        }
        self.load.clone()
    }

    async fn start(&self, events: mpsc::UnboundedSender<DeviceEvent>) -> Result<(), DeviceFailure> {
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .unwrap_or(CaptureScript::Hold);

        let mut state = self
            .state
            .lock()
            .map_err(|_| DeviceFailure::Unknown("device state poisoned".to_string()))?;
        state.starts += 1;

        match script {
            CaptureScript::StartFailure(failure) => Err(failure),
            CaptureScript::Events(scripted) => {
                for event in scripted {
                    let _ = events.send(event);
                }
                state.sender = Some(events);
                Ok(())
            }
            CaptureScript::Hold => {
                state.sender = Some(events);
                Ok(())
            }
        }
    }

    async fn end(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.ends += 1;
            state.sender = None;
        }
    }
}

/// One request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    pub method: &'static str,
    pub url: String,
    pub body: Bytes,
    pub fields: Vec<(String, String)>,
}

impl TransportCall {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Response(TransportResponse),
    Error(String),
}

/// Canned-response transport.
///
/// One-shot responses queued for a URL are used first, then the URL's
/// standing response, then `200 {"success":true}`.
#[derive(Debug, Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    standing: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<TransportCall>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, after the call is recorded
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond_to(&self, url: &str, response: TransportResponse) {
        if let Ok(mut standing) = self.standing.lock() {
            standing.insert(url.to_string(), Reply::Response(response));
        }
    }

    pub fn queue_response(&self, url: &str, response: TransportResponse) {
        if let Ok(mut queued) = self.queued.lock() {
            queued
                .entry(url.to_string())
                .or_default()
                .push_back(Reply::Response(response));
        }
    }

    /// Fail every request to `url` below the HTTP level
    pub fn fail(&self, url: &str, message: &str) {
        if let Ok(mut standing) = self.standing.lock() {
            standing.insert(url.to_string(), Reply::Error(message.to_string()));
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, url: &str) -> Vec<TransportCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.url == url)
            .collect()
    }

    async fn reply(&self, call: TransportCall) -> Result<TransportResponse, TransportError> {
        let url = call.url.clone();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .queued
            .lock()
            .ok()
            .and_then(|mut queued| queued.get_mut(&url).and_then(VecDeque::pop_front));
        let reply = queued.or_else(|| {
            self.standing
                .lock()
                .ok()
                .and_then(|standing| standing.get(&url).cloned())
        });

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Error(message)) => Err(TransportError::Request(message)),
            None => Ok(TransportResponse::new(&url, 200, r#"{"success":true}"#)),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn put(&self, url: &str, body: Bytes) -> Result<TransportResponse, TransportError> {
        self.reply(TransportCall {
            method: "PUT",
            url: url.to_string(),
            body,
            fields: Vec::new(),
        })
        .await
    }

    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<TransportResponse, TransportError> {
        self.reply(TransportCall {
            method: "POST",
            url: url.to_string(),
            body: Bytes::new(),
            fields: fields.to_vec(),
        })
        .await
    }

    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        self.reply(TransportCall {
            method: "GET",
            url: url.to_string(),
            body: Bytes::new(),
            fields: Vec::new(),
        })
        .await
    }
}
