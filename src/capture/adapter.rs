use crate::analytics::{AnalyticsSink, EVENT_SDK_LOADED};
use crate::errors::{FlowError, FlowResult};
use crate::quality::CropResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use super::device::{CaptureDevice, DeviceEvent, DeviceFailure, DeviceLoad};

/// Device readiness as seen by the capture UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceReadiness {
    Loading,
    Ready,
    /// Device script or SDK initialization failed
    ScriptLoadFailed,
    /// Device loaded but reported no usable camera
    Unsupported,
    /// Device initialized but a capture could not be started
    StartFailed,
}

/// What the field input offers the user given device readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAffordance {
    /// Guided capture is primary, manual upload is offered alongside
    CaptureWithUploadSecondary,
    /// Upload is the primary action, shown with a capture hint
    UploadPrimary,
    /// Upload is the only action
    UploadOnly,
    /// Capture retry stays primary, upload is the secondary action
    UploadSecondary,
    /// Guided capture is skipped and the native file picker opens directly
    ForcedUpload,
}

impl DeviceReadiness {
    pub fn has_capture(&self) -> bool {
        matches!(self, DeviceReadiness::Ready | DeviceReadiness::StartFailed)
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            DeviceReadiness::ScriptLoadFailed
                | DeviceReadiness::Unsupported
                | DeviceReadiness::StartFailed
        )
    }

    pub fn fallback(&self) -> FallbackAffordance {
        match self {
            DeviceReadiness::Loading | DeviceReadiness::Ready => {
                FallbackAffordance::CaptureWithUploadSecondary
            }
            DeviceReadiness::ScriptLoadFailed => FallbackAffordance::UploadPrimary,
            DeviceReadiness::Unsupported => FallbackAffordance::UploadOnly,
            DeviceReadiness::StartFailed => FallbackAffordance::UploadSecondary,
        }
    }
}

/// Normalized capture progress
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Captured { width: u32, height: u32 },
    CropStarted,
    Cropped(CropResult),
    Failed { error: FlowError, failure: DeviceFailure },
}

impl From<DeviceEvent> for CaptureEvent {
    fn from(event: DeviceEvent) -> Self {
        match event {
            DeviceEvent::Captured { width, height } => CaptureEvent::Captured { width, height },
            DeviceEvent::CropStarted => CaptureEvent::CropStarted,
            DeviceEvent::Cropped(Some(crop)) => CaptureEvent::Cropped(crop),
            DeviceEvent::Cropped(None) => CaptureEvent::Failed {
                error: DeviceFailure::CropFailure.into(),
                failure: DeviceFailure::CropFailure,
            },
            DeviceEvent::Failed(failure) => CaptureEvent::Failed {
                error: failure.clone().into(),
                failure,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveCapture {
    id: Uuid,
    field: String,
}

struct AdapterInner {
    device: Arc<dyn CaptureDevice>,
    analytics: Arc<dyn AnalyticsSink>,
    is_mobile: bool,
    readiness: RwLock<DeviceReadiness>,
    active: Mutex<Option<ActiveCapture>>,
}

/// Wraps the vendor capture device.
///
/// Owns readiness and the single active capture session. Starting a capture
/// while another is active ends the previous one first, and every exit path
/// (crop, failure, cancel, teardown) releases the device.
#[derive(Clone)]
pub struct CaptureAdapter {
    inner: Arc<AdapterInner>,
}

/// One running capture. Events arrive in device order.
///
/// Dropping a session that still holds the device ends the capture.
pub struct CaptureSession {
    id: Uuid,
    field: String,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
    adapter: CaptureAdapter,
    released: bool,
}

impl CaptureSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Next event, or a failure if the device went away mid-capture
    pub async fn next_event(&mut self) -> CaptureEvent {
        match self.events.recv().await {
            Some(event) => event.into(),
            None => {
                let failure = DeviceFailure::Unknown("device closed the capture".to_string());
                CaptureEvent::Failed {
                    error: failure.clone().into(),
                    failure,
                }
            }
        }
    }

    /// End this capture now if it still holds the device.
    pub async fn release(mut self) -> bool {
        self.released = true;
        self.adapter.end_session(self.id).await
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let adapter = self.adapter.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if adapter.end_session(id).await {
                        log::debug!("Released device held by dropped capture {}", id);
                    }
                });
            }
            Err(_) => log::warn!(
                "Capture {} dropped outside a runtime, device held until teardown",
                id
            ),
        }
    }
}

impl CaptureAdapter {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        analytics: Arc<dyn AnalyticsSink>,
        is_mobile: bool,
    ) -> Self {
        // Only mobile devices load the capture SDK; others are ready without a camera.
        let readiness = if is_mobile {
            DeviceReadiness::Loading
        } else {
            DeviceReadiness::Unsupported
        };

        Self {
            inner: Arc::new(AdapterInner {
                device,
                analytics,
                is_mobile,
                readiness: RwLock::new(readiness),
                active: Mutex::new(None),
            }),
        }
    }

    pub async fn readiness(&self) -> DeviceReadiness {
        *self.inner.readiness.read().await
    }

    /// Load the device once. Later calls return the settled readiness.
    pub async fn initialize(&self) -> DeviceReadiness {
        let mut readiness = self.inner.readiness.write().await;
        if !self.inner.is_mobile || *readiness != DeviceReadiness::Loading {
            return *readiness;
        }

        let load = self.inner.device.load().await;
        let payload = match &load {
            DeviceLoad::Ready { camera_supported } => {
                serde_json::json!({ "success": true, "isCameraSupported": camera_supported })
            }
            DeviceLoad::ScriptLoadFailed => {
                serde_json::json!({ "success": false, "description": "script load failed" })
            }
            DeviceLoad::InitializeFailed { code, description } => {
                serde_json::json!({ "success": false, "code": code, "description": description })
            }
        };
        self.inner.analytics.track(EVENT_SDK_LOADED, payload);

        *readiness = match load {
            DeviceLoad::Ready {
                camera_supported: true,
            } => DeviceReadiness::Ready,
            DeviceLoad::Ready {
                camera_supported: false,
            } => DeviceReadiness::Unsupported,
            DeviceLoad::ScriptLoadFailed | DeviceLoad::InitializeFailed { .. } => {
                DeviceReadiness::ScriptLoadFailed
            }
        };
        log::info!("Capture device readiness: {:?}", *readiness);
        *readiness
    }

    pub async fn active_field(&self) -> Option<String> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|active| active.field.clone())
    }

    /// Start a capture for `field`, ending any capture already running.
    pub async fn start_capture(&self, field: &str) -> FlowResult<CaptureSession> {
        let readiness = self.readiness().await;
        if !readiness.has_capture() {
            return Err(FlowError::CameraFailed(format!(
                "capture unavailable ({:?})",
                readiness
            )));
        }

        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            log::debug!(
                "Ending capture {} for {} before starting {}",
                previous.id,
                previous.field,
                field
            );
            self.inner.device.end().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(failure) = self.inner.device.start(tx).await {
            log::warn!("Capture start failed for {}: {:?}", field, failure);
            self.inner.device.end().await;
            if failure.is_start_failure() {
                *self.inner.readiness.write().await = DeviceReadiness::StartFailed;
            }
            return Err(failure.into());
        }

        let id = Uuid::new_v4();
        *active = Some(ActiveCapture {
            id,
            field: field.to_string(),
        });
        log::info!("Started capture {} for {}", id, field);

        Ok(CaptureSession {
            id,
            field: field.to_string(),
            events: rx,
            adapter: self.clone(),
            released: false,
        })
    }

    /// End the capture for `field` if it is the active one.
    pub async fn end_capture(&self, field: &str) -> bool {
        let mut active = self.inner.active.lock().await;
        match active.as_ref() {
            Some(current) if current.field == field => {
                log::debug!("Ending capture {} for {}", current.id, field);
                *active = None;
                self.inner.device.end().await;
                true
            }
            _ => false,
        }
    }

    async fn end_session(&self, id: Uuid) -> bool {
        let mut active = self.inner.active.lock().await;
        if active.as_ref().map(|a| a.id) != Some(id) {
            return false;
        }
        *active = None;
        self.inner.device.end().await;
        true
    }

    /// Run one capture to completion, releasing the device on every exit,
    /// including when this future is dropped mid-capture.
    pub async fn capture(&self, field: &str) -> Result<CropResult, (FlowError, DeviceFailure)> {
        let mut session = self.start_capture(field).await.map_err(|error| {
            let failure = match &error {
                FlowError::CameraAccessDeclined => DeviceFailure::CameraAccessDenied,
                other => DeviceFailure::Unknown(other.to_string()),
            };
            (error, failure)
        })?;

        let result = loop {
            match session.next_event().await {
                CaptureEvent::Captured { width, height } => {
                    log::debug!("Captured {}x{} frame for {}", width, height, field);
                }
                CaptureEvent::CropStarted => {
                    log::debug!("Cropping started for {}", field);
                }
                CaptureEvent::Cropped(crop) => break Ok(crop),
                CaptureEvent::Failed { error, failure } => break Err((error, failure)),
            }
        };

        session.release().await;
        result
    }

    /// Release the device regardless of which field holds it.
    pub async fn teardown(&self) {
        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            log::info!("Tearing down capture {} for {}", previous.id, previous.field);
            self.inner.device.end().await;
        }
    }
}
