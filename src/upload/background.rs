use crate::analytics::{AnalyticsSink, EVENT_UPLOAD_ENCRYPTION, EVENT_UPLOAD_SUBMITTED};
use crate::errors::{FlowError, FlowResult};
use crate::flow::FormValue;
use crate::input::{FieldValue, MediaValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::encrypt::{encrypt, generate_iv, EncryptionKey};
use super::transport::Transport;

const TRACE_ID_HEADER: &str = "x-amzn-trace-id";

/// Fields a successful upload adds to the submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundUploadPatch {
    pub field: String,
    /// Base64 IV used for this field
    pub iv: String,
    pub url: String,
}

impl BackgroundUploadPatch {
    pub fn iv_key(&self) -> String {
        format!("{}_image_iv", self.field)
    }

    pub fn url_key(&self) -> String {
        format!("{}_image_url", self.field)
    }
}

/// One field's encrypted payload, ready to PUT
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub field: String,
    pub url: String,
    pub iv: [u8; super::encrypt::IV_LENGTH],
    pub ciphertext: Bytes,
}

fn upload_error(field: &str) -> FlowError {
    FlowError::BackgroundEncryptedUpload {
        base_field: field.to_string(),
        fields: vec![field.to_string()],
    }
}

/// Encrypts media fields and uploads them to per-field storage URLs.
///
/// With no URLs configured every operation is a no-op and nothing touches
/// the network.
pub struct BackgroundUploader {
    transport: Arc<dyn Transport>,
    urls: BTreeMap<String, String>,
    key: Option<EncryptionKey>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl BackgroundUploader {
    pub fn new(
        transport: Arc<dyn Transport>,
        urls: BTreeMap<String, String>,
        key: Option<EncryptionKey>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            transport,
            urls,
            key,
            analytics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.urls.is_empty()
    }

    pub fn url_for(&self, field: &str) -> Option<&str> {
        self.urls.get(field).map(String::as_str)
    }

    fn key(&self) -> FlowResult<&EncryptionKey> {
        self.key.as_ref().ok_or_else(|| {
            FlowError::Config("background uploads require an encryption key".to_string())
        })
    }

    /// Encrypt one field's value
    pub fn prepare(&self, field: &str, media: &MediaValue) -> FlowResult<UploadJob> {
        let url = self
            .url_for(field)
            .ok_or_else(|| FlowError::Config(format!("no background upload URL for {}", field)))?
            .to_string();
        let key = self.key()?;

        let iv = generate_iv();
        let ciphertext = encrypt(key, &iv, media.data.as_bytes());
        self.analytics.track(
            EVENT_UPLOAD_ENCRYPTION,
            serde_json::json!({ "success": ciphertext.is_ok() }),
        );
        let ciphertext = ciphertext.map_err(|e| {
            log::error!("Encryption failed for {}: {}", field, e);
            upload_error(field)
        })?;

        Ok(UploadJob {
            field: field.to_string(),
            url,
            iv,
            ciphertext: Bytes::from(ciphertext),
        })
    }

    /// PUT an encrypted job
    pub async fn send(&self, job: UploadJob) -> FlowResult<BackgroundUploadPatch> {
        let result = self.transport.put(&job.url, job.ciphertext).await;

        let (success, trace_id, status_code) = match &result {
            Ok(response) => (
                response.is_success(),
                response.header(TRACE_ID_HEADER).map(str::to_string),
                Some(response.status),
            ),
            Err(_) => (false, None, None),
        };
        self.analytics.track(
            EVENT_UPLOAD_SUBMITTED,
            serde_json::json!({
                "success": success,
                "trace_id": trace_id,
                "status_code": status_code,
            }),
        );

        match result {
            Ok(_) if success => {
                log::info!("Background upload for {} succeeded", job.field);
                Ok(BackgroundUploadPatch {
                    iv: STANDARD.encode(job.iv),
                    url: job.url,
                    field: job.field,
                })
            }
            Ok(response) => {
                log::warn!(
                    "Background upload for {} rejected with status {}",
                    job.field,
                    response.status
                );
                Err(upload_error(&job.field))
            }
            Err(e) => {
                log::warn!("Background upload for {} failed: {}", job.field, e);
                Err(upload_error(&job.field))
            }
        }
    }

    pub async fn upload(&self, field: &str, media: &MediaValue) -> FlowResult<BackgroundUploadPatch> {
        let job = self.prepare(field, media)?;
        self.send(job).await
    }

    /// Upload every configured, non-empty media field concurrently.
    ///
    /// All uploads settle before this returns; one failure does not cancel
    /// the others. Failed fields are listed together in the error.
    pub async fn upload_all(&self, values: &FormValue) -> FlowResult<FormValue> {
        let mut patch = FormValue::new();
        if !self.is_enabled() {
            return Ok(patch);
        }

        let fields: Vec<(&str, &MediaValue)> = self
            .urls
            .keys()
            .filter_map(|field| {
                values
                    .get(field)
                    .and_then(FieldValue::as_media)
                    .filter(|media| !media.data.is_empty())
                    .map(|media| (field.as_str(), media))
            })
            .collect();

        if fields.is_empty() {
            return Ok(patch);
        }
        log::info!("Starting {} background upload(s)", fields.len());

        let results = join_all(
            fields
                .iter()
                .map(|(field, media)| self.upload(field, media)),
        )
        .await;

        let mut failed = Vec::new();
        for (result, (field, _)) in results.into_iter().zip(fields.iter()) {
            match result {
                Ok(upload) => {
                    patch.insert(upload.iv_key(), FieldValue::Text(upload.iv.clone()));
                    patch.insert(upload.url_key(), FieldValue::Text(upload.url));
                }
                Err(FlowError::Config(message)) => return Err(FlowError::Config(message)),
                Err(_) => failed.push(field.to_string()),
            }
        }

        match failed.first() {
            Some(base_field) => Err(FlowError::BackgroundEncryptedUpload {
                base_field: base_field.clone(),
                fields: failed.clone(),
            }),
            None => Ok(patch),
        }
    }
}
