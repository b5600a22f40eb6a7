//! Configuration management for idcapture
//!
//! Provides configuration loading, saving, and validation for capture
//! quality thresholds, troubleshooting limits, submission endpoints and
//! flow behaviour. The background-upload encryption key is never stored
//! here; callers supply it at submission time.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdCaptureConfig {
    pub capture: CaptureConfig,
    pub submission: SubmissionConfig,
    pub flow: FlowConfig,
}

/// Capture quality and escalation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Minimum acceptable glare score (0-100, higher is less glare)
    pub glare_threshold: f64,
    /// Minimum acceptable sharpness score (0-100)
    pub sharpness_threshold: f64,
    /// Consecutive failed captures on one field before troubleshooting tips replace instructions
    pub max_failed_attempts_before_tips: u32,
    /// Failed captures (all fields) before the native camera is forced
    pub max_capture_attempts_before_native_camera: u32,
    /// Failed submissions before the native camera is forced
    pub max_submission_attempts_before_native_camera: u32,
    /// Accepted MIME types for manual uploads
    pub accepted_mime_types: Vec<String>,
}

/// Foreground submission, status polling and background upload configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Foreground submission endpoint
    pub endpoint: String,
    /// Status endpoint polled while a submission is pending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_endpoint: Option<String>,
    /// Poll interval in milliseconds; unset means a single status check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_poll_interval_ms: Option<u64>,
    /// Stop polling after this many status checks; unset polls until resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_poll_max_attempts: Option<u32>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Value sent as `flow_path` with every submission
    #[serde(default = "default_flow_path")]
    pub flow_path: String,
    /// Per-field encrypted upload URLs; empty disables background upload
    #[serde(default)]
    pub background_upload_urls: BTreeMap<String, String>,
}

/// Step flow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Arm the unsaved-changes prompt once a value is set
    pub prompt_on_navigate: bool,
    /// Message catalog locale
    pub locale: String,
    /// Page title format, `%{step}` replaced by the step title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_format: Option<String>,
}

fn default_flow_path() -> String {
    "standard".to_string()
}

impl Default for IdCaptureConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                glare_threshold: 50.0,
                sharpness_threshold: 50.0,
                max_failed_attempts_before_tips: 3,
                max_capture_attempts_before_native_camera: 3,
                max_submission_attempts_before_native_camera: 3,
                accepted_mime_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            },
            submission: SubmissionConfig {
                endpoint: "/api/verify/images".to_string(),
                status_endpoint: None,
                status_poll_interval_ms: None,
                status_poll_max_attempts: None,
                request_timeout_ms: 30_000,
                flow_path: default_flow_path(),
                background_upload_urls: BTreeMap::new(),
            },
            flow: FlowConfig {
                prompt_on_navigate: true,
                locale: "en".to_string(),
                title_format: None,
            },
        }
    }
}

impl SubmissionConfig {
    pub fn status_poll_interval(&self) -> Option<Duration> {
        self.status_poll_interval_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether any background upload URL is configured
    pub fn is_async(&self) -> bool {
        !self.background_upload_urls.is_empty()
    }
}

impl IdCaptureConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::Read)?;
        let config: IdCaptureConfig = toml::from_str(&contents)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(ConfigError::Write)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).map_err(ConfigError::Write)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("idcapture.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !(0.0..=100.0).contains(&self.capture.glare_threshold) {
            return invalid("Glare threshold must be between 0 and 100");
        }
        if !(0.0..=100.0).contains(&self.capture.sharpness_threshold) {
            return invalid("Sharpness threshold must be between 0 and 100");
        }
        if self.capture.max_failed_attempts_before_tips == 0 {
            return invalid("Troubleshooting attempt limit must be at least 1");
        }
        if self.capture.max_capture_attempts_before_native_camera == 0
            || self.capture.max_submission_attempts_before_native_camera == 0
        {
            return invalid("Native camera attempt limits must be at least 1");
        }
        for mime in &self.capture.accepted_mime_types {
            if crate::input::accept_pattern(mime).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "Unrecognized accepted MIME type: {}",
                    mime
                )));
            }
        }

        if self.submission.endpoint.trim().is_empty() {
            return invalid("Submission endpoint must not be empty");
        }
        if let Some(interval) = self.submission.status_poll_interval_ms {
            if interval < 100 {
                return invalid("Status poll interval must be at least 100ms");
            }
            if self.submission.status_endpoint.is_none() {
                return invalid("Status poll interval requires a status endpoint");
            }
        }
        if self.submission.status_poll_max_attempts == Some(0) {
            return invalid("Status poll attempt limit must be at least 1");
        }
        if self.submission.request_timeout_ms == 0 {
            return invalid("Request timeout must be positive");
        }
        for (field, url) in &self.submission.background_upload_urls {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Background upload URL for {} must not be empty",
                    field
                )));
            }
        }

        if crate::messages::Messages::for_locale(&self.flow.locale).is_none() {
            return Err(ConfigError::Invalid(format!(
                "Unsupported locale: {}",
                self.flow.locale
            )));
        }

        Ok(())
    }
}
