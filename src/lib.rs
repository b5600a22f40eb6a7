//! idcapture: identity-document capture and secure submission for Tauri applications
//!
//! This crate drives a multi-step document capture flow: guided camera
//! capture with glare and sharpness gating, manual upload fallback,
//! encrypted background upload of the images, foreground submission and
//! status polling while the server is still verifying.
//!
//! # Features
//! - Step flow controller with required-field validation, inline and banner
//!   errors, focus tracking and URL-fragment history sync
//! - Capture device adapter with single-owner camera sessions
//! - Quality gating with troubleshooting escalation after repeated failures
//! - AES-256-GCM encrypted background uploads
//! - Localized error messages
//!
//! # Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! idcapture = "0.1"
//! tauri = { version = "2.0", features = ["protocol-asset"] }
//! ```
//!
//! Then in your Tauri app:
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(idcapture::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
pub mod analytics;
pub mod capture;
pub mod commands;
pub mod config;
pub mod errors;
pub mod flow;
pub mod input;
pub mod messages;
pub mod pipeline;
pub mod poll;
pub mod quality;

// Testing utilities - scripted devices and transports for offline testing
pub mod testing;

pub mod upload;

// Re-exports for convenience
pub use config::IdCaptureConfig;
pub use errors::{FlowError, FlowResult};
pub use flow::{FormSteps, FormValue, Step, StepError, Transition};
pub use messages::{ErrorDisplay, Messages};
pub use pipeline::{DocumentCapture, ReentryState, SubmissionOutcome};

use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the idcapture plugin with all commands
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("idcapture")
        .invoke_handler(tauri::generate_handler![
            // Flow commands
            commands::flow::start_flow,
            commands::flow::flow_advance,
            commands::flow::flow_retreat,
            commands::flow::flow_set_value,
            commands::flow::flow_register_field,
            commands::flow::flow_history_pop,
            commands::flow::flow_state,
            commands::flow::end_flow,
            // Capture commands
            commands::capture::upload_field_file,
            commands::capture::submit_field_capture,
            commands::capture::report_capture_failure,
            commands::capture::get_step_content,
            commands::capture::dismiss_troubleshooting,
            // Submission commands
            commands::submission::submit_flow,
            // Configuration commands
            commands::config::get_config,
            commands::config::update_config,
            commands::config::reset_config,
        ])
        .build()
}

/// Initialize logging for the capture pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "idcapture=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "idcapture");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        assert!(std::env::var("RUST_LOG").is_ok());
    }
}
