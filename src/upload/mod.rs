//! Submission transport
//!
//! Media fields are encrypted and PUT to per-field storage URLs by the
//! [`BackgroundUploader`]; the remaining form fields go to the submission
//! endpoint through the [`SubmissionClient`].

pub mod background;
pub mod encrypt;
pub mod submission;
pub mod transport;

pub use background::{BackgroundUploadPatch, BackgroundUploader, UploadJob};
pub use encrypt::{EncryptionKey, IV_LENGTH, KEY_LENGTH};
pub use submission::{build_payload, parse_response, SubmissionClient, SubmissionResult};
pub use transport::{HttpTransport, Transport, TransportResponse};
