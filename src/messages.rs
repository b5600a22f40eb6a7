//! User-facing error messages
//!
//! Every known [`FlowError`] renders to a localized string. Opaque errors
//! render nothing and are logged instead. Rendering a step's errors keeps
//! at most one message per field and at most one banner.

use crate::errors::{ConfigError, FlowError};
use crate::flow::{FormSteps, StepError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a rendered error is displayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDisplay {
    Inline { field: String, message: String },
    Banner { message: String },
}

const EN: &[(&str, &str)] = &[
    ("required_value_missing", "This field is required"),
    ("upload_form_entry", "There was a problem with this image. Please add a different one."),
    (
        "upload_form_entries",
        "We couldn't verify your ID. You have %{count} attempt(s) remaining.",
    ),
    ("upload_form_entries_final", "We couldn't verify your ID."),
    (
        "camera_access_declined",
        "You need to allow camera access to take a photo. You can upload a photo instead.",
    ),
    (
        "camera_failed",
        "We couldn't take the photo. Try again or upload a photo from your device.",
    ),
    ("capture_retry", "Something went wrong while taking the photo. Please try again."),
    (
        "glare",
        "We detected glare on your photo. Try taking a new photo in softer light.",
    ),
    (
        "blurry",
        "Your photo may be blurry. Hold your device steady and try again.",
    ),
    (
        "invalid_file_type",
        "This file type is not accepted. Please choose a JPG or PNG file.",
    ),
    (
        "resubmit_failed_image",
        "You already tried this image and it failed. Please add a different image.",
    ),
    (
        "background_encrypted_upload",
        "We couldn't upload your photos. Please try again.",
    ),
    ("retry_submission", "We're verifying your photos. This may take a minute."),
    (
        "network",
        "Something went wrong on our end. Please try submitting again.",
    ),
    ("config", "This page is not set up correctly. Please try again later."),
];

const ES: &[(&str, &str)] = &[
    ("required_value_missing", "Este campo es obligatorio"),
    (
        "upload_form_entry",
        "Hubo un problema con esta imagen. Agregue una imagen diferente.",
    ),
    (
        "upload_form_entries",
        "No pudimos verificar su identificación. Le quedan %{count} intento(s).",
    ),
    (
        "upload_form_entries_final",
        "No pudimos verificar su identificación.",
    ),
    (
        "camera_access_declined",
        "Debe permitir el acceso a la cámara para tomar una foto. Puede subir una foto.",
    ),
    (
        "camera_failed",
        "No pudimos tomar la foto. Inténtelo de nuevo o suba una foto desde su dispositivo.",
    ),
    (
        "capture_retry",
        "Se produjo un error al tomar la foto. Inténtelo de nuevo.",
    ),
    (
        "glare",
        "Detectamos reflejos en su foto. Intente tomar una nueva foto con luz más suave.",
    ),
    (
        "blurry",
        "Es posible que su foto esté borrosa. Mantenga el dispositivo quieto e inténtelo de nuevo.",
    ),
    (
        "invalid_file_type",
        "Este tipo de archivo no es aceptado. Elija un archivo JPG o PNG.",
    ),
    (
        "resubmit_failed_image",
        "Ya intentó con esta imagen y falló. Agregue una imagen diferente.",
    ),
    (
        "background_encrypted_upload",
        "No pudimos subir sus fotos. Inténtelo de nuevo.",
    ),
    (
        "retry_submission",
        "Estamos verificando sus fotos. Esto puede tardar un minuto.",
    ),
    (
        "network",
        "Se produjo un error de nuestra parte. Intente enviar de nuevo.",
    ),
    (
        "config",
        "Esta página no está configurada correctamente. Inténtelo más tarde.",
    ),
];

/// Replace `%{name}` placeholders
pub fn replace_variables(template: &str, variables: &[(&str, String)]) -> String {
    variables
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("%{{{}}}", name), value)
        })
}

/// Catalog key for an error, `None` for opaque errors
pub fn message_key(error: &FlowError) -> Option<&'static str> {
    match error {
        FlowError::RequiredValueMissing => Some("required_value_missing"),
        FlowError::UploadFormEntry { .. } => Some("upload_form_entry"),
        FlowError::UploadFormEntries {
            remaining_attempts: Some(_),
            ..
        } => Some("upload_form_entries"),
        FlowError::UploadFormEntries { .. } => Some("upload_form_entries_final"),
        FlowError::CameraAccessDeclined => Some("camera_access_declined"),
        FlowError::CameraFailed(_) => Some("camera_failed"),
        FlowError::CaptureRetry => Some("capture_retry"),
        FlowError::Glare => Some("glare"),
        FlowError::Blurry => Some("blurry"),
        FlowError::InvalidFileType { .. } => Some("invalid_file_type"),
        FlowError::ResubmitFailedImage => Some("resubmit_failed_image"),
        FlowError::BackgroundEncryptedUpload { .. } => Some("background_encrypted_upload"),
        FlowError::RetrySubmission => Some("retry_submission"),
        FlowError::Network(_) => Some("network"),
        FlowError::Config(_) => Some("config"),
        FlowError::Unknown(_) => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    locale: String,
    entries: BTreeMap<String, String>,
}

impl Default for Messages {
    fn default() -> Self {
        Self::english()
    }
}

impl Messages {
    fn from_table(locale: &str, table: &[(&str, &str)]) -> Self {
        Self {
            locale: locale.to_string(),
            entries: table
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn english() -> Self {
        Self::from_table("en", EN)
    }

    /// Built-in catalog for a locale, `None` when unsupported
    pub fn for_locale(locale: &str) -> Option<Self> {
        match locale {
            "en" => Some(Self::english()),
            "es" => Some(Self::from_table("es", ES)),
            _ => None,
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.entries.extend(overrides);
        self
    }

    /// Apply overrides from a TOML table of `key = "message"` pairs
    pub fn with_toml_overrides(self, contents: &str) -> Result<Self, ConfigError> {
        let overrides: BTreeMap<String, String> = toml::from_str(contents)?;
        for key in overrides.keys() {
            if !self.entries.contains_key(key) {
                return Err(ConfigError::Invalid(format!("Unknown message key: {}", key)));
            }
        }
        Ok(self.with_overrides(overrides))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Message for an error. `None` means nothing should be shown.
    pub fn render(&self, error: &FlowError) -> Option<String> {
        let rendered = match error {
            FlowError::UploadFormEntry { message, .. } if !message.is_empty() => {
                Some(message.clone())
            }
            FlowError::UploadFormEntries {
                remaining_attempts: Some(count),
                ..
            } => self
                .get("upload_form_entries")
                .map(|template| replace_variables(template, &[("count", count.to_string())])),
            other => message_key(other).and_then(|key| self.get(key)).map(str::to_string),
        };

        if rendered.is_none() {
            log::error!("Unhandled error not shown to user: {:?}", error);
        }
        rendered
    }

    /// Render errors: field errors inline, the rest as a single banner.
    pub fn render_step_errors(&self, errors: &[StepError]) -> Vec<ErrorDisplay> {
        let mut displays = Vec::new();
        let mut shown_fields: Vec<&str> = Vec::new();
        let mut has_banner = false;

        for StepError { field, error } in errors {
            let Some(field) = field.as_deref() else {
                continue;
            };
            if shown_fields.contains(&field) {
                continue;
            }
            if let Some(message) = self.render(error) {
                shown_fields.push(field);
                displays.push(ErrorDisplay::Inline {
                    field: field.to_string(),
                    message,
                });
            }
        }

        for StepError { error, .. } in errors.iter().filter(|e| e.field.is_none()) {
            if has_banner {
                break;
            }
            if let FlowError::UploadFormEntry {
                field: Some(field), ..
            } = error
            {
                if shown_fields.contains(&field.as_str()) {
                    continue;
                }
            }
            if let Some(message) = self.render(error) {
                displays.push(ErrorDisplay::Banner { message });
                has_banner = true;
            }
        }

        displays
    }

    /// Render a flow's current errors. Field errors for inputs that are
    /// not on the current step compete for the banner after the step error.
    pub fn render_flow(&self, flow: &FormSteps) -> Vec<ErrorDisplay> {
        let unknown = flow.unknown_field_errors();
        let mut errors: Vec<StepError> = flow
            .active_errors()
            .into_iter()
            .filter(|e| e.field.is_some() && !unknown.contains(e))
            .collect();
        if let Some(error) = flow.step_error() {
            errors.push(StepError::step(error.clone()));
        }
        errors.extend(unknown.into_iter().map(|e| StepError::step(e.error)));

        self.render_step_errors(&errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_variant_renders() {
        let messages = Messages::english();
        let errors = vec![
            FlowError::RequiredValueMissing,
            FlowError::UploadFormEntry {
                field: Some("front".to_string()),
                message: "Image has glare".to_string(),
            },
            FlowError::UploadFormEntry {
                field: Some("back".to_string()),
                message: String::new(),
            },
            FlowError::CameraAccessDeclined,
            FlowError::CameraFailed("Cropping failure".to_string()),
            FlowError::CaptureRetry,
            FlowError::Glare,
            FlowError::Blurry,
            FlowError::InvalidFileType {
                mime_type: "image/gif".to_string(),
            },
            FlowError::ResubmitFailedImage,
            FlowError::BackgroundEncryptedUpload {
                base_field: "back".to_string(),
                fields: vec!["back".to_string()],
            },
            FlowError::RetrySubmission,
            FlowError::Network("Bad Gateway".to_string()),
        ];
        for error in errors {
            let message = messages.render(&error);
            assert!(
                message.as_deref().map(|m| !m.is_empty()).unwrap_or(false),
                "no message for {:?}",
                error
            );
        }
        assert_eq!(messages.render(&FlowError::Unknown("boom".to_string())), None);
    }

    #[test]
    fn test_locales_cover_same_keys() {
        let en = Messages::english();
        let es = Messages::for_locale("es").unwrap();
        assert_eq!(
            en.entries.keys().collect::<Vec<_>>(),
            es.entries.keys().collect::<Vec<_>>()
        );
        assert!(Messages::for_locale("fr").is_none());
    }

    #[test]
    fn test_remaining_attempts_interpolated() {
        let error = FlowError::UploadFormEntries {
            entries: vec![],
            remaining_attempts: Some(2),
            hints: false,
            is_failed_result: false,
            pii: None,
        };
        assert_eq!(
            Messages::english().render(&error).unwrap(),
            "We couldn't verify your ID. You have 2 attempt(s) remaining."
        );
    }

    #[test]
    fn test_no_duplicate_field_messages_and_single_banner() {
        let errors = vec![
            StepError::field("front", FlowError::Glare),
            StepError::field("front", FlowError::RequiredValueMissing),
            StepError::step(FlowError::UploadFormEntry {
                field: Some("front".to_string()),
                message: "Image has glare".to_string(),
            }),
            StepError::step(FlowError::Unknown("opaque".to_string())),
            StepError::step(FlowError::Network("Bad Gateway".to_string())),
            StepError::step(FlowError::CaptureRetry),
        ];
        let displays = Messages::english().render_step_errors(&errors);
        assert_eq!(displays.len(), 2);
        assert!(matches!(&displays[0], ErrorDisplay::Inline { field, .. } if field == "front"));
        assert!(matches!(&displays[1], ErrorDisplay::Banner { message } if message.contains("our end")));
    }

    #[test]
    fn test_toml_overrides() {
        let messages = Messages::english()
            .with_toml_overrides("glare = \"Too shiny\"")
            .unwrap();
        assert_eq!(messages.render(&FlowError::Glare).unwrap(), "Too shiny");
        assert!(Messages::english()
            .with_toml_overrides("nope = \"x\"")
            .is_err());
    }
}
