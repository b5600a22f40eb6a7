//! Field input normalization
//!
//! A field value can come from the capture device (a cropped JPEG) or from a
//! manually selected file. Both are normalized into a [`MediaValue`] holding
//! a data URL, plus [`ImageMetadata`] describing where the image came from.

use crate::errors::{FlowError, FlowResult};
use crate::quality::CropResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// How an image entered the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Capture,
    Upload,
}

/// Binary payload carried as a data URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaValue {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Value held by one form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Media(MediaValue),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    /// Empty values fail the built-in required check.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Media(media) => media.data.is_empty(),
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::Bool(value) => !value,
        }
    }

    pub fn as_media(&self) -> Option<&MediaValue> {
        match self {
            FieldValue::Media(media) => Some(media),
            _ => None,
        }
    }

    /// Form-encoded representation used by the foreground submission
    pub fn to_form_string(&self) -> String {
        match self {
            FieldValue::Media(media) => media.data.clone(),
            FieldValue::Text(text) => text.clone(),
            FieldValue::Bool(value) => value.to_string(),
        }
    }
}

impl From<MediaValue> for FieldValue {
    fn from(media: MediaValue) -> Self {
        FieldValue::Media(media)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        FieldValue::Text(text.to_string())
    }
}

/// Metadata derived from an image, reported with the "image added" event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: Option<String>,
    pub source: ImageSource,
    pub attempt: u32,
    pub size: usize,
}

/// Accept-token matcher, `image/*` style wildcard or exact `type/subtype`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptPattern {
    TopLevel(String),
    Exact(String),
}

impl AcceptPattern {
    pub fn matches(&self, mime_type: &str) -> bool {
        match self {
            AcceptPattern::TopLevel(top) => mime_type
                .split_once('/')
                .map(|(t, sub)| t == top && !sub.is_empty())
                .unwrap_or(false),
            AcceptPattern::Exact(exact) => exact == mime_type,
        }
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse one accept token. Returns `None` for tokens that cannot be matched.
pub fn accept_pattern(accept: &str) -> Option<AcceptPattern> {
    match accept {
        "audio/*" | "video/*" | "image/*" => {
            let (top, _) = accept.split_once('/')?;
            Some(AcceptPattern::TopLevel(top.to_string()))
        }
        _ => {
            let (top, sub) = accept.split_once('/')?;
            if is_token(top) && is_token(sub) {
                Some(AcceptPattern::Exact(accept.to_string()))
            } else {
                None
            }
        }
    }
}

/// True if the MIME type satisfies any accept token, or if `accept` is empty.
pub fn is_valid_for_accepts(mime_type: &str, accept: &[String]) -> bool {
    accept.is_empty()
        || accept
            .iter()
            .filter_map(|token| accept_pattern(token))
            .any(|pattern| pattern.matches(mime_type))
}

pub fn is_image_data_url(data: &str) -> bool {
    data.starts_with("data:image/")
}

/// Bytes represented by a base64 string, padding excluded
pub fn decoded_base64_byte_size(data: &str) -> usize {
    let padding = data.bytes().rev().take_while(|b| *b == b'=').count();
    (data.len() * 3 / 4).saturating_sub(padding)
}

pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Decode a base64 data URL into raw bytes
pub fn data_url_bytes(data_url: &str) -> FlowResult<Vec<u8>> {
    let (header, payload) = data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| FlowError::Unknown("value is not a data URL".to_string()))?;

    if !header.ends_with(";base64") {
        return Ok(payload.as_bytes().to_vec());
    }

    STANDARD
        .decode(payload)
        .map_err(|e| FlowError::Unknown(format!("invalid base64 payload: {}", e)))
}

/// Best-effort dimension probe; unknown formats yield `(None, None)`.
pub fn image_dimensions(bytes: &[u8]) -> (Option<u32>, Option<u32>) {
    let reader = match image::ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(reader) => reader,
        Err(_) => return (None, None),
    };
    match reader.into_dimensions() {
        Ok((width, height)) => (Some(width), Some(height)),
        Err(e) => {
            log::debug!("Could not determine image dimensions: {}", e);
            (None, None)
        }
    }
}

/// Normalize a cropped capture into a field value. The device encodes JPEG.
pub fn from_capture(crop: &CropResult, attempt: u32) -> (MediaValue, ImageMetadata) {
    let media = MediaValue {
        data: format!("data:image/jpeg;base64,{}", crop.image.data),
        name: None,
    };
    let metadata = ImageMetadata {
        width: Some(crop.image.width),
        height: Some(crop.image.height),
        mime_type: Some("image/jpeg".to_string()),
        source: ImageSource::Capture,
        attempt,
        size: decoded_base64_byte_size(&crop.image.data),
    };
    (media, metadata)
}

/// Normalize a manually selected file. The MIME type is checked first and a
/// disallowed type is rejected before any quality assessment happens.
pub fn from_upload(
    name: &str,
    mime_type: &str,
    bytes: &[u8],
    accept: &[String],
    attempt: u32,
) -> FlowResult<(MediaValue, ImageMetadata)> {
    if !is_valid_for_accepts(mime_type, accept) {
        log::info!("Rejected upload {} with type {}", name, mime_type);
        return Err(FlowError::InvalidFileType {
            mime_type: mime_type.to_string(),
        });
    }

    let (width, height) = if mime_type.starts_with("image/") {
        image_dimensions(bytes)
    } else {
        (None, None)
    };

    let media = MediaValue {
        data: to_data_url(mime_type, bytes),
        name: Some(name.to_string()),
    };
    let metadata = ImageMetadata {
        width,
        height,
        mime_type: Some(mime_type.to_string()),
        source: ImageSource::Upload,
        attempt,
        size: bytes.len(),
    };
    Ok((media, metadata))
}
