//! Backend Wire Contract
//!
//! JSON bodies exchanged with the regeneration service. The image travels as
//! standard base64 under a single agreed field name; the field is configurable
//! because deployed backends disagree on it (`base64_image` vs `image`).
//! Incoming payloads may carry a `data:<mime>;base64,` prefix, which is stripped.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::canvas::RasterFormat;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response has no string field {0:?}")]
    MissingField(&'static str),
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// JSON field that carries the base64 image in both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadField {
    #[default]
    Base64Image,
    Image,
}

impl PayloadField {
    pub fn key(&self) -> &'static str {
        match self {
            PayloadField::Base64Image => "base64_image",
            PayloadField::Image => "image",
        }
    }
}

/// How outgoing images are written into the request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFormat {
    pub field: PayloadField,
    pub raster: RasterFormat,
    /// Prefix outgoing payloads with `data:<mime>;base64,`
    pub data_uri_prefix: bool,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            field: PayloadField::default(),
            raster: RasterFormat::Png,
            data_uri_prefix: false,
        }
    }
}

/// Body of `GET /update_prompt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
}

/// Build the regeneration request body for an encoded raster
pub fn encode_request(format: &WireFormat, raster: &[u8]) -> serde_json::Value {
    let mut payload = STANDARD.encode(raster);
    if format.data_uri_prefix {
        payload.insert_str(0, &format!("data:{};base64,", format.raster.mime()));
    }
    let mut body = serde_json::Map::new();
    body.insert(format.field.key().to_string(), serde_json::Value::String(payload));
    serde_json::Value::Object(body)
}

/// Extract the encoded raster bytes from a regeneration response body
pub fn decode_response(field: PayloadField, body: &[u8]) -> Result<Vec<u8>, WireError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let payload = value
        .get(field.key())
        .and_then(serde_json::Value::as_str)
        .ok_or(WireError::MissingField(field.key()))?;
    Ok(STANDARD.decode(strip_data_uri(payload).trim())?)
}

/// Drop everything up to and including `base64,` if present
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.find("base64,") {
        Some(index) => &payload[index + "base64,".len()..],
        None => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_configured_field() {
        let body = encode_request(&WireFormat::default(), b"\x89PNG");
        assert_eq!(body, serde_json::json!({ "base64_image": "iVBORw==" }));

        let legacy = WireFormat { field: PayloadField::Image, ..WireFormat::default() };
        let body = encode_request(&legacy, b"\x89PNG");
        assert!(body.get("image").is_some());
        assert!(body.get("base64_image").is_none());
    }

    #[test]
    fn test_request_data_uri_prefix() {
        let format = WireFormat {
            raster: RasterFormat::Jpeg,
            data_uri_prefix: true,
            ..WireFormat::default()
        };
        let body = encode_request(&format, b"abc");
        assert_eq!(body["base64_image"], "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_response_with_and_without_prefix() {
        let plain = br#"{"base64_image":"YWJj"}"#;
        assert_eq!(decode_response(PayloadField::Base64Image, plain).unwrap(), b"abc");

        let prefixed = br#"{"base64_image":"data:image/jpeg;base64,YWJj"}"#;
        assert_eq!(decode_response(PayloadField::Base64Image, prefixed).unwrap(), b"abc");
    }

    #[test]
    fn test_response_errors() {
        assert!(matches!(
            decode_response(PayloadField::Base64Image, b"<html>"),
            Err(WireError::Json(_))
        ));
        assert!(matches!(
            decode_response(PayloadField::Base64Image, br#"{"image":"YWJj"}"#),
            Err(WireError::MissingField("base64_image"))
        ));
        assert!(matches!(
            decode_response(PayloadField::Image, br#"{"image":42}"#),
            Err(WireError::MissingField("image"))
        ));
        assert!(matches!(
            decode_response(PayloadField::Image, br#"{"image":"not base64!"}"#),
            Err(WireError::Base64(_))
        ));
    }

    #[test]
    fn test_prompt_response() {
        let parsed: PromptResponse = serde_json::from_str(r#"{"prompt":"new prompt"}"#).unwrap();
        assert_eq!(parsed.prompt, "new prompt");
    }
}
