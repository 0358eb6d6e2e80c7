//! The API's error envelope.
//!
//! # Design
//! The video API reports failures with a document of the form
//! `{"error": {"code": 403, "message": "...", "errors": [{"domain": ...,
//! "reason": ..., "message": ...}]}}`, usually with a 4xx status but not
//! always. OAuth endpoints use the flat `{"error": "invalid_grant",
//! "error_description": "..."}` form instead. Extraction is lenient: a
//! present, non-null `error` member is always an error, whatever its shape,
//! and missing fields fall back to defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the envelope's `errors` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorDetail {
    pub domain: String,
    pub reason: String,
    pub message: String,
}

/// An error the API embedded in a response document.
#[derive(thiserror::Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("API error {code}: {message}")]
pub struct DomainError {
    pub code: i64,
    pub message: String,
    pub errors: Vec<ErrorDetail>,
}

impl DomainError {
    /// Extract the embedded error, if the document carries one.
    pub fn from_document(document: &Value) -> Option<Self> {
        let marker = document.get("error")?;
        match marker {
            Value::Null => None,
            Value::Object(_) => Some(Self {
                code: marker.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: marker
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                errors: marker
                    .get("errors")
                    .cloned()
                    .and_then(|errors| serde_json::from_value(errors).ok())
                    .unwrap_or_default(),
            }),
            Value::String(reason) => {
                let message = document
                    .get("error_description")
                    .and_then(Value::as_str)
                    .unwrap_or(reason.as_str())
                    .to_string();
                Some(Self {
                    code: 0,
                    message: message.clone(),
                    errors: vec![ErrorDetail {
                        domain: String::new(),
                        reason: reason.clone(),
                        message,
                    }],
                })
            }
            other => Some(Self {
                code: 0,
                message: other.to_string(),
                errors: Vec::new(),
            }),
        }
    }

    /// Reason of the first detail, e.g. `quotaExceeded`.
    pub fn reason(&self) -> Option<&str> {
        self.errors.first().map(|detail| detail.reason.as_str())
    }
}
