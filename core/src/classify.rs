//! Mapping a transport outcome to what a subscriber sees.

use serde_json::Value;

use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::transport::TransportOutcome;
use crate::types::DomainError;

/// The single result of one transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// A decoded document, to be sent as a value followed by completion.
    Value(Value),
    Failed(ApiError),
    /// The transport reported the call as cancelled.
    Cancelled,
}

/// Classify `outcome`.
///
/// Checks run in a fixed order: cancellation, transport failure, empty
/// `204` answer, JSON parse failure, embedded API error, success. Any HTTP
/// status other than `204` goes through the same JSON path; the status code
/// alone never makes a failure.
pub fn classify(outcome: TransportOutcome) -> Classified {
    let response = match outcome {
        TransportOutcome::Failed { error, .. } if error.is_cancelled() => {
            return Classified::Cancelled;
        }
        TransportOutcome::Failed { error, .. } => {
            return Classified::Failed(ApiError::Transport(error));
        }
        TransportOutcome::Response(response) => response,
    };

    if response.status == 204 {
        return Classified::Value(Value::Null);
    }

    let document: Value = match serde_json::from_slice(&response.body) {
        Ok(document) => document,
        Err(_) => return Classified::Failed(ApiError::Decode),
    };

    match DomainError::from_document(&document) {
        Some(error) => Classified::Failed(ApiError::Domain(error)),
        None => Classified::Value(document),
    }
}

/// Classify the outcome of a `method` call.
///
/// A `HEAD` answer never has a body, so an empty one is a `null` document
/// like a `204`. Every other case is plain `classify`.
pub fn classify_for(method: HttpMethod, outcome: TransportOutcome) -> Classified {
    match &outcome {
        TransportOutcome::Response(response)
            if method == HttpMethod::Head && response.body.is_empty() =>
        {
            Classified::Value(Value::Null)
        }
        _ => classify(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransportError, TransportErrorKind};
    use crate::http::HttpResponse;
    use serde_json::json;

    fn respond(status: u16, body: &str) -> Classified {
        classify(TransportOutcome::Response(HttpResponse::new(status, body)))
    }

    #[test]
    fn document_without_error_is_a_value() {
        let classified = respond(200, r#"{"items":[{"id":"abc"}]}"#);
        assert_eq!(classified, Classified::Value(json!({"items": [{"id": "abc"}]})));
    }

    #[test]
    fn scalar_documents_are_values() {
        assert_eq!(respond(200, "42"), Classified::Value(json!(42)));
        assert_eq!(respond(200, "null"), Classified::Value(Value::Null));
    }

    #[test]
    fn embedded_error_fails_whatever_the_status() {
        for status in [200, 403] {
            let Classified::Failed(ApiError::Domain(err)) =
                respond(status, r#"{"error":{"code":403}}"#)
            else {
                panic!("expected a domain failure for status {status}");
            };
            assert_eq!(err.code, 403);
        }
    }

    #[test]
    fn unparsable_bodies_all_map_to_decode() {
        for body in ["", "<html>", "{\"items\": [", "WEBVTT\n\n00:00.000 --> 00:01.000\nhi"] {
            assert_eq!(respond(200, body), Classified::Failed(ApiError::Decode), "{body:?}");
        }
        assert_eq!(respond(500, "Internal Server Error"), Classified::Failed(ApiError::Decode));
    }

    #[test]
    fn no_content_is_a_null_value() {
        assert_eq!(respond(204, ""), Classified::Value(Value::Null));
    }

    #[test]
    fn empty_head_answer_is_a_null_value() {
        let head = |status, body: &str| {
            classify_for(
                HttpMethod::Head,
                TransportOutcome::Response(HttpResponse::new(status, body)),
            )
        };
        assert_eq!(head(200, ""), Classified::Value(Value::Null));
        assert_eq!(head(404, ""), Classified::Value(Value::Null));
        assert_eq!(head(200, "{\"n\":1}"), Classified::Value(json!({"n": 1})));

        let get = classify_for(
            HttpMethod::Get,
            TransportOutcome::Response(HttpResponse::new(200, "")),
        );
        assert_eq!(get, Classified::Failed(ApiError::Decode));
        assert_eq!(
            classify_for(HttpMethod::Head, TransportOutcome::failed(TransportError::cancelled())),
            Classified::Cancelled
        );
    }

    #[test]
    fn cancellation_is_not_a_failure() {
        let classified = classify(TransportOutcome::failed(TransportError::cancelled()));
        assert_eq!(classified, Classified::Cancelled);
    }

    #[test]
    fn transport_errors_pass_through_unchanged() {
        let error = TransportError::new(TransportErrorKind::TimedOut, "read timed out");
        let outcome = TransportOutcome::Failed {
            error: error.clone(),
            response: Some(HttpResponse::new(200, "{}")),
        };
        assert_eq!(classify(outcome), Classified::Failed(ApiError::Transport(error)));
    }
}
