//! Diagnostic hooks around each request.
//!
//! # Design
//! Logging is an injected capability. Callers hand in zero or more `Logger`
//! implementations; `Diagnostics` fans each notification out to all of them
//! and an empty set simply does nothing, so the request path never branches
//! on "is there a logger". Every call is isolated with `catch_unwind`: a
//! logger cannot fail a request or change what the subscriber sees.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};

/// Correlates the notifications of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Receives request diagnostics. All methods default to doing nothing.
///
/// Implementations must be quick; they run on the subscribing thread and on
/// the transport's completion thread.
pub trait Logger: Send + Sync {
    /// Called before the request is handed to the transport.
    fn log_request(&self, id: RequestId, request: &HttpRequest) {
        let _ = (id, request);
    }

    /// Called when the transport delivered a response, whatever the outcome.
    fn log_response(&self, id: RequestId, response: &HttpResponse) {
        let _ = (id, response);
    }

    /// Called when the subscription fails.
    fn log_error(&self, id: RequestId, error: &ApiError) {
        let _ = (id, error);
    }
}

/// A set of loggers notified together.
#[derive(Clone, Default)]
pub struct Diagnostics {
    loggers: Vec<Arc<dyn Logger>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, logger: Arc<dyn Logger>) -> Self {
        self.loggers.push(logger);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }

    pub fn request(&self, id: RequestId, request: &HttpRequest) {
        self.each(|logger| logger.log_request(id, request));
    }

    pub fn response(&self, id: RequestId, response: &HttpResponse) {
        self.each(|logger| logger.log_response(id, response));
    }

    pub fn error(&self, id: RequestId, error: &ApiError) {
        self.each(|logger| logger.log_error(id, error));
    }

    fn each(&self, notify: impl Fn(&dyn Logger)) {
        for logger in &self.loggers {
            if catch_unwind(AssertUnwindSafe(|| notify(logger.as_ref()))).is_err() {
                tracing::warn!("diagnostic logger panicked; notification dropped");
            }
        }
    }
}

impl From<Option<Arc<dyn Logger>>> for Diagnostics {
    fn from(logger: Option<Arc<dyn Logger>>) -> Self {
        Self {
            loggers: logger.into_iter().collect(),
        }
    }
}

impl From<Arc<dyn Logger>> for Diagnostics {
    fn from(logger: Arc<dyn Logger>) -> Self {
        Self::new().with(logger)
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("loggers", &self.loggers.len())
            .finish()
    }
}

const BODY_PREVIEW_CHARS: usize = 512;

/// Emits diagnostics as `tracing` events: requests and responses at
/// `debug`, failures at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log_request(&self, id: RequestId, request: &HttpRequest) {
        tracing::debug!(
            request_id = %id,
            method = %request.method,
            url = %request.url,
            parameters = ?request.parameters,
            "request issued"
        );
    }

    fn log_response(&self, id: RequestId, response: &HttpResponse) {
        let preview: String = response.body_text().chars().take(BODY_PREVIEW_CHARS).collect();
        tracing::debug!(
            request_id = %id,
            status = response.status,
            bytes = response.body.len(),
            body = %preview,
            "response received"
        );
    }

    fn log_error(&self, id: RequestId, error: &ApiError) {
        tracing::warn!(
            request_id = %id,
            domain = error.domain(),
            code = error.code(),
            %error,
            "request failed"
        );
    }
}
