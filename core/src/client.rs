//! JSON request streams bound to a transport.
//!
//! # Design
//! `ApiClient` holds a base URL and a transport and carries no per-request
//! state. `request_json` returns a cold producer: nothing is logged or sent
//! until a subscription starts, and every subscription issues its own call.
//! The producer keeps only a `Weak` reference to the client; the client is
//! held strongly from subscription until the call terminates.
//!
//! Each subscription runs a small state machine, `Idle -> Dispatched ->
//! Terminated`, stored in one atomic. Whoever moves it to `Terminated`
//! first, the completion callback or the caller's disposal, decides how the
//! call ends. Disposal that wins cancels the transport call; a completion
//! that arrives afterwards is logged and otherwise ignored.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::classify::{classify_for, Classified};
use crate::diagnostics::{Diagnostics, Logger, RequestId};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, Parameters};
use crate::signal::{Disposable, Observer, SignalProducer};
use crate::transport::{Completion, RequestHandle, Transport};

/// Client for a JSON API reached through transport `T`.
#[derive(Debug)]
pub struct ApiClient<T> {
    base_url: String,
    transport: T,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve `url` against the base URL. Absolute `http(s)` URLs are
    /// returned unchanged.
    pub fn url_for(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") || self.base_url.is_empty() {
            return url.to_string();
        }
        format!("{}/{}", self.base_url, url.trim_start_matches('/'))
    }

    /// A cold stream of one decoded JSON document for `request`.
    ///
    /// A subscription ends with exactly one of: a value then completion,
    /// a failure, or an interruption when the transport reports the call as
    /// cancelled. Disposing the subscription cancels the call and no further
    /// events are delivered.
    pub fn request_json(
        self: &Arc<Self>,
        request: HttpRequest,
        logger: Option<Arc<dyn Logger>>,
    ) -> SignalProducer<Value, ApiError> {
        self.request_with_diagnostics(request, Diagnostics::from(logger))
    }

    /// Like `request_json`, notifying every logger in `diagnostics`.
    pub fn request_with_diagnostics(
        self: &Arc<Self>,
        mut request: HttpRequest,
        diagnostics: Diagnostics,
    ) -> SignalProducer<Value, ApiError> {
        request.url = self.url_for(&request.url);
        let client = Arc::downgrade(self);

        SignalProducer::new(move |observer, disposable| {
            let Some(client) = client.upgrade() else {
                observer.send_interrupted();
                return;
            };
            client.dispatch(&request, &diagnostics, observer, disposable);
        })
        .retain_while_working(Arc::downgrade(self))
    }

    pub fn get_json(
        self: &Arc<Self>,
        url: &str,
        parameters: Option<Parameters>,
        logger: Option<Arc<dyn Logger>>,
    ) -> SignalProducer<Value, ApiError> {
        self.request_json(with_parameters(HttpRequest::get(url), parameters), logger)
    }

    pub fn post_json(
        self: &Arc<Self>,
        url: &str,
        parameters: Option<Parameters>,
        logger: Option<Arc<dyn Logger>>,
    ) -> SignalProducer<Value, ApiError> {
        self.request_json(with_parameters(HttpRequest::post(url), parameters), logger)
    }

    pub fn delete_json(
        self: &Arc<Self>,
        url: &str,
        parameters: Option<Parameters>,
        logger: Option<Arc<dyn Logger>>,
    ) -> SignalProducer<Value, ApiError> {
        let request = HttpRequest::new(HttpMethod::Delete, url);
        self.request_json(with_parameters(request, parameters), logger)
    }

    fn dispatch(
        &self,
        request: &HttpRequest,
        diagnostics: &Diagnostics,
        observer: Observer<Value, ApiError>,
        disposable: &Disposable,
    ) {
        let id = RequestId::new();
        let method = request.method;
        let phase = Arc::new(CallPhase::default());
        diagnostics.request(id, request);

        let on_complete: Completion = {
            let phase = Arc::clone(&phase);
            let diagnostics = diagnostics.clone();
            Box::new(move |outcome| {
                let live = phase.terminate();
                if let Some(response) = outcome.response() {
                    diagnostics.response(id, response);
                }
                if !live {
                    tracing::trace!(request_id = %id, "completion after disposal ignored");
                    return;
                }
                match classify_for(method, outcome) {
                    Classified::Value(document) => {
                        observer.send_value(document);
                        observer.send_completed();
                    }
                    Classified::Failed(error) => {
                        diagnostics.error(id, &error);
                        observer.send_failed(error);
                    }
                    Classified::Cancelled => observer.send_interrupted(),
                }
            })
        };

        let handle = self
            .transport
            .request(request, request.method.encoding(), on_complete);
        phase.dispatched();

        disposable.add(move || {
            if phase.terminate() {
                tracing::trace!(request_id = %id, "cancelling in-flight request");
                handle.cancel();
            }
            drop(handle);
        });
    }
}

fn with_parameters(request: HttpRequest, parameters: Option<Parameters>) -> HttpRequest {
    match parameters {
        Some(parameters) => request.with_parameters(parameters),
        None => request,
    }
}

const IDLE: u8 = 0;
const DISPATCHED: u8 = 1;
const TERMINATED: u8 = 2;

/// Lifecycle of one subscription's transport call.
#[derive(Debug)]
struct CallPhase(AtomicU8);

impl Default for CallPhase {
    fn default() -> Self {
        Self(AtomicU8::new(IDLE))
    }
}

impl CallPhase {
    /// `Idle -> Dispatched`. A call that already terminated stays terminated.
    fn dispatched(&self) {
        let _ = self
            .0
            .compare_exchange(IDLE, DISPATCHED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Move to `Terminated`. True only for the caller that made the move.
    fn terminate(&self) -> bool {
        self.0.swap(TERMINATED, Ordering::AcqRel) != TERMINATED
    }
}
