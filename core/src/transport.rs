//! The callback-driven transport seam.
//!
//! # Design
//! A transport receives a request descriptor, starts the I/O however it
//! likes, and returns a cancellable handle at once. Exactly one completion
//! fires per call, from whatever context the transport completes on, unless
//! the transport decides a cancellation won the race, in which case the
//! completion carries `TransportErrorKind::Cancelled`. The stream adapter
//! trusts that arbitration and adds no locking of its own around it.

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse, ParameterEncoding};

/// The terminal callback of a transport call. Called at most once.
pub type Completion = Box<dyn FnOnce(TransportOutcome) + Send + 'static>;

/// How a transport call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    /// A response arrived, whatever its status code.
    Response(HttpResponse),
    /// No usable response. `response` carries the status line and body when
    /// the failure happened after the server answered.
    Failed {
        error: TransportError,
        response: Option<HttpResponse>,
    },
}

impl TransportOutcome {
    pub fn failed(error: TransportError) -> Self {
        TransportOutcome::Failed {
            error,
            response: None,
        }
    }

    /// The server's response, if one was received.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            TransportOutcome::Response(response) => Some(response),
            TransportOutcome::Failed { response, .. } => response.as_ref(),
        }
    }
}

/// An in-flight call.
pub trait RequestHandle: Send + 'static {
    /// Ask the transport to stop. The transport still fires the completion,
    /// normally with a cancelled error, unless the call already finished.
    fn cancel(&self);
}

/// Issues HTTP calls and reports back through a completion callback.
pub trait Transport: Send + Sync + 'static {
    type Handle: RequestHandle;

    /// Start `request` with `encoding` applied. Network I/O begins before
    /// this returns; `on_complete` may even run before it returns.
    fn request(
        &self,
        request: &HttpRequest,
        encoding: ParameterEncoding,
        on_complete: Completion,
    ) -> Self::Handle;
}
