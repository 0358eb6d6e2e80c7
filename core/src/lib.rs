//! Cold, cancellable JSON request streams over a callback-driven transport.
//!
//! # Overview
//! `ApiClient::request_json` turns one HTTP call into a `SignalProducer`
//! that emits exactly one decoded document followed by completion, or one
//! failure, or an interruption when the call was cancelled. Nothing happens
//! until a subscription starts; every subscription issues its own call, and
//! disposing a subscription cancels the call underneath it.
//!
//! # Design
//! - The transport is a trait (`Transport`) with a completion callback and a
//!   cancellable handle. `UreqTransport` (feature `ureq`, on by default)
//!   runs blocking calls on worker threads; the FFI crate plugs a C host in
//!   through the same trait.
//! - Request encoding lives in `http` as plain data, so every transport
//!   encodes the same way: query string for read-only methods, JSON body
//!   otherwise.
//! - `classify` is a pure function from transport outcome to stream result.
//! - The client is kept alive only while a subscription is in flight
//!   (`SignalProducer::retain_while_working`).
//! - Diagnostics are injected `Logger`s; `TracingLogger` forwards to
//!   `tracing`.

#[cfg(feature = "ureq")]
pub mod blocking;
pub mod classify;
pub mod client;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod lifetime;
pub mod signal;
pub mod transport;
pub mod types;

#[cfg(feature = "ureq")]
pub use blocking::{UreqHandle, UreqTransport};
pub use classify::{classify, classify_for, Classified};
pub use client::ApiClient;
pub use diagnostics::{Diagnostics, Logger, RequestId, TracingLogger};
pub use error::{ApiError, TransportError, TransportErrorKind};
pub use http::{
    EncodedRequest, Headers, HttpMethod, HttpRequest, HttpResponse, ParameterEncoding, Parameters,
};
pub use lifetime::LifetimeToken;
pub use signal::{Disposable, Event, EventStream, Observer, SignalProducer};
pub use transport::{Completion, RequestHandle, Transport, TransportOutcome};
pub use types::{DomainError, ErrorDetail};
