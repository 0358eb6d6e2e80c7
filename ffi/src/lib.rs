//! C-ABI wrapper around `yt-engine` where the C host is the transport.
//!
//! # Overview
//! The host registers a `dispatch` callback (and optionally `cancel`) when it
//! creates a client. Each subscription started with `yt_request_json` hands
//! the host one encoded request plus an `FfiCall` token; the host performs
//! the I/O however it likes and reports back with `yt_call_complete` or
//! `yt_call_fail`. Stream events flow to the subscription's event callback.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Completions waiting for the host live in a table keyed by call id.
//!   Whoever removes an entry first, the host's completion or a cancel,
//!   settles the call; the other side finds nothing and does nothing.
//! - The C caller owns all returned pointers and must call the matching
//!   `yt_*_free` function to release them. Request and event structs handed
//!   to callbacks are borrowed for the duration of the callback only.
//! - Event delivery goes through a gate that `yt_subscription_cancel` and
//!   `yt_subscription_free` close. Closing waits for a callback running on
//!   another thread, so once either returns the event context is no longer
//!   touched.

pub mod types;

use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use yt_engine::{
    ApiClient, Completion, Disposable, Headers, HttpRequest, HttpResponse, Logger,
    ParameterEncoding, RequestHandle, TracingLogger, Transport, TransportError,
    TransportOutcome,
};

use types::*;

/// Starts the I/O for one call. `call` must later be passed to exactly one
/// of `yt_call_complete` / `yt_call_fail`; `request` is only valid during
/// the callback.
pub type DispatchFn =
    extern "C" fn(ctx: *mut c_void, call: *mut FfiCall, request: *const FfiHttpRequest);

/// Asks the host to abandon call `call_id`. The call is already settled as
/// cancelled; the host still has to release its `FfiCall`.
pub type CancelFn = extern "C" fn(ctx: *mut c_void, call_id: u64);

/// Receives one stream event, valid only during the callback.
pub type EventFn = extern "C" fn(ctx: *mut c_void, event: *const FfiEvent);

/// An opaque host pointer, passed back verbatim to the host's callbacks.
#[derive(Clone, Copy)]
struct HostContext(*mut c_void);

// The host promises its context may be used from any thread it calls in on.
unsafe impl Send for HostContext {}
unsafe impl Sync for HostContext {}

impl HostContext {
    fn get(self) -> *mut c_void {
        self.0
    }
}

struct HostShared {
    dispatch: DispatchFn,
    cancel: Option<CancelFn>,
    ctx: HostContext,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Completion>>,
}

impl HostShared {
    fn take(&self, id: u64) -> Option<Completion> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}

/// `Transport` implemented by C callbacks.
pub struct HostTransport {
    shared: Arc<HostShared>,
}

/// Token for one dispatched call, owned by the host until it completes.
pub struct FfiCall {
    id: u64,
    shared: Arc<HostShared>,
}

pub struct HostHandle {
    id: u64,
    shared: Arc<HostShared>,
}

impl RequestHandle for HostHandle {
    fn cancel(&self) {
        let Some(on_complete) = self.shared.take(self.id) else {
            return;
        };
        if let Some(cancel) = self.shared.cancel {
            cancel(self.shared.ctx.get(), self.id);
        }
        on_complete(TransportOutcome::failed(TransportError::cancelled()));
    }
}

impl Transport for HostTransport {
    type Handle = HostHandle;

    fn request(
        &self,
        request: &HttpRequest,
        encoding: ParameterEncoding,
        on_complete: Completion,
    ) -> HostHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = HostHandle {
            id,
            shared: Arc::clone(&self.shared),
        };

        let encoded = match request.encode(encoding) {
            Ok(encoded) => encoded,
            Err(err) => {
                on_complete(TransportOutcome::failed(err));
                return handle;
            }
        };

        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, on_complete);

        let call = Box::into_raw(Box::new(FfiCall {
            id,
            shared: Arc::clone(&self.shared),
        }));
        let ffi_request = FfiHttpRequest::from_encoded(encoded);
        (self.shared.dispatch)(self.shared.ctx.get(), call, ffi_request);
        unsafe { FfiHttpRequest::free(ffi_request) };

        handle
    }
}

thread_local! {
    /// Set while an event callback runs on this thread.
    static IN_EVENT_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// The host's event callback, until the subscription is cancelled.
struct EventGate {
    on_event: EventFn,
    ctx: HostContext,
    closed: AtomicBool,
    delivering: Mutex<()>,
}

impl EventGate {
    fn deliver(&self, event: &FfiEvent) {
        let _delivering = self.delivering.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let outer = IN_EVENT_CALLBACK.with(|flag| flag.replace(true));
        (self.on_event)(self.ctx.get(), event);
        IN_EVENT_CALLBACK.with(|flag| flag.set(outer));
    }

    /// Stop delivery. Returns once no callback runs on another thread; from
    /// inside a callback it cannot wait for that callback and returns at once.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if !IN_EVENT_CALLBACK.with(Cell::get) {
            drop(self.delivering.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }
}

/// Opaque handle to one running subscription.
pub struct FfiSubscription {
    disposable: Disposable,
    events: Arc<EventGate>,
}

impl FfiSubscription {
    fn cancel(&self) {
        self.disposable.dispose();
        self.events.close();
    }
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client bound to `base_url` whose requests are executed by the
/// host through `dispatch`.
///
/// Returns null if `base_url` or `dispatch` is null, if `base_url` is not
/// UTF-8, or if an internal panic occurs. The caller must free the returned pointer with `yt_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn yt_client_new(
    base_url: *const c_char,
    dispatch: Option<DispatchFn>,
    cancel: Option<CancelFn>,
    ctx: *mut c_void,
) -> *mut FfiClient {
    catch_unwind(AssertUnwindSafe(|| {
        let Some(dispatch) = dispatch else {
            return std::ptr::null_mut();
        };
        if base_url.is_null() {
            return std::ptr::null_mut();
        }
        let Ok(url) = unsafe { CStr::from_ptr(base_url) }.to_str() else {
            return std::ptr::null_mut();
        };
        let transport = HostTransport {
            shared: Arc::new(HostShared {
                dispatch,
                cancel,
                ctx: HostContext(ctx),
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
            }),
        };
        let client = ApiClient::new(url, transport);
        Box::into_raw(Box::new(FfiClient {
            inner: Arc::new(client),
        }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `yt_client_new`. Safe to call with null.
///
/// Subscriptions still in flight keep the client alive until they finish.
#[unsafe(no_mangle)]
pub extern "C" fn yt_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Read an optional JSON object argument. Null means absent.
fn json_object(raw: *const c_char) -> Result<Option<serde_json::Map<String, Value>>, ()> {
    if raw.is_null() {
        return Ok(None);
    }
    let text = unsafe { CStr::from_ptr(raw) }.to_str().map_err(|_| ())?;
    match serde_json::from_str(text).map_err(|_| ())? {
        Value::Object(map) => Ok(Some(map)),
        _ => Err(()),
    }
}

fn headers_from(map: serde_json::Map<String, Value>) -> Result<Headers, ()> {
    map.into_iter()
        .map(|(name, value)| match value {
            Value::String(value) => Ok((name, value)),
            _ => Err(()),
        })
        .collect()
}

/// Start a JSON request stream.
///
/// `method` is an `FfiHttpMethod` value. `url` is absolute or relative to
/// the client's base URL. `parameters_json` and `headers_json` are optional
/// JSON objects (headers must map to strings). Events are delivered to
/// `on_event` with `event_ctx`, possibly before this function returns. When
/// `log` is true, diagnostics go to `tracing`.
///
/// `event_ctx` must stay valid until the terminal event callback has
/// returned, or until `yt_subscription_cancel` / `yt_subscription_free`
/// returns, whichever comes first. An event callback may cancel or free its
/// own subscription.
///
/// Returns null on a null or malformed argument. The caller must free the
/// returned pointer with `yt_subscription_free`.
#[unsafe(no_mangle)]
pub extern "C" fn yt_request_json(
    client: *const FfiClient,
    method: u32,
    url: *const c_char,
    parameters_json: *const c_char,
    headers_json: *const c_char,
    on_event: Option<EventFn>,
    event_ctx: *mut c_void,
    log: bool,
) -> *mut FfiSubscription {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || url.is_null() {
            return std::ptr::null_mut();
        }
        let (Some(method), Some(on_event)) = (method_from_raw(method), on_event) else {
            return std::ptr::null_mut();
        };
        let Ok(url) = unsafe { CStr::from_ptr(url) }.to_str() else {
            return std::ptr::null_mut();
        };
        let Ok(parameters) = json_object(parameters_json) else {
            return std::ptr::null_mut();
        };
        let headers = match json_object(headers_json).and_then(|h| h.map(headers_from).transpose()) {
            Ok(headers) => headers,
            Err(()) => return std::ptr::null_mut(),
        };

        let mut request = HttpRequest::new(method, url);
        request.parameters = parameters;
        request.headers = headers;

        let logger: Option<Arc<dyn Logger>> = if log {
            Some(Arc::new(TracingLogger))
        } else {
            None
        };
        let client = unsafe { &*client };
        let events = Arc::new(EventGate {
            on_event,
            ctx: HostContext(event_ctx),
            closed: AtomicBool::new(false),
            delivering: Mutex::new(()),
        });
        let gate = Arc::clone(&events);
        let disposable = client
            .inner
            .request_json(request, logger)
            .start(move |event| {
                let event = OwnedEvent::from_core(event);
                gate.deliver(&event.as_ffi());
            });
        Box::into_raw(Box::new(FfiSubscription { disposable, events }))
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Cancel a subscription. No events are delivered once this returns. Safe to
/// call with null and more than once.
#[unsafe(no_mangle)]
pub extern "C" fn yt_subscription_cancel(subscription: *const FfiSubscription) {
    if !subscription.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            unsafe { &*subscription }.cancel();
        }));
    }
}

/// Cancel (if still running) and free a subscription. Safe to call with
/// null.
#[unsafe(no_mangle)]
pub extern "C" fn yt_subscription_free(subscription: *mut FfiSubscription) {
    if !subscription.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let subscription = unsafe { Box::from_raw(subscription) };
            subscription.cancel();
        }));
    }
}

// ---------------------------------------------------------------------------
// Host completion
// ---------------------------------------------------------------------------

/// The id the host saw in `cancel` callbacks for this call. Returns 0 for
/// null.
#[unsafe(no_mangle)]
pub extern "C" fn yt_call_id(call: *const FfiCall) -> u64 {
    if call.is_null() {
        return 0;
    }
    unsafe { &*call }.id
}

/// Copy host-owned headers. Entries with a null key are skipped; a null
/// value reads as empty.
fn headers_from_raw(headers: *const FfiHeader, headers_len: u32) -> Vec<(String, String)> {
    if headers.is_null() || headers_len == 0 {
        return Vec::new();
    }
    let text = |ptr: *const c_char| {
        if ptr.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        }
    };
    unsafe { std::slice::from_raw_parts(headers, headers_len as usize) }
        .iter()
        .filter(|header| !header.key.is_null())
        .map(|header| (text(header.key), text(header.value)))
        .collect()
}

/// Complete `call` with an HTTP response and free it. `headers` may be null
/// when `headers_len` is 0, `body` likewise when `body_len` is 0. Both are
/// copied before this returns. A call that was cancelled meanwhile is just
/// freed.
#[unsafe(no_mangle)]
pub extern "C" fn yt_call_complete(
    call: *mut FfiCall,
    status: u16,
    headers: *const FfiHeader,
    headers_len: u32,
    body: *const u8,
    body_len: usize,
) {
    if call.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let call = unsafe { Box::from_raw(call) };
        let body = if body.is_null() || body_len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(body, body_len) }.to_vec()
        };
        let response = HttpResponse {
            status,
            headers: headers_from_raw(headers, headers_len),
            body,
        };
        if let Some(on_complete) = call.shared.take(call.id) {
            on_complete(TransportOutcome::Response(response));
        }
    }));
}

/// Fail `call` with an `FfiTransportErrorKind` value and an optional
/// message, and free it. Failing with `Cancelled` interrupts the stream.
#[unsafe(no_mangle)]
pub extern "C" fn yt_call_fail(call: *mut FfiCall, kind: u32, message: *const c_char) {
    if call.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let call = unsafe { Box::from_raw(call) };
        let message = if message.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
        };
        let error = TransportError::new(transport_kind_from_raw(kind), message);
        if let Some(on_complete) = call.shared.take(call.id) {
            on_complete(TransportOutcome::failed(error));
        }
    }));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
