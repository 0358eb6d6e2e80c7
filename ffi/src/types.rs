//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type but uses C-compatible representations:
//! `*mut c_char` instead of `String`, raw pointers instead of `Vec`, and
//! enums with explicit discriminants. Numeric inputs from C arrive as plain
//! integers and are mapped here, so an out-of-range value is rejected
//! instead of becoming an invalid enum. Conversion functions live here to
//! keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Arc;

use yt_engine::{ApiClient, ApiError, EncodedRequest, Event, HttpMethod, TransportErrorKind};

use crate::HostTransport;

/// Opaque handle to a client. C callers receive a pointer to this and pass
/// it back into every FFI function.
pub struct FfiClient {
    pub(crate) inner: Arc<ApiClient<HostTransport>>,
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// HTTP method as a C enum. `yt_request_json` takes the same values as a
/// plain integer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Head = 1,
    Options = 2,
    Post = 3,
    Put = 4,
    Patch = 5,
    Delete = 6,
}

impl From<HttpMethod> for FfiHttpMethod {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => FfiHttpMethod::Get,
            HttpMethod::Head => FfiHttpMethod::Head,
            HttpMethod::Options => FfiHttpMethod::Options,
            HttpMethod::Post => FfiHttpMethod::Post,
            HttpMethod::Put => FfiHttpMethod::Put,
            HttpMethod::Patch => FfiHttpMethod::Patch,
            HttpMethod::Delete => FfiHttpMethod::Delete,
        }
    }
}

/// Map a raw `FfiHttpMethod` discriminant to a core method.
pub(crate) fn method_from_raw(raw: u32) -> Option<HttpMethod> {
    let method = match raw {
        0 => HttpMethod::Get,
        1 => HttpMethod::Head,
        2 => HttpMethod::Options,
        3 => HttpMethod::Post,
        4 => HttpMethod::Put,
        5 => HttpMethod::Patch,
        6 => HttpMethod::Delete,
        _ => return None,
    };
    Some(method)
}

/// A single HTTP header as a key-value pair of C strings.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// A request the host must execute, already encoded: the query is part of
/// `url` and `body` (null when absent) is the serialized JSON body.
///
/// Borrowed by the host for the duration of the `dispatch` callback only.
#[repr(C)]
pub struct FfiHttpRequest {
    pub method: FfiHttpMethod,
    pub url: *mut c_char,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut c_char,
}

/// Strings crossing the boundary cannot hold interior NULs; such values are
/// truncated to empty rather than failing the request.
pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> CString {
    CString::new(s).unwrap_or_default()
}

impl FfiHttpRequest {
    /// Convert a core `EncodedRequest` into a heap-allocated `FfiHttpRequest`.
    pub(crate) fn from_encoded(req: EncodedRequest) -> *mut Self {
        let url = c_string(req.url).into_raw();
        let body = match req.body {
            Some(b) => c_string(b).into_raw(),
            None => std::ptr::null_mut(),
        };

        let headers_len = req.headers.len() as u32;
        let headers = if req.headers.is_empty() {
            std::ptr::null_mut()
        } else {
            let ffi_headers: Box<[FfiHeader]> = req
                .headers
                .into_iter()
                .map(|(k, v)| FfiHeader {
                    key: c_string(k).into_raw(),
                    value: c_string(v).into_raw(),
                })
                .collect();
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        Box::into_raw(Box::new(FfiHttpRequest {
            method: req.method.into(),
            url,
            headers,
            headers_len,
            body,
        }))
    }

    /// Free a request built by `from_encoded`.
    ///
    /// # Safety
    /// `req` must come from `from_encoded` and not have been freed.
    pub(crate) unsafe fn free(req: *mut Self) {
        let req = unsafe { Box::from_raw(req) };
        if !req.url.is_null() {
            drop(unsafe { CString::from_raw(req.url) });
        }
        if !req.body.is_null() {
            drop(unsafe { CString::from_raw(req.body) });
        }
        if !req.headers.is_null() && req.headers_len > 0 {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    req.headers,
                    req.headers_len as usize,
                ))
            };
            for h in headers.iter() {
                if !h.key.is_null() {
                    drop(unsafe { CString::from_raw(h.key) });
                }
                if !h.value.is_null() {
                    drop(unsafe { CString::from_raw(h.value) });
                }
            }
        }
    }
}

/// Transport failure kinds a host reports through `yt_call_fail`. The
/// values match `TransportErrorKind::code`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiTransportErrorKind {
    Cancelled = 0,
    InvalidRequest = 1,
    Connect = 2,
    TimedOut = 3,
    Io = 4,
    Other = 5,
}

/// Unknown codes map to `Other`.
pub(crate) fn transport_kind_from_raw(raw: u32) -> TransportErrorKind {
    match raw {
        0 => TransportErrorKind::Cancelled,
        1 => TransportErrorKind::InvalidRequest,
        2 => TransportErrorKind::Connect,
        3 => TransportErrorKind::TimedOut,
        4 => TransportErrorKind::Io,
        _ => TransportErrorKind::Other,
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiEventTag {
    Value = 0,
    Failed = 1,
    Completed = 2,
    Interrupted = 3,
}

/// Category of a `Failed` event.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorKind {
    None = 0,
    Transport = 1,
    Decode = 2,
    Domain = 3,
}

/// One stream event, borrowed by the host for the duration of the event
/// callback.
///
/// For `Value`, `payload` is the document as JSON text. For `Failed`,
/// `error_kind` and `code` give the error identity (`code` is the transport
/// kind, `1` for decode errors, or the API's own code) and `payload` the
/// message; for domain errors `reason` holds the first detail's reason.
/// Unused pointers are null.
#[repr(C)]
pub struct FfiEvent {
    pub tag: FfiEventTag,
    pub error_kind: FfiErrorKind,
    pub code: i64,
    pub payload: *const c_char,
    pub reason: *const c_char,
}

/// Owns the strings an `FfiEvent` points into.
pub(crate) struct OwnedEvent {
    tag: FfiEventTag,
    error_kind: FfiErrorKind,
    code: i64,
    payload: Option<CString>,
    reason: Option<CString>,
}

impl OwnedEvent {
    pub(crate) fn from_core(event: Event<serde_json::Value, ApiError>) -> Self {
        let (tag, error_kind, code, payload, reason) = match event {
            Event::Value(document) => (
                FfiEventTag::Value,
                FfiErrorKind::None,
                0,
                Some(c_string(document.to_string())),
                None,
            ),
            Event::Failed(err) => {
                let kind = match &err {
                    ApiError::Transport(_) => FfiErrorKind::Transport,
                    ApiError::Decode => FfiErrorKind::Decode,
                    ApiError::Domain(_) => FfiErrorKind::Domain,
                };
                let reason = err
                    .as_domain()
                    .and_then(|domain| domain.reason())
                    .map(c_string);
                (FfiEventTag::Failed, kind, err.code(), Some(c_string(err.to_string())), reason)
            }
            Event::Completed => (FfiEventTag::Completed, FfiErrorKind::None, 0, None, None),
            Event::Interrupted => (FfiEventTag::Interrupted, FfiErrorKind::None, 0, None, None),
        };
        Self {
            tag,
            error_kind,
            code,
            payload,
            reason,
        }
    }

    /// A view valid while `self` lives.
    pub(crate) fn as_ffi(&self) -> FfiEvent {
        FfiEvent {
            tag: self.tag,
            error_kind: self.error_kind,
            code: self.code,
            payload: self.payload.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
            reason: self.reason.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
        }
    }
}
