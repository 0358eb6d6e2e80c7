//! Error types surfaced by request streams.
//!
//! # Design
//! Three failure kinds reach a subscriber: the transport could not deliver a
//! response (`Transport`), the body was not JSON (`Decode`), or the API
//! answered with an error document (`Domain`). Cancellation is deliberately
//! absent here: it ends a stream with `Event::Interrupted`, never with an
//! `ApiError`.

use std::fmt;

use crate::types::DomainError;

/// Identity domain for errors raised by this crate.
pub const ERROR_DOMAIN: &str = "YoutubeEngine";

/// Identity domain for errors reported by the remote API.
pub const API_ERROR_DOMAIN: &str = "YoutubeEngine.api";

/// Fixed code of `ApiError::Decode`.
pub const DECODE_ERROR_CODE: i64 = 1;

/// What went wrong below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The request was cancelled by its caller.
    Cancelled,
    /// The request could not be built (bad URL, unencodable parameters).
    InvalidRequest,
    /// DNS or TCP/TLS connection failure.
    Connect,
    TimedOut,
    Io,
    Other,
}

impl TransportErrorKind {
    /// Stable numeric code, shared with the C ABI.
    pub fn code(self) -> i64 {
        match self {
            TransportErrorKind::Cancelled => 0,
            TransportErrorKind::InvalidRequest => 1,
            TransportErrorKind::Connect => 2,
            TransportErrorKind::TimedOut => 3,
            TransportErrorKind::Io => 4,
            TransportErrorKind::Other => 5,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::InvalidRequest => "invalid request",
            TransportErrorKind::Connect => "connection failed",
            TransportErrorKind::TimedOut => "timed out",
            TransportErrorKind::Io => "i/o error",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(name)
    }
}

/// A failure reported by a transport, passed through to subscribers
/// unchanged.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The transport's cancellation indicator.
    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "request cancelled")
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == TransportErrorKind::Cancelled
    }
}

#[cfg(feature = "ureq")]
impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        let kind = match &err {
            ureq::Error::Timeout(_) => TransportErrorKind::TimedOut,
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
                TransportErrorKind::Connect
            }
            ureq::Error::BadUri(_) => TransportErrorKind::InvalidRequest,
            ureq::Error::Io(_) => TransportErrorKind::Io,
            _ => TransportErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Failure carried by a request stream.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The transport failed before a response was available.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response body was not valid JSON. The parser's own error is not
    /// kept; every malformed body maps to this one value.
    #[error("malformed response body")]
    Decode,

    /// The API reported an error inside an otherwise successful response.
    #[error("{0}")]
    Domain(DomainError),
}

impl ApiError {
    /// Identity domain: `transport`, `ERROR_DOMAIN` or `API_ERROR_DOMAIN`.
    pub fn domain(&self) -> &'static str {
        match self {
            ApiError::Transport(_) => "transport",
            ApiError::Decode => ERROR_DOMAIN,
            ApiError::Domain(_) => API_ERROR_DOMAIN,
        }
    }

    /// Code within `domain()`.
    pub fn code(&self) -> i64 {
        match self {
            ApiError::Transport(err) => err.kind().code(),
            ApiError::Decode => DECODE_ERROR_CODE,
            ApiError::Domain(err) => err.code,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ApiError::Domain(err) => Some(err),
            _ => None,
        }
    }
}
