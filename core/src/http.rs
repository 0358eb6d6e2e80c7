//! HTTP request and response types for the request builder.
//!
//! # Design
//! Requests are described as plain data. `HttpRequest` is what a caller asks
//! for; `EncodedRequest` is what a transport puts on the wire once the
//! method's `ParameterEncoding` has been applied. Nothing in this module
//! touches the network, so the encoding rules are testable in isolation and
//! every transport (ureq worker threads, a C host) encodes the same way.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use url::Url;

use crate::error::{TransportError, TransportErrorKind};

/// Request parameters. Keys are unordered; encoding sorts them.
pub type Parameters = Map<String, Value>;

/// Request headers. Keys are unique and kept exactly as given.
pub type Headers = BTreeMap<String, String>;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Methods that never carry a request body. `HEAD` answers carry none
    /// either; an empty one classifies as a `null` document.
    pub fn is_read_only(self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }

    /// Read-only methods put their parameters in the query string, every
    /// other method sends them as a JSON body.
    pub fn encoding(self) -> ParameterEncoding {
        if self.is_read_only() {
            ParameterEncoding::Url
        } else {
            ParameterEncoding::Json
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where request parameters go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// `application/x-www-form-urlencoded` pairs appended to the URL query.
    Url,
    /// A JSON object in the request body.
    Json,
}

/// A request descriptor: method, URL, optional parameters and headers.
///
/// Built once and never mutated afterwards; the `with_*` methods consume
/// `self`. The stream adapter shares it between subscriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub parameters: Option<Parameters>,
    pub headers: Option<Headers>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            parameters: None,
            headers: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Apply `encoding` and produce the wire-level request.
    ///
    /// Fails with `TransportErrorKind::InvalidRequest` when the URL does not
    /// parse; transports report that through their completion callback.
    pub fn encode(&self, encoding: ParameterEncoding) -> Result<EncodedRequest, TransportError> {
        let mut url = Url::parse(&self.url).map_err(|e| {
            TransportError::new(
                TransportErrorKind::InvalidRequest,
                format!("invalid URL {:?}: {e}", self.url),
            )
        })?;
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .flatten()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let body = match encoding {
            ParameterEncoding::Url => {
                let mut pairs = Vec::new();
                for (key, value) in sorted_entries(self.parameters.as_ref()) {
                    query_components(key, value, &mut pairs);
                }
                if !pairs.is_empty() {
                    url.query_pairs_mut().extend_pairs(pairs);
                }
                None
            }
            ParameterEncoding::Json => {
                let body = self
                    .parameters
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| {
                        TransportError::new(TransportErrorKind::InvalidRequest, e.to_string())
                    })?;
                let has_content_type = headers
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
                if body.is_some() && !has_content_type {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                body
            }
        };

        Ok(EncodedRequest {
            method: self.method,
            url: url.into(),
            headers,
            body,
        })
    }
}

fn sorted_entries(parameters: Option<&Parameters>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = parameters.into_iter().flatten().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries
}

/// Flatten one parameter into query pairs, bracket style for nested values.
fn query_components(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (nested, value) in sorted_entries(Some(map)) {
                query_components(&format!("{key}[{nested}]"), value, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                query_components(&format!("{key}[]"), item, out);
            }
        }
        Value::String(s) => out.push((key.to_string(), s.clone())),
        Value::Bool(b) => out.push((key.to_string(), if *b { "1" } else { "0" }.to_string())),
        Value::Number(n) => out.push((key.to_string(), n.to_string())),
        Value::Null => out.push((key.to_string(), String::new())),
    }
}

/// A request ready for the wire: query already in `url`, body already
/// serialized. All fields are owned so it can cross thread and FFI
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// A response as delivered by a transport. Any status code is a response;
/// only connection-level problems are transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
