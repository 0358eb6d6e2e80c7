//! A `Transport` over blocking `ureq` calls, one worker thread per request.
//!
//! # Design
//! The completion callback is parked in a slot shared by the worker and the
//! handle. Whoever takes it first reports the outcome: the worker with the
//! response, or `cancel` with a cancelled error. A cancelled request is not
//! aborted mid-flight (ureq has no such hook); its worker finishes the I/O
//! and finds the slot empty.

use std::sync::{Arc, Mutex};
use std::thread;

use ureq::http::Response;
use ureq::typestate::WithBody;
use ureq::{Agent, Body, RequestBuilder};

use crate::error::{TransportError, TransportErrorKind};
use crate::http::{EncodedRequest, HttpMethod, HttpRequest, HttpResponse, ParameterEncoding};
use crate::signal::lock;
use crate::transport::{Completion, RequestHandle, Transport, TransportOutcome};

type Pending = Arc<Mutex<Option<Completion>>>;

/// Blocking HTTP transport backed by a shared `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    /// An agent that hands every status code back as a response.
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a caller-configured agent (timeouts, proxy). It should be built
    /// with `http_status_as_error(false)`, otherwise 4xx/5xx answers arrive
    /// as transport failures and their error documents are lost.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a request running on a worker thread.
pub struct UreqHandle {
    pending: Pending,
}

impl RequestHandle for UreqHandle {
    fn cancel(&self) {
        let completion = lock(&self.pending).take();
        if let Some(on_complete) = completion {
            on_complete(TransportOutcome::failed(TransportError::cancelled()));
        }
    }
}

impl Transport for UreqTransport {
    type Handle = UreqHandle;

    fn request(
        &self,
        request: &HttpRequest,
        encoding: ParameterEncoding,
        on_complete: Completion,
    ) -> UreqHandle {
        let pending: Pending = Arc::new(Mutex::new(Some(on_complete)));
        let worker_pending = Arc::clone(&pending);
        let agent = self.agent.clone();
        let request = request.clone();

        let spawned = thread::Builder::new()
            .name("yt-engine-request".to_string())
            .spawn(move || {
                if lock(&worker_pending).is_none() {
                    return;
                }
                let outcome = match request.encode(encoding) {
                    Ok(encoded) => match execute(&agent, &encoded) {
                        Ok(response) => TransportOutcome::Response(response),
                        Err(err) => TransportOutcome::failed(err.into()),
                    },
                    Err(err) => TransportOutcome::failed(err),
                };
                let completion = lock(&worker_pending).take();
                if let Some(on_complete) = completion {
                    on_complete(outcome);
                }
            });

        if let Err(err) = spawned {
            let completion = lock(&pending).take();
            if let Some(on_complete) = completion {
                on_complete(TransportOutcome::failed(TransportError::new(
                    TransportErrorKind::Io,
                    format!("failed to spawn request thread: {err}"),
                )));
            }
        }

        UreqHandle { pending }
    }
}

/// Run one encoded request to completion.
fn execute(agent: &Agent, request: &EncodedRequest) -> Result<HttpResponse, ureq::Error> {
    let url = request.url.as_str();
    let headers = request.headers.as_slice();
    let body = request.body.as_deref().map(str::as_bytes);

    let mut response = match request.method {
        HttpMethod::Get => with_headers(agent.get(url), headers).call(),
        HttpMethod::Head => with_headers(agent.head(url), headers).call(),
        HttpMethod::Options => with_headers(agent.options(url), headers).call(),
        HttpMethod::Delete => match body {
            Some(body) => with_headers(agent.delete(url), headers)
                .force_send_body()
                .send(body),
            None => with_headers(agent.delete(url), headers).call(),
        },
        HttpMethod::Post => send(with_headers(agent.post(url), headers), body),
        HttpMethod::Put => send(with_headers(agent.put(url), headers), body),
        HttpMethod::Patch => send(with_headers(agent.patch(url), headers), body),
    }?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response.body_mut().read_to_vec()?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn with_headers<B>(builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    headers
        .iter()
        .fold(builder, |builder, (name, value)| builder.header(name, value))
}

fn send(
    builder: RequestBuilder<WithBody>,
    body: Option<&[u8]>,
) -> Result<Response<Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body),
        None => builder.send_empty(),
    }
}
