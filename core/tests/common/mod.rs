//! Shared helpers for the stream tests.
//!
//! `ManualTransport` records every call and leaves completion to the test,
//! so races between completion and disposal can be laid out step by step.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use yt_engine::{
    ApiError, Completion, EncodedRequest, Event, HttpRequest, HttpResponse, Logger,
    ParameterEncoding, RequestHandle, RequestId, Transport, TransportError, TransportOutcome,
};

struct Call {
    request: HttpRequest,
    encoding: ParameterEncoding,
    completion: Option<Completion>,
    cancels: usize,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
}

/// A transport whose calls complete only when the test says so.
#[derive(Clone, Default)]
pub struct ManualTransport {
    state: Arc<Mutex<State>>,
    /// Whether `cancel` fires the completion with a cancelled error, the
    /// way real transports acknowledge cancellation.
    silent_cancel: bool,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose `cancel` only counts, never completes.
    pub fn with_silent_cancel() -> Self {
        Self {
            silent_cancel: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn request(&self, index: usize) -> HttpRequest {
        self.state.lock().unwrap().calls[index].request.clone()
    }

    pub fn encoding(&self, index: usize) -> ParameterEncoding {
        self.state.lock().unwrap().calls[index].encoding
    }

    pub fn encoded(&self, index: usize) -> EncodedRequest {
        let (request, encoding) = {
            let state = self.state.lock().unwrap();
            let call = &state.calls[index];
            (call.request.clone(), call.encoding)
        };
        request.encode(encoding).unwrap()
    }

    pub fn cancel_count(&self, index: usize) -> usize {
        self.state.lock().unwrap().calls[index].cancels
    }

    /// True while call `index` still waits for its completion.
    pub fn is_pending(&self, index: usize) -> bool {
        self.state.lock().unwrap().calls[index].completion.is_some()
    }

    pub fn complete(&self, index: usize, outcome: TransportOutcome) {
        let completion = self.state.lock().unwrap().calls[index].completion.take();
        let completion = completion.expect("call already completed");
        completion(outcome);
    }

    pub fn respond(&self, index: usize, status: u16, body: &str) {
        self.complete(index, TransportOutcome::Response(HttpResponse::new(status, body)));
    }
}

pub struct ManualHandle {
    state: Arc<Mutex<State>>,
    index: usize,
    silent: bool,
}

impl RequestHandle for ManualHandle {
    fn cancel(&self) {
        let completion = {
            let mut state = self.state.lock().unwrap();
            let call = &mut state.calls[self.index];
            call.cancels += 1;
            if self.silent {
                None
            } else {
                call.completion.take()
            }
        };
        if let Some(completion) = completion {
            completion(TransportOutcome::failed(TransportError::cancelled()));
        }
    }
}

impl Transport for ManualTransport {
    type Handle = ManualHandle;

    fn request(
        &self,
        request: &HttpRequest,
        encoding: ParameterEncoding,
        on_complete: Completion,
    ) -> ManualHandle {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            request: request.clone(),
            encoding,
            completion: Some(on_complete),
            cancels: 0,
        });
        ManualHandle {
            state: Arc::clone(&self.state),
            index: state.calls.len() - 1,
            silent: self.silent_cancel,
        }
    }
}

pub type Events<T, E> = Arc<Mutex<Vec<Event<T, E>>>>;

/// A sink that appends every event to a shared list.
pub fn recorder<T, E>() -> (Events<T, E>, impl FnMut(Event<T, E>) + Send + 'static)
where
    T: Send + 'static,
    E: Send + 'static,
{
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event| sink.lock().unwrap().push(event))
}

/// Records each diagnostic notification as a line of text.
#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<String>>,
    pub ids: Mutex<Vec<RequestId>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn record(&self, id: RequestId, line: String) {
        self.ids.lock().unwrap().push(id);
        self.lines.lock().unwrap().push(line);
    }
}

impl Logger for RecordingLogger {
    fn log_request(&self, id: RequestId, request: &HttpRequest) {
        self.record(id, format!("request {} {}", request.method, request.url));
    }

    fn log_response(&self, id: RequestId, response: &HttpResponse) {
        self.record(id, format!("response {}", response.status));
    }

    fn log_error(&self, id: RequestId, error: &ApiError) {
        self.record(id, format!("error {}/{}", error.domain(), error.code()));
    }
}
