//! The C surface driven by a host that performs its I/O with ureq on worker
//! threads, against the live mock server.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use yt_engine_ffi::types::{
    FfiErrorKind, FfiEvent, FfiEventTag, FfiHeader, FfiHttpMethod, FfiHttpRequest,
    FfiTransportErrorKind,
};
use yt_engine_ffi::{
    yt_call_complete, yt_call_fail, yt_client_free, yt_client_new, yt_request_json,
    yt_subscription_free, FfiCall,
};

type Recorded = (FfiEventTag, FfiErrorKind, i64, Option<String>);

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn owned(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Copies the borrowed request and executes it on a fresh thread.
extern "C" fn ureq_dispatch(_ctx: *mut c_void, call: *mut FfiCall, request: *const FfiHttpRequest) {
    let request = unsafe { &*request };
    let method = request.method;
    let url = owned(request.url).unwrap();
    let body = owned(request.body);
    let headers: Vec<(String, String)> = if request.headers.is_null() {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(request.headers, request.headers_len as usize) }
            .iter()
            .map(|h| (owned(h.key).unwrap(), owned(h.value).unwrap()))
            .collect()
    };
    let call = call as usize;

    std::thread::spawn(move || {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        let result = match method {
            FfiHttpMethod::Get => headers
                .iter()
                .fold(agent.get(&url), |b, (k, v)| b.header(k, v))
                .call(),
            FfiHttpMethod::Post => {
                let builder = headers
                    .iter()
                    .fold(agent.post(&url), |b, (k, v)| b.header(k, v));
                match &body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
            other => panic!("test host does not speak {other:?}"),
        };
        let call = call as *mut FfiCall;
        match result {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let headers: Vec<(CString, CString)> = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        let value = CString::new(value.as_bytes()).ok()?;
                        Some((CString::new(name.as_str()).ok()?, value))
                    })
                    .collect();
                let ffi_headers: Vec<FfiHeader> = headers
                    .iter()
                    .map(|(name, value)| FfiHeader {
                        key: name.as_ptr() as *mut c_char,
                        value: value.as_ptr() as *mut c_char,
                    })
                    .collect();
                let bytes = response.body_mut().read_to_vec().unwrap_or_default();
                yt_call_complete(
                    call,
                    status,
                    ffi_headers.as_ptr(),
                    ffi_headers.len() as u32,
                    bytes.as_ptr(),
                    bytes.len(),
                );
            }
            Err(err) => {
                let message = CString::new(err.to_string()).unwrap_or_default();
                yt_call_fail(call, FfiTransportErrorKind::Io as u32, message.as_ptr());
            }
        }
    });
}

extern "C" fn forward_event(ctx: *mut c_void, event: *const FfiEvent) {
    let sender = unsafe { &*(ctx as *const Mutex<Sender<Recorded>>) };
    let event = unsafe { &*event };
    let _ = sender.lock().unwrap().send((
        event.tag,
        event.error_kind,
        event.code,
        owned(event.payload),
    ));
}

fn run(method: FfiHttpMethod, path: &str, parameters: Option<&str>) -> Vec<Recorded> {
    let base_url = CString::new(start_server()).unwrap();
    let client = yt_client_new(base_url.as_ptr(), Some(ureq_dispatch), None, std::ptr::null_mut());
    assert!(!client.is_null());

    let (tx, rx): (Sender<Recorded>, Receiver<Recorded>) = mpsc::channel();
    // The event context lives until `yt_subscription_free` has returned.
    let sender = Box::new(Mutex::new(tx));
    let url = CString::new(path).unwrap();
    let parameters = parameters.map(|p| CString::new(p).unwrap());
    let subscription = yt_request_json(
        client,
        method as u32,
        url.as_ptr(),
        parameters.as_ref().map_or(std::ptr::null(), |p| p.as_ptr()),
        std::ptr::null(),
        Some(forward_event),
        &*sender as *const Mutex<Sender<Recorded>> as *mut c_void,
        true,
    );
    assert!(!subscription.is_null());
    yt_client_free(client);

    let mut events = Vec::new();
    while let Ok(event) = rx.recv_timeout(Duration::from_secs(10)) {
        let terminal = event.0 != FfiEventTag::Value;
        events.push(event);
        if terminal {
            break;
        }
    }
    yt_subscription_free(subscription);
    drop(sender);
    events
}

#[test]
fn host_fetches_videos() {
    let events = run(FfiHttpMethod::Get, "/videos", Some(r#"{"id":"rust003"}"#));

    assert_eq!(events.len(), 2, "{events:?}");
    assert_eq!(events[0].0, FfiEventTag::Value);
    let document: serde_json::Value = serde_json::from_str(events[0].3.as_deref().unwrap()).unwrap();
    assert_eq!(document["items"][0]["snippet"]["title"], "Rust Ownership Explained");
    assert_eq!(events[1].0, FfiEventTag::Completed);
}

#[test]
fn host_reports_api_errors() {
    let events = run(FfiHttpMethod::Post, "/playlists", Some(r#"{"description":"untitled"}"#));

    assert_eq!(events.len(), 1, "{events:?}");
    let (tag, kind, code, _) = &events[0];
    assert_eq!((*tag, *kind, *code), (FfiEventTag::Failed, FfiErrorKind::Domain, 400));
}
