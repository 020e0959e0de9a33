//! C-ABI presentation bridge around `dispatch-core`.
//!
//! # Overview
//! Lets a native UI (GTK, Win32, anything with a C FFI) drive the dispatch
//! engine: form edits and the submit/cancel button become `dispatch_*`
//! calls, and everything the UI should render comes back as `FfiEvent`s.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Engines run on one process-wide tokio runtime, created on first use,
//!   which also keeps the shared HTTP client on a single runtime.
//! - Events are pulled, not pushed: the host calls `dispatch_poll_event`
//!   from its UI thread (an idle handler or timer), so every status, output
//!   and label change is applied on the thread that owns the widgets.
//! - A given `FfiEngine` must only be used from one thread at a time.
//! - The C caller owns returned pointers and must release them with the
//!   matching `dispatch_*_free` / `dispatch_free_*` function.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use dispatch_core::{DispatchEngine, EngineStopped, HttpTransport};
use tokio::runtime::Runtime;
use tracing::warn;

use types::*;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> Option<&'static Runtime> {
    if let Some(rt) = RUNTIME.get() {
        return Some(rt);
    }
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("dispatch-io")
        .enable_all()
        .build()
        .map_err(|e| warn!(%e, "failed to start dispatch runtime"))
        .ok()?;
    Some(RUNTIME.get_or_init(|| rt))
}

/// Read a C string argument.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn read_str(ptr: *const c_char) -> Result<String, FfiErrorCode> {
    if ptr.is_null() {
        return Err(FfiErrorCode::NullArg);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_string)
        .map_err(|_| FfiErrorCode::InvalidUtf8)
}

/// Run `f` against the engine behind `engine`, mapping null, engine
/// shutdown and panics to error codes.
fn with_engine(
    engine: *const FfiEngine,
    f: impl FnOnce(&FfiEngine) -> Result<(), FfiErrorCode>,
) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if engine.is_null() {
            return FfiErrorCode::NullArg;
        }
        let engine = unsafe { &*engine };
        match f(engine) {
            Ok(()) => FfiErrorCode::Ok,
            Err(code) => code,
        }
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

fn stopped(result: Result<(), EngineStopped>) -> Result<(), FfiErrorCode> {
    match FfiErrorCode::from(result) {
        FfiErrorCode::Ok => Ok(()),
        code => Err(code),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Install a `tracing` subscriber that logs to stderr, filtered by
/// `RUST_LOG` (default `info`). Calling it more than once is harmless.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_init_logging() {
    let _ = catch_unwind(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Start a new idle engine with an empty form (POST, raw-JSON body).
///
/// Returns null if the runtime or HTTP client cannot be created, or if an
/// internal panic occurs. Free with `dispatch_engine_free`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_engine_new() -> *mut FfiEngine {
    catch_unwind(|| {
        let Some(rt) = runtime() else {
            return std::ptr::null_mut();
        };
        let transport = match HttpTransport::shared() {
            Ok(transport) => transport,
            Err(err) => {
                warn!(%err, "failed to create HTTP transport");
                return std::ptr::null_mut();
            }
        };
        let (engine, handle, events) = DispatchEngine::new(transport);
        rt.spawn(engine.run());
        Box::into_raw(Box::new(FfiEngine { handle, events }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Stop an engine, cancelling any exchange in flight. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_engine_free(engine: *mut FfiEngine) {
    if !engine.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(engine) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// The action button: submit when idle, cancel while a request is in flight.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_submit_or_cancel(engine: *const FfiEngine) -> FfiErrorCode {
    with_engine(engine, |e| stopped(e.handle.submit_or_cancel()))
}

/// Cancel the request in flight. Does nothing when idle.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_cancel(engine: *const FfiEngine) -> FfiErrorCode {
    with_engine(engine, |e| stopped(e.handle.cancel()))
}

#[unsafe(no_mangle)]
pub extern "C" fn dispatch_set_url(engine: *const FfiEngine, url: *const c_char) -> FfiErrorCode {
    with_engine(engine, |e| {
        let url = unsafe { read_str(url) }?;
        stopped(e.handle.set_url(url))
    })
}

/// Set the bearer token. An empty or blank token sends no Authorization
/// header.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_set_token(engine: *const FfiEngine, token: *const c_char) -> FfiErrorCode {
    with_engine(engine, |e| {
        let token = unsafe { read_str(token) }?;
        stopped(e.handle.set_token(token))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn dispatch_select_method(engine: *const FfiEngine, method: FfiHttpMethod) -> FfiErrorCode {
    with_engine(engine, |e| stopped(e.handle.select_method(method.into())))
}

#[unsafe(no_mangle)]
pub extern "C" fn dispatch_select_body_mode(engine: *const FfiEngine, mode: FfiBodyMode) -> FfiErrorCode {
    with_engine(engine, |e| stopped(e.handle.select_body_mode(mode.into())))
}

#[unsafe(no_mangle)]
pub extern "C" fn dispatch_set_raw_body(engine: *const FfiEngine, body: *const c_char) -> FfiErrorCode {
    with_engine(engine, |e| {
        let body = unsafe { read_str(body) }?;
        stopped(e.handle.set_raw_body(body))
    })
}

/// Replace the builder rows with `len` key/value pairs.
///
/// `keys` and `values` must each point to `len` C strings; both may be null
/// when `len` is 0.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_set_builder_rows(
    engine: *const FfiEngine,
    keys: *const *const c_char,
    values: *const *const c_char,
    len: u32,
) -> FfiErrorCode {
    with_engine(engine, |e| {
        let len = len as usize;
        let mut rows = Vec::with_capacity(len);
        if len > 0 {
            if keys.is_null() || values.is_null() {
                return Err(FfiErrorCode::NullArg);
            }
            let keys = unsafe { std::slice::from_raw_parts(keys, len) };
            let values = unsafe { std::slice::from_raw_parts(values, len) };
            for (&key, &value) in keys.iter().zip(values) {
                rows.push((unsafe { read_str(key) }?, unsafe { read_str(value) }?));
            }
        }
        stopped(e.handle.set_builder_rows(rows))
    })
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Take the next pending event, or null if there is none.
///
/// Call from the UI thread; events come out in the order the engine
/// produced them. Free each event with `dispatch_free_event`.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_poll_event(engine: *mut FfiEngine) -> *mut FfiEvent {
    catch_unwind(AssertUnwindSafe(|| {
        if engine.is_null() {
            return std::ptr::null_mut();
        }
        let engine = unsafe { &mut *engine };
        match engine.events.try_recv() {
            Ok(event) => FfiEvent::from_core(event),
            Err(_) => std::ptr::null_mut(),
        }
    }))
    .unwrap_or(std::ptr::null_mut())
}

/// Free an event returned by `dispatch_poll_event`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn dispatch_free_event(event: *mut FfiEvent) {
    if event.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let event = unsafe { Box::from_raw(event) };
        if !event.text.is_null() {
            drop(unsafe { std::ffi::CString::from_raw(event.text) });
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::time::{Duration, Instant};

    /// Poll until an event arrives, failing after a few seconds.
    fn next_event(engine: *mut FfiEngine) -> *mut FfiEvent {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let event = dispatch_poll_event(engine);
            if !event.is_null() {
                return event;
            }
            assert!(Instant::now() < deadline, "timed out waiting for event");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn text_of(event: &FfiEvent) -> Option<String> {
        if event.text.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(event.text) }.to_str().unwrap().to_string())
    }

    /// Drain events up to and including `Finished`; returns its outcome and
    /// text.
    fn until_finished(engine: *mut FfiEngine) -> (FfiOutcome, Option<String>, Vec<FfiEventKind>) {
        let mut kinds = Vec::new();
        loop {
            let event = next_event(engine);
            let event_ref = unsafe { &*event };
            kinds.push(event_ref.kind);
            if event_ref.kind == FfiEventKind::Finished {
                let result = (event_ref.outcome, text_of(event_ref), kinds);
                dispatch_free_event(event);
                return result;
            }
            dispatch_free_event(event);
        }
    }

    fn start_mock_server() -> std::net::SocketAddr {
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
        addr
    }

    #[test]
    fn engine_new_and_free() {
        let engine = dispatch_engine_new();
        assert!(!engine.is_null());
        dispatch_engine_free(engine);
    }

    #[test]
    fn engine_free_null_is_safe() {
        dispatch_engine_free(std::ptr::null_mut());
    }

    #[test]
    fn free_event_null_is_safe() {
        dispatch_free_event(std::ptr::null_mut());
    }

    #[test]
    fn null_engine_is_reported() {
        let url = CString::new("http://localhost").unwrap();
        assert_eq!(dispatch_set_url(std::ptr::null(), url.as_ptr()), FfiErrorCode::NullArg);
        assert_eq!(dispatch_submit_or_cancel(std::ptr::null()), FfiErrorCode::NullArg);
        assert!(dispatch_poll_event(std::ptr::null_mut()).is_null());
    }

    #[test]
    fn null_and_non_utf8_strings_are_rejected() {
        let engine = dispatch_engine_new();
        assert_eq!(dispatch_set_url(engine, std::ptr::null()), FfiErrorCode::NullArg);

        let bad = CString::new(vec![0xff, 0xfe]).unwrap();
        assert_eq!(dispatch_set_token(engine, bad.as_ptr()), FfiErrorCode::InvalidUtf8);
        dispatch_engine_free(engine);
    }

    #[test]
    fn idle_engine_has_no_events() {
        let engine = dispatch_engine_new();
        assert_eq!(dispatch_cancel(engine), FfiErrorCode::Ok);
        std::thread::sleep(Duration::from_millis(50));
        assert!(dispatch_poll_event(engine).is_null());
        dispatch_engine_free(engine);
    }

    #[test]
    fn blank_url_reports_status() {
        let engine = dispatch_engine_new();
        assert_eq!(dispatch_submit_or_cancel(engine), FfiErrorCode::Ok);

        let event = next_event(engine);
        let event_ref = unsafe { &*event };
        assert_eq!(event_ref.kind, FfiEventKind::Status);
        assert_eq!(text_of(event_ref).as_deref(), Some("URL required."));
        assert_eq!(event_ref.outcome, FfiOutcome::None);
        dispatch_free_event(event);
        dispatch_engine_free(engine);
    }

    #[test]
    fn builder_rows_require_arrays_when_non_empty() {
        let engine = dispatch_engine_new();
        assert_eq!(
            dispatch_set_builder_rows(engine, std::ptr::null(), std::ptr::null(), 0),
            FfiErrorCode::Ok
        );
        assert_eq!(
            dispatch_set_builder_rows(engine, std::ptr::null(), std::ptr::null(), 2),
            FfiErrorCode::NullArg
        );
        dispatch_engine_free(engine);
    }

    #[test]
    fn get_round_trip_against_mock_server() {
        let addr = start_mock_server();
        let engine = dispatch_engine_new();

        let url = CString::new(format!("http://{addr}/echo")).unwrap();
        let token = CString::new("  secret ").unwrap();
        assert_eq!(dispatch_set_url(engine, url.as_ptr()), FfiErrorCode::Ok);
        assert_eq!(dispatch_set_token(engine, token.as_ptr()), FfiErrorCode::Ok);
        assert_eq!(dispatch_select_method(engine, FfiHttpMethod::Get), FfiErrorCode::Ok);
        assert_eq!(dispatch_submit_or_cancel(engine), FfiErrorCode::Ok);

        let first = next_event(engine);
        let first_ref = unsafe { &*first };
        assert_eq!(first_ref.kind, FfiEventKind::ActionLabel);
        assert_eq!(first_ref.label, FfiActionLabel::Cancel);
        assert_eq!(text_of(first_ref).as_deref(), Some("Cancel..."));
        dispatch_free_event(first);

        let (outcome, text, kinds) = until_finished(engine);
        assert_eq!(outcome, FfiOutcome::Success);
        assert_eq!(kinds.iter().filter(|k| **k == FfiEventKind::ActionLabel).count(), 1);

        let echo: serde_json::Value = serde_json::from_str(&text.unwrap()).unwrap();
        assert_eq!(echo["method"], "GET");
        assert_eq!(echo["headers"]["authorization"], "Bearer secret");
        dispatch_engine_free(engine);
    }

    #[test]
    fn post_rows_round_trip_against_mock_server() {
        let addr = start_mock_server();
        let engine = dispatch_engine_new();

        let url = CString::new(format!("http://{addr}/echo")).unwrap();
        let keys = [CString::new("a").unwrap(), CString::new("b").unwrap(), CString::new("a").unwrap()];
        let values = [CString::new("1").unwrap(), CString::new("2").unwrap(), CString::new("3").unwrap()];
        let key_ptrs: Vec<_> = keys.iter().map(|k| k.as_ptr()).collect();
        let value_ptrs: Vec<_> = values.iter().map(|v| v.as_ptr()).collect();

        dispatch_set_url(engine, url.as_ptr());
        dispatch_select_method(engine, FfiHttpMethod::Post);
        dispatch_select_body_mode(engine, FfiBodyMode::Fields);
        assert_eq!(
            dispatch_set_builder_rows(engine, key_ptrs.as_ptr(), value_ptrs.as_ptr(), 3),
            FfiErrorCode::Ok
        );
        dispatch_submit_or_cancel(engine);

        let (outcome, text, _) = until_finished(engine);
        assert_eq!(outcome, FfiOutcome::Success);
        let echo: serde_json::Value = serde_json::from_str(&text.unwrap()).unwrap();
        assert_eq!(echo["body"], r#"{"a":"3","b":"2"}"#);
        dispatch_engine_free(engine);
    }

    #[test]
    fn not_found_and_cancel_against_mock_server() {
        let addr = start_mock_server();
        let engine = dispatch_engine_new();
        dispatch_select_method(engine, FfiHttpMethod::Get);

        let url = CString::new(format!("http://{addr}/status/404")).unwrap();
        dispatch_set_url(engine, url.as_ptr());
        dispatch_submit_or_cancel(engine);
        let (outcome, text, _) = until_finished(engine);
        assert_eq!(outcome, FfiOutcome::Failed);
        assert_eq!(text.as_deref(), Some("HTTP 404 Not Found"));

        let url = CString::new(format!("http://{addr}/slow/5000")).unwrap();
        dispatch_set_url(engine, url.as_ptr());
        dispatch_submit_or_cancel(engine);
        std::thread::sleep(Duration::from_millis(100));
        dispatch_submit_or_cancel(engine);
        let (outcome, text, _) = until_finished(engine);
        assert_eq!(outcome, FfiOutcome::Cancelled);
        assert!(text.is_none());
        dispatch_engine_free(engine);
    }
}
