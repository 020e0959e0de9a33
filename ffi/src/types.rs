//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type with a C-compatible representation: plain
//! discriminant enums for methods, modes and labels, and one flat
//! `FfiEvent` struct for every outbound event. Conversion functions live here
//! to keep `lib.rs` focused on the `extern "C"` surface.

use std::ffi::CString;
use std::os::raw::c_char;

use dispatch_core::{ActionLabel, BodyMode, EngineHandle, EngineStopped, HttpMethod, Outcome, UiEvent};
use tokio::sync::mpsc::UnboundedReceiver;

/// Opaque handle to a running dispatch engine. C callers receive a pointer
/// to this and pass it back into every FFI function.
pub struct FfiEngine {
    pub(crate) handle: EngineHandle,
    pub(crate) events: UnboundedReceiver<UiEvent>,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiHttpMethod {
    Get = 0,
    Post = 1,
    Put = 2,
    Patch = 3,
    Delete = 4,
}

impl From<FfiHttpMethod> for HttpMethod {
    fn from(m: FfiHttpMethod) -> Self {
        match m {
            FfiHttpMethod::Get => HttpMethod::Get,
            FfiHttpMethod::Post => HttpMethod::Post,
            FfiHttpMethod::Put => HttpMethod::Put,
            FfiHttpMethod::Patch => HttpMethod::Patch,
            FfiHttpMethod::Delete => HttpMethod::Delete,
        }
    }
}

/// Body source: the raw JSON text area or the key/value rows.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiBodyMode {
    Raw = 0,
    Fields = 1,
}

impl From<FfiBodyMode> for BodyMode {
    fn from(m: FfiBodyMode) -> Self {
        match m {
            FfiBodyMode::Raw => BodyMode::Raw,
            FfiBodyMode::Fields => BodyMode::Fields,
        }
    }
}

/// Result code of every inbound call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    NullArg = 1,
    InvalidUtf8 = 2,
    EngineStopped = 3,
    Panic = 4,
}

impl From<Result<(), EngineStopped>> for FfiErrorCode {
    fn from(result: Result<(), EngineStopped>) -> Self {
        match result {
            Ok(()) => FfiErrorCode::Ok,
            Err(EngineStopped) => FfiErrorCode::EngineStopped,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Which field of `FfiEvent` carries the payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiEventKind {
    /// `text` is the new status line.
    Status = 0,
    /// `text` replaces the output pane (may be empty).
    Output = 1,
    /// `label` is the new face of the action button; `text` is its caption.
    ActionLabel = 2,
    /// `outcome` says how the exchange ended; `text` is the formatted body
    /// for `Success`, the message for `Failed`, null otherwise.
    Finished = 3,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiActionLabel {
    Submit = 0,
    Cancel = 1,
}

impl From<ActionLabel> for FfiActionLabel {
    fn from(label: ActionLabel) -> Self {
        match label {
            ActionLabel::Submit => FfiActionLabel::Submit,
            ActionLabel::Cancel => FfiActionLabel::Cancel,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiOutcome {
    /// The event is not a `Finished` event.
    None = 0,
    Success = 1,
    EmptyResponse = 2,
    Cancelled = 3,
    Failed = 4,
}

/// One outbound event. Free with `dispatch_free_event`.
#[repr(C)]
pub struct FfiEvent {
    pub kind: FfiEventKind,
    pub text: *mut c_char,
    pub label: FfiActionLabel,
    pub outcome: FfiOutcome,
}

impl FfiEvent {
    /// Convert a core `UiEvent` into a heap-allocated `FfiEvent`.
    pub(crate) fn from_core(event: UiEvent) -> *mut Self {
        let ffi_event = match event {
            UiEvent::Status(text) => Self::with_text(FfiEventKind::Status, text),
            UiEvent::Output(text) => Self::with_text(FfiEventKind::Output, text),
            UiEvent::ActionLabel(label) => FfiEvent {
                label: label.into(),
                ..Self::with_text(FfiEventKind::ActionLabel, label.text().to_string())
            },
            UiEvent::Finished(outcome) => {
                let (code, text) = match outcome {
                    Outcome::Success(body) => (FfiOutcome::Success, Some(body)),
                    Outcome::EmptyResponse => (FfiOutcome::EmptyResponse, None),
                    Outcome::Cancelled => (FfiOutcome::Cancelled, None),
                    Outcome::Failed(message) => (FfiOutcome::Failed, Some(message)),
                };
                FfiEvent {
                    kind: FfiEventKind::Finished,
                    text: text.map_or(std::ptr::null_mut(), into_c_string),
                    label: FfiActionLabel::Submit,
                    outcome: code,
                }
            }
        };
        Box::into_raw(Box::new(ffi_event))
    }

    fn with_text(kind: FfiEventKind, text: String) -> Self {
        FfiEvent {
            kind,
            text: into_c_string(text),
            label: FfiActionLabel::Submit,
            outcome: FfiOutcome::None,
        }
    }
}

/// Hand a Rust string to C. Interior NULs cannot cross the boundary and are
/// dropped.
pub(crate) fn into_c_string(text: String) -> *mut c_char {
    let text = if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text
    };
    CString::new(text).unwrap_or_default().into_raw()
}
