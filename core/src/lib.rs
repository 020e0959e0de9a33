//! Request dispatch and cancellation engine for an interactive HTTP client.
//!
//! # Overview
//! An operator fills in a request form (method, URL, bearer token, JSON body
//! as raw text or key/value rows) and presses one button that means "send"
//! while idle and "cancel" while a request is outstanding. This crate is
//! everything behind that button: validating the form into a `RequestSpec`,
//! running exactly one HTTP exchange at a time, cancelling it on request and
//! turning whatever happened into status and output text.
//!
//! # Design
//! - `request` validates form state into an immutable `RequestSpec`.
//! - `client` is the I/O-free part of an exchange (headers, status rule,
//!   body post-processing); `transport` executes it with `reqwest`.
//! - `engine` is the Idle/InFlight state machine, run as an actor that
//!   receives `Intent`s and emits `UiEvent`s for the presentation to render.
//! - `format` pretty-prints JSON responses; `compat` holds the upstream
//!   HTML-entity fix-up.

pub mod client;
pub mod compat;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod http;
pub mod request;
pub mod transport;

pub use config::ClientConfig;
pub use engine::{ActionLabel, DispatchEngine, EngineHandle, Intent, Outcome, UiEvent};
pub use error::{EngineStopped, TransportError, ValidationError};
pub use format::format_response;
pub use http::{HttpMethod, HttpRequest};
pub use request::{fields_to_json, BodyMode, RequestForm, RequestSpec};
pub use tokio_util::sync::CancellationToken;
pub use transport::{HttpTransport, Transport};
