//! Error types for request validation and transport.
//!
//! # Design
//! Validation failures are caught while turning form state into a
//! `RequestSpec` and never reach the network. Transport failures happen after
//! an exchange has started and always end it. Cancellation lives in
//! `TransportError` because the transport is where it is observed, but the
//! engine reports it as its own outcome rather than as a failure.

use thiserror::Error;

/// Errors raised while building a `RequestSpec` from user input.
///
/// The `Display` text is what the presentation shows in its status line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("URL required.")]
    UrlRequired,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Raw-JSON mode was selected for a method that sends a body, but the
    /// text area is blank.
    #[error("JSON body is empty.")]
    EmptyBody,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

/// Errors returned by a `Transport` for a single exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The URL is malformed or not an absolute http(s) URL. Raised before any
    /// network activity.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The server answered with a non-2xx status. The body is not read.
    #[error("HTTP {code} {reason}")]
    NonSuccessStatus { code: u16, reason: String },

    /// The exchange's cancel signal fired before it completed.
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Returned by `EngineHandle` when the engine task has shut down and can no
/// longer accept intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dispatch engine has stopped")]
pub struct EngineStopped;
