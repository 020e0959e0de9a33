//! Network execution of a single exchange.
//!
//! # Design
//! `Transport` is the seam between the engine and the network; the engine is
//! generic over it so tests can script outcomes. `HttpTransport` is the real
//! implementation on top of `reqwest`. Cancellation is cooperative: the
//! exchange's token is checked while waiting for the response head and again
//! while reading the body. Dropping the in-progress `reqwest` future on
//! either path releases the connection the same way completion does.

use std::sync::OnceLock;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{build_request, check_status, decode_body};
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http::HttpMethod;
use crate::request::RequestSpec;

/// Executes one HTTP exchange.
///
/// Returns `Ok(None)` for an empty or all-whitespace body.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(
        &self,
        spec: RequestSpec,
        cancel: CancellationToken,
    ) -> Result<Option<String>, TransportError>;
}

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// `reqwest`-backed transport with gzip/deflate decoding and a hard timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Build a transport with its own connection pool.
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Transport on the process-wide client, created on first use with the
    /// default configuration and reused afterwards.
    pub fn shared() -> Result<Self, TransportError> {
        let config = ClientConfig::default();
        let client = match SHARED_CLIENT.get() {
            Some(client) => client.clone(),
            None => {
                let client = build_client(&config)?;
                SHARED_CLIENT.get_or_init(|| client).clone()
            }
        };
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn build_client(config: &ClientConfig) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .gzip(true)
        .deflate(true)
        .timeout(config.timeout)
        .build()
        .map_err(|e| TransportError::Network(e.to_string()))
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        spec: RequestSpec,
        cancel: CancellationToken,
    ) -> Result<Option<String>, TransportError> {
        let request = build_request(&spec, &self.config)?;
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut builder = self.client.request(request.method.into(), spec.url().clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            sent = builder.send() => sent?,
        };

        let status = response.status();
        debug!(status = status.as_u16(), url = %request.url, "response head received");
        check_status(status.as_u16(), status.canonical_reason())?;

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            text = response.text() => text?,
        };
        Ok(decode_body(&raw))
    }
}
