use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tracing::debug;

/// Upstream body with entity-escaped string values, the way the DNI
/// provider sends them.
pub const ESCAPED_BODY: &str = r#"{"nombres":"JOS&Eacute; LUIS","apellido":"MU&#209;OZ &amp; HIJOS"}"#;

pub const TEXT_BODY: &str = "plain text, not json";

/// What `/echo` saw of the request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// Shared across handlers; counts every request the server receives.
#[derive(Clone, Debug, Default)]
pub struct ServerState {
    hits: Arc<AtomicUsize>,
}

impl ServerState {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn app() -> Router {
    app_with_state(ServerState::default())
}

pub fn app_with_state(state: ServerState) -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/empty", get(|| async { StatusCode::OK }))
        .route("/blank", get(|| async { " \r\n\t " }))
        .route("/escaped", get(escaped))
        .route("/text", get(|| async { TEXT_BODY }))
        .route("/slow/{ms}", get(slow))
        .route("/compressed", get(compressed).layer(CompressionLayer::new()))
        .layer(middleware::from_fn_with_state(state, count_hits))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, ServerState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: ServerState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn count_hits(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    debug!(method = %request.method(), uri = %request.uri(), "request");
    next.run(request).await
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Json(Echo {
        method: method.as_str().to_string(),
        headers,
        body: (!body.is_empty()).then_some(body),
    })
}

async fn status(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, "{ this body must never be parsed").into_response()
}

async fn escaped() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], ESCAPED_BODY)
}

async fn slow(Path(ms): Path<u64>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(serde_json::json!({ "slept_ms": ms }))
}

/// A body large enough for the compression layer to kick in.
pub fn compressed_payload() -> serde_json::Value {
    let items: Vec<_> = (0..200)
        .map(|i| serde_json::json!({ "id": i, "name": format!("item-{i}") }))
        .collect();
    serde_json::json!({ "items": items })
}

async fn compressed() -> Json<serde_json::Value> {
    Json(compressed_payload())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_serializes_missing_body_as_null() {
        let echo = Echo {
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
        };
        let json = serde_json::to_value(&echo).unwrap();
        assert_eq!(json["method"], "GET");
        assert!(json["body"].is_null());
    }

    #[test]
    fn echo_roundtrips_through_json() {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "application/json".to_string());
        let echo = Echo {
            method: "POST".to_string(),
            headers,
            body: Some("{}".to_string()),
        };
        let back: Echo = serde_json::from_str(&serde_json::to_string(&echo).unwrap()).unwrap();
        assert_eq!(back, echo);
    }

    #[test]
    fn compressed_payload_is_above_compression_threshold() {
        let bytes = serde_json::to_vec(&compressed_payload()).unwrap();
        assert!(bytes.len() > 1024);
    }

    #[test]
    fn fresh_state_has_no_hits() {
        assert_eq!(ServerState::default().hits(), 0);
    }
}
