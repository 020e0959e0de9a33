//! Request description and the form state it is built from.
//!
//! # Design
//! `RequestForm` mirrors what the operator has typed so far and may hold
//! anything. `RequestSpec` is what comes out of `RequestForm::to_spec` once
//! the input passes validation: an immutable value whose constructor and
//! builder methods make an invalid request unrepresentable (no blank URL,
//! no body on GET/DELETE, no blank bearer token).

use reqwest::Url;
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::http::HttpMethod;

/// Immutable description of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    method: HttpMethod,
    url: Url,
    bearer_token: Option<String>,
    body: Option<String>,
}

impl RequestSpec {
    /// Parse `url` (surrounding whitespace ignored) into a spec with no token
    /// and no body.
    pub fn new(method: HttpMethod, url: &str) -> Result<Self, ValidationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::UrlRequired);
        }
        let url = Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            method,
            url,
            bearer_token: None,
            body: None,
        })
    }

    /// Attach a bearer token. The token is trimmed; a blank token clears it.
    pub fn with_bearer_token(mut self, token: &str) -> Self {
        let token = token.trim();
        self.bearer_token = (!token.is_empty()).then(|| token.to_string());
        self
    }

    /// Attach a JSON body. Ignored for methods that never carry one.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        if self.method.carries_body() {
            self.body = Some(body.into());
        }
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// Where the body of a POST/PUT/PATCH comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    /// Free-form JSON text, validated before sending.
    #[default]
    Raw,
    /// Key/value rows serialized to a flat JSON object of strings.
    Fields,
}

/// Current state of the request form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestForm {
    pub url: String,
    pub token: String,
    pub method: HttpMethod,
    pub body_mode: BodyMode,
    pub raw_body: String,
    pub rows: Vec<(String, String)>,
}

impl Default for RequestForm {
    /// POST with raw-JSON mode and one empty field row, the state a fresh
    /// form opens in.
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            method: HttpMethod::Post,
            body_mode: BodyMode::Raw,
            raw_body: String::new(),
            rows: vec![(String::new(), String::new())],
        }
    }
}

impl RequestForm {
    /// Validate the form and produce the next `RequestSpec`.
    ///
    /// Checks run in order and stop at the first failure: URL present, body
    /// valid (only for methods that carry one), URL parses.
    pub fn to_spec(&self) -> Result<RequestSpec, ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::UrlRequired);
        }

        let body = if self.method.carries_body() {
            Some(self.body_text()?)
        } else {
            None
        };

        let spec = RequestSpec::new(self.method, &self.url)?.with_bearer_token(&self.token);
        Ok(match body {
            Some(body) => spec.with_body(body),
            None => spec,
        })
    }

    fn body_text(&self) -> Result<String, ValidationError> {
        match self.body_mode {
            BodyMode::Raw => {
                let raw = self.raw_body.trim();
                if raw.is_empty() {
                    return Err(ValidationError::EmptyBody);
                }
                serde_json::from_str::<serde::de::IgnoredAny>(raw)
                    .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
                Ok(raw.to_string())
            }
            BodyMode::Fields => Ok(fields_to_json(&self.rows)),
        }
    }
}

/// Serialize key/value rows to a JSON object.
///
/// Keys and values are trimmed, rows with an empty key are dropped, and a
/// repeated key keeps its first position but takes the last value.
pub fn fields_to_json(rows: &[(String, String)]) -> String {
    let mut map = Map::new();
    for (key, value) in rows {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.trim().to_string()));
    }
    Value::Object(map).to_string()
}
