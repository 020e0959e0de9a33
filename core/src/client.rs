//! Stateless request builder and response checks for one exchange.
//!
//! # Design
//! Everything the transport decides about an exchange that does not need a
//! socket lives here: the header set, the body, the status rule and the
//! body post-processing. `HttpTransport` calls these in order
//! (`build_request` → send → `check_status` → read → `decode_body`), and the
//! unit tests below pin the rules down without any I/O.

use crate::compat::decode_html_entities;
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http::{self, HttpRequest};
use crate::request::RequestSpec;

/// Resolve `spec` into the exact request to send.
///
/// Rejects anything but absolute `http`/`https` URLs.
pub fn build_request(spec: &RequestSpec, config: &ClientConfig) -> Result<HttpRequest, TransportError> {
    let url = spec.url();
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(TransportError::InvalidUrl(format!("not an http(s) URL: {url}")));
    }

    let mut headers = vec![
        (http::USER_AGENT.to_string(), config.user_agent.clone()),
        (http::ACCEPT.to_string(), http::APPLICATION_JSON.to_string()),
    ];
    if let Some(token) = spec.bearer_token() {
        headers.push((http::AUTHORIZATION.to_string(), format!("Bearer {}", token.trim())));
    }
    if spec.body().is_some() {
        headers.push((http::CONTENT_TYPE.to_string(), http::APPLICATION_JSON.to_string()));
    }

    Ok(HttpRequest {
        method: spec.method(),
        url: url.to_string(),
        headers,
        body: spec.body().map(str::to_string),
    })
}

/// Map a non-2xx status to `NonSuccessStatus`.
pub fn check_status(code: u16, reason: Option<&str>) -> Result<(), TransportError> {
    if (200..300).contains(&code) {
        return Ok(());
    }
    Err(TransportError::NonSuccessStatus {
        code,
        reason: reason.unwrap_or_default().to_string(),
    })
}

/// Post-process a successful body: the text with HTML entities decoded, or
/// `None` when the decoded text is blank.
pub fn decode_body(raw: &str) -> Option<String> {
    let decoded = decode_html_entities(raw);
    if decoded.trim().is_empty() {
        return None;
    }
    Some(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn spec(method: HttpMethod, url: &str) -> RequestSpec {
        RequestSpec::new(method, url).unwrap()
    }

    #[test]
    fn get_sends_user_agent_and_accept_only() {
        let req = build_request(&spec(HttpMethod::Get, "https://api.example.com/dni/1"), &ClientConfig::default()).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "https://api.example.com/dni/1");
        assert_eq!(req.header(http::ACCEPT), Some("application/json"));
        assert!(req.header(http::USER_AGENT).is_some());
        assert!(req.header(http::AUTHORIZATION).is_none());
        assert!(req.header(http::CONTENT_TYPE).is_none());
        assert!(req.body.is_none());
    }

    #[test]
    fn post_with_token_and_body() {
        let spec = spec(HttpMethod::Post, "https://api.example.com/dni")
            .with_bearer_token(" secret ")
            .with_body(r#"{"dni":"1"}"#);
        let req = build_request(&spec, &ClientConfig::default()).unwrap();
        assert_eq!(req.header(http::AUTHORIZATION), Some("Bearer secret"));
        assert_eq!(req.header(http::CONTENT_TYPE), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(r#"{"dni":"1"}"#));
    }

    #[test]
    fn custom_user_agent_is_used() {
        let config = ClientConfig::default().with_user_agent("ConsultaDNI/2.0");
        let req = build_request(&spec(HttpMethod::Delete, "http://localhost/x"), &config).unwrap();
        assert_eq!(req.header(http::USER_AGENT), Some("ConsultaDNI/2.0"));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = build_request(&spec(HttpMethod::Get, "ftp://files.example.com/a"), &ClientConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));

        let err = build_request(&spec(HttpMethod::Get, "mailto:someone@example.com"), &ClientConfig::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn any_2xx_passes() {
        for code in [200, 201, 204, 299] {
            assert!(check_status(code, None).is_ok(), "{code}");
        }
    }

    #[test]
    fn not_found_carries_reason() {
        let err = check_status(404, Some("Not Found")).unwrap_err();
        assert_eq!(
            err,
            TransportError::NonSuccessStatus {
                code: 404,
                reason: "Not Found".to_string()
            }
        );
        assert!(err.to_string().starts_with("HTTP 404"));
    }

    #[test]
    fn redirect_and_server_errors_fail() {
        assert!(check_status(304, Some("Not Modified")).is_err());
        assert!(matches!(
            check_status(503, None),
            Err(TransportError::NonSuccessStatus { code: 503, .. })
        ));
    }

    #[test]
    fn blank_body_is_none() {
        assert_eq!(decode_body(""), None);
        assert_eq!(decode_body(" \r\n\t "), None);
    }

    #[test]
    fn body_blank_after_decoding_is_none() {
        assert_eq!(decode_body("&nbsp;"), None);
        assert_eq!(decode_body(" &#32;&#9; "), None);
        assert_eq!(decode_body("&nbsp;x").as_deref(), Some("\u{a0}x"));
    }

    #[test]
    fn body_entities_are_decoded() {
        assert_eq!(
            decode_body(r#"{"apellido":"MU&Ntilde;OZ"}"#).as_deref(),
            Some(r#"{"apellido":"MUÑOZ"}"#)
        );
    }

    #[test]
    fn empty_json_object_is_a_body() {
        assert_eq!(decode_body("{}").as_deref(), Some("{}"));
    }
}
