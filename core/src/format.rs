//! Pretty-printing of response bodies for display.

use serde_json::Value;

/// Re-indent `raw` if it is JSON, keeping keys in document order and numbers
/// exactly as written. Anything that does not parse is returned unchanged.
///
/// A key repeated within one object is shown once, at its first position,
/// with the last value.
pub fn format_response(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| raw.to_string())
}
