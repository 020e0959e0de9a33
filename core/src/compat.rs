//! Upstream compatibility fixes applied to response bodies.
//!
//! The DNI lookup provider this tool was first pointed at entity-escapes
//! characters inside JSON string values (`"JOS&Eacute;"`), so bodies are
//! HTML-decoded before they are shown. This is a quirk of that provider, not
//! a JSON rule, and the formatter knows nothing about it.

use std::borrow::Cow;

/// Decode named and numeric HTML entities in `raw`.
pub fn decode_html_entities(raw: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(raw)
}
