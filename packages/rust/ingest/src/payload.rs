//! Payload shape-sniffing.
//!
//! Agent and workflow output reaches us in several shapes:
//! - a direct array: `[...]`
//! - a named wrapper: `{"pages": [...]}`, `{"theses": [...]}`, `{"urls_to_scrape": [...]}`
//! - a workflow envelope: `{"db_ready_output": [...]}`
//! - a raw model response: `{"candidates":[{"content":{"parts":[{"text":"[...]"}]}}]}`
//!   whose text is itself serialized JSON, often inside a markdown code fence
//!
//! [`extract_records`] resolves whichever shape arrived into the record array.

use std::sync::LazyLock;

use brandgraph_shared::{BrandGraphError, Result};
use regex::Regex;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Payload kinds
// ---------------------------------------------------------------------------

/// Which ingestion target a payload feeds. Each kind has its own wrapper fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    WebPages,
    ScrapeQueue,
    Theses,
    Relations,
}

impl PayloadKind {
    /// Wrapper fields checked after the direct-array case, in priority order.
    pub fn wrapper_fields(&self) -> &'static [&'static str] {
        match self {
            Self::WebPages => &["pages", "db_ready_output"],
            Self::ScrapeQueue => &["urls_to_scrape", "db_ready_output"],
            Self::Theses => &["theses"],
            Self::Relations => &["relations", "db_ready_output"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebPages => "web pages",
            Self::ScrapeQueue => "scrape queue",
            Self::Theses => "theses",
            Self::Relations => "relations",
        }
    }
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches a fenced block: ```` ```json\n...\n``` ````.
static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```").expect("code fence regex")
});

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Parse a raw payload string and extract its record array.
pub fn parse_payload(raw: &str, kind: PayloadKind) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|e| {
        BrandGraphError::validation(format!("{} payload is not valid JSON: {e}", kind.as_str()))
    })?;
    extract_records(value, kind)
}

/// Resolve an already-parsed payload into its record array.
///
/// Order: direct array, wrapper fields in [`PayloadKind::wrapper_fields`] order,
/// then the model-response envelope (whose text gets a second parse pass).
pub fn extract_records(value: Value, kind: PayloadKind) -> Result<Vec<Value>> {
    let observed = describe_shape(&value);

    let value = match resolve_direct(value, kind)? {
        Resolved::Records(records) => return Ok(records),
        Resolved::Unmatched(value) => value,
    };

    if let Some(text) = envelope_text(&value) {
        tracing::debug!(kind = kind.as_str(), "unwrapping model response envelope");
        let inner = parse_embedded_json(text).ok_or_else(|| {
            BrandGraphError::malformed(format!(
                "model response envelope whose text is not JSON ({observed})"
            ))
        })?;
        let inner_observed = describe_shape(&inner);
        return match resolve_direct(inner, kind)? {
            Resolved::Records(records) => Ok(records),
            Resolved::Unmatched(_) => Err(BrandGraphError::malformed(format!(
                "model response envelope containing {inner_observed}"
            ))),
        };
    }

    Err(BrandGraphError::malformed(observed))
}

enum Resolved {
    Records(Vec<Value>),
    Unmatched(Value),
}

/// Check the direct-array case, then each wrapper field.
fn resolve_direct(value: Value, kind: PayloadKind) -> Result<Resolved> {
    let mut obj = match value {
        Value::Array(records) => return Ok(Resolved::Records(records)),
        Value::Object(obj) => obj,
        other => return Ok(Resolved::Unmatched(other)),
    };

    for field in kind.wrapper_fields() {
        let Some(inner) = obj.remove(*field) else {
            continue;
        };
        tracing::debug!(kind = kind.as_str(), field, "payload wrapped in field");
        return match inner {
            Value::Array(records) => Ok(Resolved::Records(records)),
            // Workflow engines sometimes hand over the array pre-serialized.
            Value::String(text) => match parse_embedded_json(&text) {
                Some(Value::Array(records)) => Ok(Resolved::Records(records)),
                Some(other) => Err(BrandGraphError::malformed(format!(
                    "field '{field}' holding serialized {}",
                    describe_shape(&other)
                ))),
                None => Err(BrandGraphError::malformed(format!(
                    "field '{field}' holding a non-JSON string"
                ))),
            },
            other => Err(BrandGraphError::malformed(format!(
                "field '{field}' holding {}",
                describe_shape(&other)
            ))),
        };
    }

    Ok(Resolved::Unmatched(Value::Object(obj)))
}

/// Text of `candidates[0].content.parts[0].text`, when present.
fn envelope_text(value: &Value) -> Option<&str> {
    value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

/// Parse JSON embedded in model text, tolerating a surrounding code fence.
fn parse_embedded_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let caps = CODE_FENCE_RE.captures(trimmed)?;
    serde_json::from_str(caps[1].trim()).ok()
}

/// Describe a value's top-level structure for error messages.
pub fn describe_shape(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(_) => "a boolean".into(),
        Value::Number(_) => "a number".into(),
        Value::String(_) => "a string".into(),
        Value::Array(items) => format!("an array of {} items", items.len()),
        Value::Object(obj) if obj.is_empty() => "an empty object".into(),
        Value::Object(obj) => {
            let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!([{"url": "https://example.com/about"}, {"url": "https://example.com/team"}])
    }

    #[test]
    fn direct_array() {
        let records = extract_records(sample(), PayloadKind::WebPages).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn wrapped_shapes_are_equivalent() {
        let direct = extract_records(sample(), PayloadKind::WebPages).unwrap();
        let pages = extract_records(json!({ "pages": sample() }), PayloadKind::WebPages).unwrap();
        let workflow =
            extract_records(json!({ "db_ready_output": sample() }), PayloadKind::WebPages).unwrap();
        assert_eq!(direct, pages);
        assert_eq!(direct, workflow);
    }

    #[test]
    fn wrapper_priority_is_fixed() {
        let payload = json!({
            "db_ready_output": [{"url": "https://b.example.com"}],
            "pages": [{"url": "https://a.example.com"}],
        });
        let records = extract_records(payload, PayloadKind::WebPages).unwrap();
        assert_eq!(records[0]["url"], "https://a.example.com");
    }

    #[test]
    fn wrappers_are_kind_specific() {
        let payload = json!({ "pages": sample() });
        let err = extract_records(payload, PayloadKind::Theses).unwrap_err();
        assert!(err.to_string().contains("object with keys [pages]"));
    }

    #[test]
    fn model_envelope_with_code_fence() {
        let text = "Here you go:\n```json\n[{\"url\": \"https://example.com/x\"}]\n```";
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        });
        let records = extract_records(payload, PayloadKind::WebPages).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["url"], "https://example.com/x");
    }

    #[test]
    fn model_envelope_with_wrapped_text() {
        let text = r#"{"urls_to_scrape": ["https://example.com/a", "https://example.com/b"]}"#;
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        });
        let records = extract_records(payload, PayloadKind::ScrapeQueue).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn serialized_wrapper_field_gets_second_pass() {
        let payload = json!({ "db_ready_output": "[{\"url\":\"https://example.com\"}]" });
        let records = extract_records(payload, PayloadKind::WebPages).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn unrecognized_object_names_its_keys() {
        let err = parse_payload(r#"{"foo": [], "bar": 1}"#, PayloadKind::WebPages).unwrap_err();
        assert!(matches!(err, BrandGraphError::MalformedPayload { .. }));
        assert!(err.to_string().contains("object with keys [bar, foo]"));
    }

    #[test]
    fn wrapper_holding_non_array_is_rejected() {
        let err = parse_payload(r#"{"pages": {"url": "x"}}"#, PayloadKind::WebPages).unwrap_err();
        assert!(err.to_string().contains("field 'pages' holding object with keys [url]"));
    }

    #[test]
    fn envelope_text_must_resolve_to_array() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"answer\": 42}" }] } }]
        });
        let err = extract_records(payload, PayloadKind::WebPages).unwrap_err();
        assert!(err.to_string().contains("object with keys [answer]"));
    }

    #[test]
    fn invalid_json_is_a_validation_error() {
        let err = parse_payload("[{", PayloadKind::Theses).unwrap_err();
        assert!(matches!(err, BrandGraphError::Validation { .. }));
    }

    #[test]
    fn scalar_payload_is_malformed() {
        let err = parse_payload("\"hello\"", PayloadKind::WebPages).unwrap_err();
        assert!(err.to_string().contains("a string"));
    }
}
