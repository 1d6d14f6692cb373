//! Per-element decoding of extracted payload records.
//!
//! A malformed element is skipped with a reason; it never aborts the batch.
//! Shape detection has already succeeded by the time these run.

use brandgraph_canonical::normalize_url;
use brandgraph_shared::{
    ConfidenceLevel, ContrarianLevel, OrgSeed, PageCategory, RelationInput, RelationStatus,
    ThesisInput, Vocabulary, WebPageInput, parse_vocabulary,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::payload::describe_shape;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An element dropped during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// Position in the extracted array.
    pub index: usize,
    pub reason: String,
}

/// Decoded elements, each with its position in the payload array.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub records: Vec<(usize, T)>,
    pub skipped: Vec<SkippedRecord>,
}

fn decode_all<T>(
    records: &[Value],
    decode: impl Fn(&Value) -> Result<T, String>,
) -> Decoded<T> {
    let mut out = Decoded {
        records: Vec::with_capacity(records.len()),
        skipped: Vec::new(),
    };
    for (index, value) in records.iter().enumerate() {
        match decode(value) {
            Ok(record) => out.records.push((index, record)),
            Err(reason) => {
                tracing::warn!(index, %reason, "skipping malformed record");
                out.skipped.push(SkippedRecord { index, reason });
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn as_object(value: &Value) -> Result<&Map<String, Value>, String> {
    value
        .as_object()
        .ok_or_else(|| format!("expected an object, found {}", describe_shape(value)))
}

/// First non-null field among `names`, as trimmed non-empty text.
fn text_field(obj: &Map<String, Value>, names: &[&str]) -> Result<Option<String>, String> {
    for name in names {
        match obj.get(*name) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.trim().is_empty() => continue,
            Some(Value::String(s)) => return Ok(Some(s.trim().to_string())),
            Some(other) => {
                return Err(format!(
                    "field '{name}' must be a string, found {}",
                    describe_shape(other)
                ));
            }
        }
    }
    Ok(None)
}

fn vocabulary_field<T: Vocabulary>(
    obj: &Map<String, Value>,
    names: &[&str],
) -> Result<Option<T>, String> {
    match text_field(obj, names)? {
        Some(raw) => parse_vocabulary(&raw).map(Some).map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

fn url_of(raw: &str) -> Result<String, String> {
    if normalize_url(raw).is_none() {
        return Err(format!("'{raw}' is not a usable http(s) URL"));
    }
    Ok(raw.trim().to_string())
}

// ---------------------------------------------------------------------------
// Web pages
// ---------------------------------------------------------------------------

/// Decode web page records: `{"url", "page_category"?, "should_scrape"?}` or a bare URL string.
pub fn decode_web_pages(records: &[Value]) -> Decoded<WebPageInput> {
    decode_all(records, |value| {
        if let Value::String(raw) = value {
            return Ok(WebPageInput {
                url: url_of(raw)?,
                page_category: None,
                should_scrape: None,
            });
        }
        let obj = as_object(value)?;
        let url = text_field(obj, &["url"])?.ok_or("missing 'url'")?;
        let page_category =
            vocabulary_field::<PageCategory>(obj, &["page_category", "category"])?;
        let should_scrape = match obj.get("should_scrape") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                return Err(format!(
                    "field 'should_scrape' must be a boolean, found {}",
                    describe_shape(other)
                ));
            }
        };
        Ok(WebPageInput {
            url: url_of(&url)?,
            page_category,
            should_scrape,
        })
    })
}

// ---------------------------------------------------------------------------
// Scrape queue
// ---------------------------------------------------------------------------

/// Decode scrape-queue records: bare URL strings or `{"url"}` objects.
pub fn decode_scrape_urls(records: &[Value]) -> Decoded<String> {
    decode_all(records, |value| match value {
        Value::String(raw) => url_of(raw),
        other => {
            let obj = as_object(other)?;
            let url = text_field(obj, &["url"])?.ok_or("missing 'url'")?;
            url_of(&url)
        }
    })
}

// ---------------------------------------------------------------------------
// Theses
// ---------------------------------------------------------------------------

/// Decode thesis records: `{"contrarian_level", "thesis_html", "supporting_evidence"?}`.
///
/// Any caller-supplied `status` is ignored; status is stamped by the store.
pub fn decode_theses(records: &[Value]) -> Decoded<ThesisInput> {
    decode_all(records, |value| {
        let obj = as_object(value)?;
        let level = match obj.get("contrarian_level").or_else(|| obj.get("level")) {
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| format!("contrarian level {n} is not an integer"))?,
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("contrarian level '{s}' is not an integer"))?,
            Some(other) => {
                return Err(format!(
                    "contrarian level must be a number, found {}",
                    describe_shape(other)
                ));
            }
            None => return Err("missing 'contrarian_level'".into()),
        };
        let contrarian_level = ContrarianLevel::new(level).map_err(|e| e.to_string())?;
        let thesis_html =
            text_field(obj, &["thesis_html", "thesis"])?.ok_or("missing 'thesis_html'")?;
        if obj.contains_key("status") {
            tracing::debug!("ignoring caller-supplied thesis status");
        }
        Ok(ThesisInput {
            contrarian_level,
            thesis_html,
            supporting_evidence: text_field(obj, &["supporting_evidence", "evidence"])?,
        })
    })
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// Decode relation records.
///
/// Endpoints are nested (`"source": {"url", "name", "workspace_id"}`) or flat
/// (`"source_url"`, `"source_name"`, `"source_workspace_id"`).
pub fn decode_relations(records: &[Value]) -> Decoded<RelationInput> {
    decode_all(records, |value| {
        let obj = as_object(value)?;
        let source = seed(obj, "source")?;
        let target = seed(obj, "target")?;
        Ok(RelationInput {
            source,
            target,
            relation_type: text_field(obj, &["relation_type", "type"])?,
            confidence_level: vocabulary_field::<ConfidenceLevel>(
                obj,
                &["confidence_level", "confidence"],
            )?,
            confidence_rationale: text_field(obj, &["confidence_rationale", "rationale"])?,
            status: vocabulary_field::<RelationStatus>(obj, &["status"])?,
        })
    })
}

fn seed(obj: &Map<String, Value>, side: &str) -> Result<OrgSeed, String> {
    let seed = match obj.get(side) {
        Some(Value::Object(nested)) => OrgSeed {
            workspace_id: text_field(nested, &["workspace_id", "clerk_org_id"])?,
            url: text_field(nested, &["url"])?,
            name: text_field(nested, &["name"])?,
        },
        Some(Value::String(url)) => OrgSeed {
            url: Some(url.trim().to_string()),
            ..OrgSeed::default()
        },
        _ => {
            let workspace_key = format!("{side}_workspace_id");
            let url_key = format!("{side}_url");
            let name_key = format!("{side}_name");
            OrgSeed {
                workspace_id: text_field(obj, &[workspace_key.as_str()])?,
                url: text_field(obj, &[url_key.as_str()])?,
                name: text_field(obj, &[name_key.as_str()])?,
            }
        }
    };
    if seed.workspace_id.is_none() && seed.url.is_none() {
        return Err(format!("{side} needs a url or workspace_id"));
    }
    if let Some(url) = &seed.url {
        url_of(url)?;
    }
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn web_pages_accept_objects_and_strings() {
        let records = vec![
            json!({"url": "https://Example.com/about/", "page_category": "team"}),
            json!("https://example.com/pricing"),
            json!({"url": "https://example.com/blog", "should_scrape": false}),
        ];
        let decoded = decode_web_pages(&records);
        assert!(decoded.skipped.is_empty());
        assert_eq!(decoded.records.len(), 3);
        assert_eq!(decoded.records[0].1.page_category, Some(PageCategory::Team));
        assert_eq!(decoded.records[1].1.page_category, None);
        assert_eq!(decoded.records[2].1.should_scrape, Some(false));
    }

    #[test]
    fn web_pages_skip_malformed_elements() {
        let records = vec![
            json!({"url": "https://example.com/ok"}),
            json!(42),
            json!({"page_category": "team"}),
            json!({"url": "mailto:x@example.com"}),
            json!({"url": "https://example.com/x", "page_category": "misc"}),
            json!({"url": "https://example.com/y", "should_scrape": "yes"}),
        ];
        let decoded = decode_web_pages(&records);
        assert_eq!(decoded.records.len(), 1);
        let indexes: Vec<usize> = decoded.skipped.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
        assert!(decoded.skipped[3].reason.contains("unknown page category"));
    }

    #[test]
    fn scrape_urls_accept_strings_and_objects() {
        let records = vec![json!("https://example.com/a"), json!({"url": "example.com/b"}), json!(null)];
        let decoded = decode_scrape_urls(&records);
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.skipped.len(), 1);
        assert_eq!(decoded.records[1].1, "example.com/b");
    }

    #[test]
    fn theses_validate_level_and_ignore_status() {
        let records = vec![
            json!({"contrarian_level": 3, "thesis_html": "<p>A</p>", "supporting_evidence": "E", "status": "validated"}),
            json!({"level": "7", "thesis": "<p>B</p>"}),
            json!({"contrarian_level": 12, "thesis_html": "<p>C</p>"}),
            json!({"contrarian_level": 2}),
        ];
        let decoded = decode_theses(&records);
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.records[0].1.contrarian_level.get(), 3);
        assert_eq!(decoded.records[1].1.contrarian_level.get(), 7);
        assert_eq!(decoded.records[1].1.supporting_evidence, None);
        assert!(decoded.skipped[0].reason.contains("out of range"));
        assert!(decoded.skipped[1].reason.contains("thesis_html"));
    }

    #[test]
    fn relations_accept_nested_and_flat_endpoints() {
        let records = vec![
            json!({
                "source": {"url": "https://acme.com", "name": "Acme"},
                "target": {"workspace_id": "org_2"},
                "relation_type": "competitor",
                "confidence_level": "high",
            }),
            json!({
                "source_url": "https://acme.com",
                "target_url": "https://globex.com",
                "status": "not_related",
            }),
            json!({"source_url": "https://acme.com"}),
        ];
        let decoded = decode_relations(&records);
        assert_eq!(decoded.records.len(), 2);
        let first = &decoded.records[0].1;
        assert_eq!(first.source.name.as_deref(), Some("Acme"));
        assert_eq!(first.target.workspace_id.as_deref(), Some("org_2"));
        assert_eq!(first.confidence_level, Some(ConfidenceLevel::High));
        assert_eq!(decoded.records[1].1.status, Some(RelationStatus::NotRelated));
        assert!(decoded.skipped[0].reason.contains("target needs a url"));
    }
}
