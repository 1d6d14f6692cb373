//! Bulk ingestion parsing for BrandGraph.
//!
//! Turns agent/LLM/workflow output into typed records in two steps:
//! 1. [`payload`] sniffs the payload shape and extracts the record array
//! 2. [`records`] decodes each element, skipping malformed ones with a reason
//!
//! A payload whose shape cannot be recognized fails the whole call with
//! [`BrandGraphError::MalformedPayload`](brandgraph_shared::BrandGraphError).

pub mod payload;
pub mod records;

pub use payload::{PayloadKind, describe_shape, extract_records, parse_payload};
pub use records::{
    Decoded, SkippedRecord, decode_relations, decode_scrape_urls, decode_theses, decode_web_pages,
};
