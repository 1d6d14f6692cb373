//! Orchestration for BrandGraph.
//!
//! Ties the payload parser and the storage layer together into end-to-end
//! ingestion pipelines (parse, decode, store, report) and composes the
//! storage read accessors into whole-organization views.

pub mod graph;
pub mod ingest;
