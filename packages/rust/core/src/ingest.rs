//! Bulk ingestion pipelines: raw payload → records → store → report.
//!
//! Every pipeline follows the same four steps:
//! 1. Resolve the payload shape into a record array (whole call fails on an
//!    unrecognized shape)
//! 2. Decode each element, setting malformed ones aside with a reason
//! 3. Write the decoded records in one storage transaction
//! 4. Summarize what was inserted, updated, and skipped

use std::time::{Duration, Instant};

use brandgraph_ingest::{
    Decoded, PayloadKind, SkippedRecord, decode_relations, decode_scrape_urls, decode_theses,
    decode_web_pages, parse_payload,
};
use brandgraph_shared::{OrgRef, PageDefaults, Result};
use brandgraph_storage::{
    PageIngestRow, RelationOutcome, RelationUpsertRow, ScrapeQueueRow, Storage, ThesisIngestRow,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Counts for one ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Which payload kind was ingested.
    pub kind: &'static str,
    /// Elements found in the payload array.
    pub received: usize,
    /// Rows created by this call.
    pub inserted: usize,
    /// Rows that already existed and were merged.
    pub updated: usize,
    /// Elements dropped during decoding or storage.
    pub skipped: usize,
    /// Wall-clock time of the whole call.
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Summary plus per-element detail.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport<R> {
    #[serde(flatten)]
    pub summary: IngestSummary,
    /// One row per stored element, in payload order.
    pub rows: Vec<R>,
    /// Why each skipped element was dropped, by payload index.
    pub skip_reasons: Vec<SkippedRecord>,
}

/// A stored row that knows whether it was created or merged.
pub trait IngestRow {
    fn was_new(&self) -> bool;
}

impl IngestRow for PageIngestRow {
    fn was_new(&self) -> bool {
        self.was_newly_inserted
    }
}

impl IngestRow for ScrapeQueueRow {
    fn was_new(&self) -> bool {
        self.was_new
    }
}

impl IngestRow for ThesisIngestRow {
    fn was_new(&self) -> bool {
        self.was_newly_inserted
    }
}

impl IngestRow for RelationUpsertRow {
    fn was_new(&self) -> bool {
        self.was_new
    }
}

impl<R: IngestRow> IngestReport<R> {
    fn build(
        kind: PayloadKind,
        received: usize,
        rows: Vec<R>,
        mut skip_reasons: Vec<SkippedRecord>,
        start: Instant,
    ) -> Self {
        skip_reasons.sort_by_key(|s| s.index);
        let inserted = rows.iter().filter(|r| r.was_new()).count();
        Self {
            summary: IngestSummary {
                kind: kind.as_str(),
                received,
                inserted,
                updated: rows.len() - inserted,
                skipped: skip_reasons.len(),
                elapsed: start.elapsed(),
            },
            rows,
            skip_reasons,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for long ingestion calls.
pub trait IngestProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the records are stored.
    fn done(&self, summary: &IngestSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl IngestProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _summary: &IngestSummary) {}
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

fn decode<T>(
    raw: &str,
    kind: PayloadKind,
    progress: &dyn IngestProgress,
    decoder: fn(&[serde_json::Value]) -> Decoded<T>,
) -> Result<(usize, Decoded<T>)> {
    progress.phase("Parsing payload");
    let records = parse_payload(raw, kind)?;
    debug!(kind = kind.as_str(), count = records.len(), "payload resolved");

    progress.phase("Decoding records");
    let decoded = decoder(&records);
    Ok((records.len(), decoded))
}

fn finish<R: IngestRow>(
    kind: PayloadKind,
    received: usize,
    rows: Vec<R>,
    skip_reasons: Vec<SkippedRecord>,
    start: Instant,
    progress: &dyn IngestProgress,
) -> IngestReport<R> {
    let report = IngestReport::build(kind, received, rows, skip_reasons, start);
    let s = &report.summary;
    info!(
        kind = s.kind,
        received = s.received,
        inserted = s.inserted,
        updated = s.updated,
        skipped = s.skipped,
        elapsed_ms = s.elapsed.as_millis(),
        "ingest complete"
    );
    progress.done(s);
    report
}

/// Ingest a web page payload.
///
/// `defaults` apply to first-time inserts only; re-ingesting a page never
/// resets a stored category or scrape flag.
#[instrument(skip_all, fields(payload_len = raw.len()))]
pub async fn ingest_web_pages(
    storage: &Storage,
    raw: &str,
    defaults: PageDefaults,
    progress: &dyn IngestProgress,
) -> Result<IngestReport<PageIngestRow>> {
    let start = Instant::now();
    let kind = PayloadKind::WebPages;
    let (received, decoded) = decode(raw, kind, progress, decode_web_pages)?;

    progress.phase("Storing web pages");
    let inputs: Vec<_> = decoded.records.into_iter().map(|(_, page)| page).collect();
    let rows = storage.ingest_web_pages(&inputs, defaults).await?;

    Ok(finish(kind, received, rows, decoded.skipped, start, progress))
}

/// Ingest a scrape-queue payload for pages under `domain`.
#[instrument(skip_all, fields(%domain, payload_len = raw.len()))]
pub async fn ingest_scrape_queue(
    storage: &Storage,
    raw: &str,
    domain: &str,
    progress: &dyn IngestProgress,
) -> Result<IngestReport<ScrapeQueueRow>> {
    let start = Instant::now();
    let kind = PayloadKind::ScrapeQueue;
    let (received, decoded) = decode(raw, kind, progress, decode_scrape_urls)?;

    progress.phase("Queueing URLs");
    let urls: Vec<_> = decoded.records.into_iter().map(|(_, url)| url).collect();
    let rows = storage.ingest_scrape_targets(domain, &urls).await?;

    Ok(finish(kind, received, rows, decoded.skipped, start, progress))
}

/// Ingest a thesis payload for one organization.
///
/// The organization must exist. Stored statuses are never taken from the
/// payload: new theses start out as freshly proposed.
#[instrument(skip_all, fields(%org, payload_len = raw.len()))]
pub async fn ingest_theses(
    storage: &Storage,
    raw: &str,
    org: &OrgRef,
    progress: &dyn IngestProgress,
) -> Result<IngestReport<ThesisIngestRow>> {
    let start = Instant::now();
    let kind = PayloadKind::Theses;
    let (received, decoded) = decode(raw, kind, progress, decode_theses)?;

    progress.phase("Storing theses");
    let inputs: Vec<_> = decoded.records.into_iter().map(|(_, thesis)| thesis).collect();
    let rows = storage.upsert_theses(org, &inputs).await?;

    Ok(finish(kind, received, rows, decoded.skipped, start, progress))
}

/// Ingest a relation payload, creating missing endpoint organizations.
///
/// Tuples the store refuses (self relations, conflicting domains) are
/// reported as skipped alongside the ones that failed to decode.
#[instrument(skip_all, fields(payload_len = raw.len()))]
pub async fn ingest_relations(
    storage: &Storage,
    raw: &str,
    progress: &dyn IngestProgress,
) -> Result<IngestReport<RelationUpsertRow>> {
    let start = Instant::now();
    let kind = PayloadKind::Relations;
    let (received, decoded) = decode(raw, kind, progress, decode_relations)?;

    progress.phase("Storing relations");
    let (indices, inputs): (Vec<_>, Vec<_>) = decoded.records.into_iter().unzip();
    let outcomes = storage.upsert_relations(&inputs).await?;

    let mut rows = Vec::with_capacity(outcomes.len());
    let mut skip_reasons = decoded.skipped;
    for (index, outcome) in indices.into_iter().zip(outcomes) {
        match outcome {
            RelationOutcome::Upserted(row) => rows.push(row),
            RelationOutcome::Skipped { reason } => {
                skip_reasons.push(SkippedRecord { index, reason });
            }
        }
    }

    Ok(finish(kind, received, rows, skip_reasons, start, progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandgraph_shared::{
        BrandGraphError, ExternalKey, OrganizationUpsert, PageCategory, RelationStatus, new_id,
    };

    async fn test_storage() -> Storage {
        let path = std::env::temp_dir().join(format!("bg_core_test_{}.db", new_id()));
        Storage::open(&path).await.unwrap()
    }

    #[tokio::test]
    async fn pages_reingest_keeps_category() {
        let storage = test_storage().await;
        storage
            .upsert_organization(&OrganizationUpsert {
                url: Some("https://example.com".into()),
                ..OrganizationUpsert::new(ExternalKey::workspace("org_example"))
            })
            .await
            .unwrap();

        let first = ingest_web_pages(
            &storage,
            r#"{"pages":[{"url":"https://Example.com/about/","page_category":"team"}]}"#,
            PageDefaults::default(),
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(first.summary.inserted, 1);
        assert_eq!(first.rows[0].normalized_url, "https://example.com/about");
        assert!(first.rows[0].was_newly_inserted);

        let second = ingest_web_pages(
            &storage,
            r#"[{"url":"https://example.com/about"}]"#,
            PageDefaults::default(),
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(second.summary.inserted, 0);
        assert_eq!(second.summary.updated, 1);
        assert_eq!(second.rows[0].id, first.rows[0].id);
        assert!(!second.rows[0].was_newly_inserted);

        storage
            .record_scraped_content("https://example.com/about", None, Some("About us"), None)
            .await
            .unwrap();
        let scraped = storage
            .scraped_pages(&OrgRef::Domain("example.com".into()))
            .await
            .unwrap();
        assert_eq!(scraped.len(), 1);
        assert_eq!(scraped[0].page.page_category, PageCategory::Team);
        assert!(scraped[0].page.should_scrape);
    }

    #[tokio::test]
    async fn wrapper_shapes_produce_identical_rows() {
        let storage = test_storage().await;
        let payloads = [
            r#"[{"url":"https://example.com/a"}]"#,
            r#"{"pages":[{"url":"https://example.com/a"}]}"#,
            r#"{"db_ready_output":[{"url":"https://example.com/a"}]}"#,
        ];
        let mut ids = Vec::new();
        for raw in payloads {
            let report = ingest_web_pages(&storage, raw, PageDefaults::default(), &SilentProgress)
                .await
                .unwrap();
            assert_eq!(report.rows.len(), 1);
            ids.push(report.rows[0].id.clone());
        }
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn malformed_elements_are_reported_not_fatal() {
        let storage = test_storage().await;
        let report = ingest_web_pages(
            &storage,
            r#"[{"url":"https://example.com/ok"}, 42, {"page_category":"team"}, {"url":"https://example.com/x","page_category":"nonsense"}]"#,
            PageDefaults::default(),
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(report.summary.received, 4);
        assert_eq!(report.summary.inserted, 1);
        assert_eq!(report.summary.skipped, 3);
        let indices: Vec<_> = report.skip_reasons.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unrecognized_shape_fails_whole_call() {
        let storage = test_storage().await;
        let err = ingest_web_pages(
            &storage,
            r#"{"foo": 1, "bar": []}"#,
            PageDefaults::default(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BrandGraphError::MalformedPayload { .. }));
    }

    #[tokio::test]
    async fn scrape_queue_dedups_by_normalized_url() {
        let storage = test_storage().await;
        let report = ingest_scrape_queue(
            &storage,
            r#"{"urls_to_scrape":["https://example.com/team/", {"url":"https://www.example.com/team"}]}"#,
            "example.com",
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(report.summary.received, 2);
        assert_eq!(report.summary.inserted, 1);
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.rows[0].id, report.rows[1].id);
    }

    #[tokio::test]
    async fn theses_require_known_org() {
        let storage = test_storage().await;
        let err = ingest_theses(
            &storage,
            r#"{"theses":[{"contrarian_level":3,"thesis_html":"<p>x</p>"}]}"#,
            &OrgRef::Workspace("org_missing".into()),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BrandGraphError::NotFound { .. }));
    }

    #[tokio::test]
    async fn theses_skip_out_of_range_levels() {
        let storage = test_storage().await;
        storage
            .upsert_organization(&OrganizationUpsert::new(ExternalKey::workspace("org_acme")))
            .await
            .unwrap();
        let org = OrgRef::Workspace("org_acme".into());
        let raw = r#"{"theses":[
            {"contrarian_level":3,"thesis_html":"<p>a</p>","status":"approved"},
            {"contrarian_level":11,"thesis_html":"<p>b</p>"}
        ]}"#;
        let report = ingest_theses(&storage, raw, &org, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.summary.inserted, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.skip_reasons[0].index, 1);

        let again = ingest_theses(&storage, raw, &org, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(again.summary.updated, 1);

        let stored = storage.organization_theses(&org, None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, None);
    }

    #[tokio::test]
    async fn relations_merge_decode_and_store_skips() {
        let storage = test_storage().await;
        let raw = r#"{"relations":[
            {"source":{"url":"https://acme.com","name":"Acme"},"target":"https://globex.com","status":"not_related"},
            {"source":"https://acme.com","target":"https://www.acme.com/"},
            {"target":"https://globex.com"}
        ]}"#;
        let report = ingest_relations(&storage, raw, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.summary.received, 3);
        assert_eq!(report.summary.inserted, 1);
        assert_eq!(report.summary.skipped, 2);
        let indices: Vec<_> = report.skip_reasons.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(report.rows[0].status, RelationStatus::NotRelated);

        let edge = storage
            .relation_between(
                &OrgRef::Domain("acme.com".into()),
                &OrgRef::Domain("globex.com".into()),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.status, RelationStatus::NotRelated);
    }
}
