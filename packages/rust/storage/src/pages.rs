//! Web pages, scrape queue placeholders, and scraped content.
//!
//! Every row here is keyed by the canonical URL from `brandgraph-canonical`.
//! The page `domain` is derived from that URL in the same statement that
//! writes the row.

use brandgraph_canonical::{extract_hostname, normalize_url};
use brandgraph_shared::{
    BrandGraphError, PageCategory, PageDefaults, Result, ScrapedContent, Vocabulary, WebPage,
    WebPageInput, new_id, read_vocabulary,
};
use libsql::{Connection, Row, params};
use serde::Serialize;

use crate::{
    Storage, col_opt_text, col_text, col_ts, finish, now_ts, query_opt_text, storage_err,
};

/// Per-element result of a web page ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageIngestRow {
    pub url: String,
    pub normalized_url: String,
    pub id: String,
    pub was_newly_inserted: bool,
}

/// Per-element result of a scrape-queue ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeQueueRow {
    /// Normalized URL of the queued page.
    pub url: String,
    pub id: String,
    pub was_new: bool,
}

/// Canonical identity of a page URL: `(normalized_url, domain)`.
fn page_identity(raw: &str) -> Result<(String, Option<String>)> {
    let normalized = normalize_url(raw)
        .ok_or_else(|| BrandGraphError::validation(format!("'{raw}' is not a usable http(s) URL")))?;
    let domain = extract_hostname(&normalized);
    Ok((normalized, domain))
}

impl Storage {
    /// Insert or update web pages keyed by normalized URL.
    ///
    /// `defaults` apply on first insert only; later writes coalesce
    /// `page_category` and `should_scrape`. Results are in input order.
    pub async fn ingest_web_pages(
        &self,
        inputs: &[WebPageInput],
        defaults: PageDefaults,
    ) -> Result<Vec<PageIngestRow>> {
        let tx = self.begin().await?;
        let result = ingest_web_pages_in(&tx, inputs, defaults).await;
        finish(tx, result).await
    }

    /// Queue URLs for scraping under `domain`. Already-queued URLs are reported, not duplicated.
    pub async fn ingest_scrape_targets(
        &self,
        domain: &str,
        urls: &[String],
    ) -> Result<Vec<ScrapeQueueRow>> {
        let domain = extract_hostname(domain)
            .ok_or_else(|| BrandGraphError::validation(format!("'{domain}' is not a usable domain")))?;
        let tx = self.begin().await?;
        let result = ingest_scrape_targets_in(&tx, &domain, urls).await;
        finish(tx, result).await
    }

    /// Record crawler output for a page. A later scrape replaces the earlier one.
    ///
    /// Returns the normalized URL the content is stored under.
    pub async fn record_scraped_content(
        &self,
        url: &str,
        raw_payload: Option<&str>,
        text: Option<&str>,
        markup: Option<&str>,
    ) -> Result<String> {
        let (normalized, _) = page_identity(url)?;
        let tx = self.begin().await?;
        let result = tx
            .execute(
                "INSERT INTO scraped_content (normalized_url, raw_payload, text, markup, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(normalized_url) DO UPDATE SET
                    raw_payload = excluded.raw_payload,
                    text = excluded.text,
                    markup = excluded.markup,
                    scraped_at = excluded.scraped_at",
                params![normalized.as_str(), raw_payload, text, markup, now_ts()],
            )
            .await
            .map_err(storage_err);
        finish(tx, result).await?;
        tracing::debug!(url = %normalized, "scraped content recorded");
        Ok(normalized)
    }
}

async fn ingest_web_pages_in(
    conn: &Connection,
    inputs: &[WebPageInput],
    defaults: PageDefaults,
) -> Result<Vec<PageIngestRow>> {
    let mut rows = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (normalized, domain) = page_identity(&input.url)?;
        let existing = query_opt_text(
            conn,
            "SELECT wp.id AS page_id FROM web_pages wp WHERE wp.normalized_url = ?1",
            params![normalized.as_str()],
        )
        .await?;
        let was_newly_inserted = existing.is_none();
        let now = now_ts();

        let id = match existing {
            Some(id) => {
                conn.execute(
                    // url keeps the first reported spelling; domain derives from the shared key.
                    "UPDATE web_pages
                        SET page_category = COALESCE(?1, web_pages.page_category),
                            should_scrape = COALESCE(?2, web_pages.should_scrape),
                            updated_at = ?3
                      WHERE web_pages.id = ?4",
                    params![
                        input.page_category.map(|c| c.as_str()),
                        input.should_scrape.map(i64::from),
                        now.as_str(),
                        id.as_str()
                    ],
                )
                .await
                .map_err(storage_err)?;
                id
            }
            None => {
                let id = new_id();
                let category = input.page_category.unwrap_or(defaults.page_category);
                let should_scrape = input.should_scrape.unwrap_or(defaults.should_scrape);
                conn.execute(
                    "INSERT INTO web_pages
                        (id, url, normalized_url, domain, page_category, should_scrape, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                     ON CONFLICT(normalized_url) DO NOTHING",
                    params![
                        id.as_str(),
                        input.url.as_str(),
                        normalized.as_str(),
                        domain.as_deref(),
                        category.as_str(),
                        i64::from(should_scrape),
                        now.as_str()
                    ],
                )
                .await
                .map_err(storage_err)?;
                id
            }
        };

        tracing::debug!(url = %normalized, was_newly_inserted, "web page stored");
        rows.push(PageIngestRow {
            url: input.url.clone(),
            normalized_url: normalized,
            id,
            was_newly_inserted,
        });
    }
    Ok(rows)
}

async fn ingest_scrape_targets_in(
    conn: &Connection,
    domain: &str,
    urls: &[String],
) -> Result<Vec<ScrapeQueueRow>> {
    let mut rows = Vec::with_capacity(urls.len());
    for url in urls {
        let (normalized, _) = page_identity(url)?;
        let existing = query_opt_text(
            conn,
            "SELECT st.id AS target_id FROM scrape_targets st WHERE st.url = ?1",
            params![normalized.as_str()],
        )
        .await?;

        let row = match existing {
            Some(id) => ScrapeQueueRow {
                url: normalized,
                id,
                was_new: false,
            },
            None => {
                let id = new_id();
                conn.execute(
                    "INSERT INTO scrape_targets (id, url, domain, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![id.as_str(), normalized.as_str(), domain, now_ts()],
                )
                .await
                .map_err(storage_err)?;
                ScrapeQueueRow {
                    url: normalized,
                    id,
                    was_new: true,
                }
            }
        };
        tracing::debug!(url = %row.url, was_new = row.was_new, "scrape target queued");
        rows.push(row);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Page + scraped content columns. Read with [`row_to_web_page`] and [`row_to_scraped_content`] at offset 8.
pub(crate) const SCRAPED_PAGE_SELECT: &str = "
SELECT wp.id AS page_id,
       wp.url AS page_url,
       wp.normalized_url AS page_normalized_url,
       wp.domain AS page_domain,
       wp.page_category AS page_category,
       wp.should_scrape AS page_should_scrape,
       wp.created_at AS page_created_at,
       wp.updated_at AS page_updated_at,
       sc.normalized_url AS content_normalized_url,
       sc.raw_payload AS content_raw_payload,
       sc.text AS content_text,
       sc.markup AS content_markup,
       sc.scraped_at AS content_scraped_at
  FROM web_pages wp
  JOIN scraped_content sc ON sc.normalized_url = wp.normalized_url";

pub(crate) fn row_to_web_page(row: &Row) -> Result<WebPage> {
    Ok(WebPage {
        id: col_text(row, 0)?,
        url: col_text(row, 1)?,
        normalized_url: col_text(row, 2)?,
        domain: col_opt_text(row, 3),
        page_category: read_vocabulary::<PageCategory>(col_opt_text(row, 4).as_deref())
            .unwrap_or(PageCategory::Other),
        should_scrape: row.get::<i64>(5).map_err(storage_err)? != 0,
        created_at: col_ts(row, 6)?,
        updated_at: col_ts(row, 7)?,
    })
}

pub(crate) fn row_to_scraped_content(row: &Row, offset: i32) -> Result<ScrapedContent> {
    Ok(ScrapedContent {
        normalized_url: col_text(row, offset)?,
        raw_payload: col_opt_text(row, offset + 1),
        text: col_opt_text(row, offset + 2),
        markup: col_opt_text(row, offset + 3),
        scraped_at: col_ts(row, offset + 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_storage;

    fn page(url: &str, category: Option<PageCategory>, should_scrape: Option<bool>) -> WebPageInput {
        WebPageInput {
            url: url.into(),
            page_category: category,
            should_scrape,
        }
    }

    #[tokio::test]
    async fn first_insert_applies_defaults() {
        let storage = test_storage().await;
        let rows = storage
            .ingest_web_pages(&[page("https://acme.com/about/", None, None)], PageDefaults::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].was_newly_inserted);
        assert_eq!(rows[0].normalized_url, "https://acme.com/about");
        assert_eq!(rows[0].url, "https://acme.com/about/");
    }

    #[tokio::test]
    async fn reingest_keeps_first_reported_url() {
        let storage = test_storage().await;
        storage
            .ingest_web_pages(&[page("https://acme.com/about/", None, None)], PageDefaults::default())
            .await
            .unwrap();
        storage
            .ingest_web_pages(
                &[page("http://www.acme.com/about", Some(PageCategory::Team), None)],
                PageDefaults::default(),
            )
            .await
            .unwrap();

        let stored = query_opt_text(
            &storage.conn,
            "SELECT wp.url AS page_url FROM web_pages wp WHERE wp.normalized_url = ?1",
            params!["https://acme.com/about"],
        )
        .await
        .unwrap();
        assert_eq!(stored.as_deref(), Some("https://acme.com/about/"));
        let domain = query_opt_text(
            &storage.conn,
            "SELECT wp.domain AS page_domain FROM web_pages wp WHERE wp.normalized_url = ?1",
            params!["https://acme.com/about"],
        )
        .await
        .unwrap();
        assert_eq!(domain.as_deref(), Some("acme.com"));
    }

    #[tokio::test]
    async fn equivalent_urls_share_one_row() {
        let storage = test_storage().await;
        let rows = storage
            .ingest_web_pages(
                &[
                    page("http://www.acme.com/team/?utm_source=x", Some(PageCategory::Team), None),
                    page("https://acme.com/team", None, Some(false)),
                ],
                PageDefaults::default(),
            )
            .await
            .unwrap();
        assert!(rows[0].was_newly_inserted);
        assert!(!rows[1].was_newly_inserted);
        assert_eq!(rows[0].id, rows[1].id);

        let again = storage
            .ingest_web_pages(&[page("acme.com/team", None, None)], PageDefaults::default())
            .await
            .unwrap();
        assert!(!again[0].was_newly_inserted);
        assert_eq!(again[0].id, rows[0].id);
    }

    #[tokio::test]
    async fn updates_coalesce_category_and_flag() {
        let storage = test_storage().await;
        let defaults = PageDefaults::default();
        storage
            .ingest_web_pages(&[page("https://acme.com/pricing", Some(PageCategory::Pricing), Some(false))], defaults)
            .await
            .unwrap();
        storage
            .ingest_web_pages(&[page("https://acme.com/pricing", None, None)], defaults)
            .await
            .unwrap();
        storage
            .record_scraped_content("https://acme.com/pricing", None, Some("Plans"), None)
            .await
            .unwrap();

        let org = brandgraph_shared::OrganizationUpsert {
            url: Some("https://acme.com".into()),
            ..brandgraph_shared::OrganizationUpsert::new(brandgraph_shared::ExternalKey::workspace("org_acme"))
        };
        storage.upsert_organization(&org).await.unwrap();
        let pages = storage
            .scraped_pages(&brandgraph_shared::OrgRef::Workspace("org_acme".into()))
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page.page_category, PageCategory::Pricing);
        assert!(!pages[0].page.should_scrape);
        assert_eq!(pages[0].content.text.as_deref(), Some("Plans"));
    }

    #[tokio::test]
    async fn scrape_targets_are_not_duplicated() {
        let storage = test_storage().await;
        let urls = vec![
            "https://acme.com/blog/post-1".to_string(),
            "http://www.acme.com/blog/post-1/".to_string(),
        ];
        let rows = storage.ingest_scrape_targets("acme.com", &urls).await.unwrap();
        assert!(rows[0].was_new);
        assert!(!rows[1].was_new);
        assert_eq!(rows[0].id, rows[1].id);
        assert_eq!(rows[0].url, "https://acme.com/blog/post-1");
    }

    #[tokio::test]
    async fn unusable_url_aborts_the_call() {
        let storage = test_storage().await;
        let err = storage
            .ingest_web_pages(
                &[page("https://acme.com/a", None, None), page("mailto:x@acme.com", None, None)],
                PageDefaults::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrandGraphError::Validation { .. }));
        let rows = storage
            .ingest_web_pages(&[page("https://acme.com/a", None, None)], PageDefaults::default())
            .await
            .unwrap();
        assert!(rows[0].was_newly_inserted, "failed batch must roll back");
    }

    #[tokio::test]
    async fn rescrape_replaces_content() {
        let storage = test_storage().await;
        let key = storage
            .record_scraped_content("https://www.acme.com/", Some("{}"), Some("v1"), None)
            .await
            .unwrap();
        assert_eq!(key, "https://acme.com");
        storage
            .record_scraped_content("https://acme.com", None, Some("v2"), Some("<p>v2</p>"))
            .await
            .unwrap();

        let mut rows = storage
            .conn
            .query(
                "SELECT sc.text AS content_text, sc.raw_payload AS content_raw_payload FROM scraped_content sc",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(col_opt_text(&row, 0).as_deref(), Some("v2"));
        assert_eq!(col_opt_text(&row, 1), None);
        assert!(rows.next().await.unwrap().is_none());
    }
}
