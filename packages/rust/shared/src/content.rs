//! Web content and thesis types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BrandGraphError, Result};
use crate::status::{PageCategory, StatusChangedBy, ThesisStatus};

// ---------------------------------------------------------------------------
// Web pages
// ---------------------------------------------------------------------------

/// A discovered web page, identified by its normalized URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPage {
    pub id: String,
    /// URL as first reported by a collector.
    pub url: String,
    pub normalized_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub page_category: PageCategory,
    pub should_scrape: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One decoded web page record from an ingestion payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WebPageInput {
    pub url: String,
    pub page_category: Option<PageCategory>,
    pub should_scrape: Option<bool>,
}

/// Content fetched by the crawler for a normalized URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedContent {
    pub normalized_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// A web page joined with its scraped content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub page: WebPage,
    pub content: ScrapedContent,
}

/// Queue-style result: empty is distinguishable from a failed lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQueue {
    pub urls: Vec<String>,
    pub count: usize,
}

impl PageQueue {
    pub fn new(urls: Vec<String>) -> Self {
        let count = urls.len();
        Self { urls, count }
    }
}

// ---------------------------------------------------------------------------
// LinkedIn articles
// ---------------------------------------------------------------------------

/// An article published by an individual on LinkedIn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInArticle {
    pub id: String,
    pub individual_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Input to an article upsert keyed by article URL.
#[derive(Debug, Clone)]
pub struct ArticleUpsert {
    pub individual_id: String,
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Theses
// ---------------------------------------------------------------------------

/// Ordinal tier (1–10) under which theses are generated and tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ContrarianLevel(u8);

impl ContrarianLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(level: i64) -> Result<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&level) {
            Ok(Self(level as u8))
        } else {
            Err(BrandGraphError::validation(format!(
                "contrarian level {level} out of range {}..={}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ContrarianLevel {
    type Error = BrandGraphError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ContrarianLevel> for i64 {
    fn from(level: ContrarianLevel) -> Self {
        i64::from(level.0)
    }
}

impl std::fmt::Display for ContrarianLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContrarianLevel {
    type Err = BrandGraphError;

    fn from_str(s: &str) -> Result<Self> {
        let n: i64 = s
            .trim()
            .parse()
            .map_err(|_| BrandGraphError::validation(format!("invalid contrarian level '{s}'")))?;
        Self::new(n)
    }
}

/// A stored organization thesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thesis {
    pub id: String,
    pub organization_id: String,
    pub contrarian_level: ContrarianLevel,
    pub thesis_html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supporting_evidence: Option<String>,
    /// `None` means newly proposed, not yet reviewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ThesisStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_by: Option<StatusChangedBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_by_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One decoded thesis record from an ingestion payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ThesisInput {
    pub contrarian_level: ContrarianLevel,
    pub thesis_html: String,
    pub supporting_evidence: Option<String>,
}

/// Who is recording a thesis review decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedBy {
    Ai,
    /// A workspace user id.
    User(String),
}

impl ChangedBy {
    pub fn kind(&self) -> StatusChangedBy {
        match self {
            Self::Ai => StatusChangedBy::Ai,
            Self::User(_) => StatusChangedBy::User,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Ai => None,
            Self::User(id) => Some(id),
        }
    }
}

/// A review decision on a thesis.
#[derive(Debug, Clone)]
pub struct ThesisStatusChange {
    pub status: ThesisStatus,
    pub reason: Option<String>,
    pub changed_by: ChangedBy,
}
