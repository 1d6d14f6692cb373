//! Closed vocabularies stored as text columns.
//!
//! Each enum lists the values it accepts and, separately, values that were
//! once valid but are retired. Retired values are rejected at the parse
//! boundary with a distinct message; the schema itself stores plain text so
//! adding or retiring a value never needs an irreversible enum migration.

use serde::{Deserialize, Serialize};

use crate::error::{BrandGraphError, Result};

/// A closed set of string values with an explicit retired list.
pub trait Vocabulary: Sized + Copy + 'static {
    /// Human-readable name used in error messages.
    const KIND: &'static str;
    /// Every accepted value.
    const VARIANTS: &'static [Self];
    /// Values that were accepted in the past and must now be refused.
    const RETIRED: &'static [&'static str] = &[];

    fn as_str(&self) -> &'static str;
}

/// Parse a vocabulary value, refusing retired and unknown values.
pub fn parse_vocabulary<T: Vocabulary>(raw: &str) -> Result<T> {
    let needle = raw.trim().to_ascii_lowercase();
    if let Some(found) = T::VARIANTS.iter().find(|v| v.as_str() == needle) {
        return Ok(*found);
    }
    if T::RETIRED.contains(&needle.as_str()) {
        return Err(BrandGraphError::validation(format!(
            "{} '{needle}' is retired and can no longer be written",
            T::KIND
        )));
    }
    let accepted: Vec<&str> = T::VARIANTS.iter().map(|v| v.as_str()).collect();
    Err(BrandGraphError::validation(format!(
        "unknown {} '{raw}': expected one of {}",
        T::KIND,
        accepted.join(", ")
    )))
}

/// Read a stored value, tolerating rows written before a value was retired.
///
/// Returns `None` for retired or unknown text so reads never fail on legacy rows.
pub fn read_vocabulary<T: Vocabulary>(stored: Option<&str>) -> Option<T> {
    let stored = stored?;
    match parse_vocabulary::<T>(stored) {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(kind = T::KIND, value = stored, "ignoring unrecognized stored value");
            None
        }
    }
}

macro_rules! vocabulary_from_str {
    ($ty:ty) => {
        impl std::str::FromStr for $ty {
            type Err = BrandGraphError;

            fn from_str(s: &str) -> Result<Self> {
                parse_vocabulary(s)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Edge statuses
// ---------------------------------------------------------------------------

/// Status of an organization ↔ individual membership edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Ended,
    Hidden,
}

impl Vocabulary for MembershipStatus {
    const KIND: &'static str = "membership status";
    const VARIANTS: &'static [Self] = &[Self::Active, Self::Ended, Self::Hidden];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Hidden => "hidden",
        }
    }
}

vocabulary_from_str!(MembershipStatus);

/// Status of a directional organization → organization relation.
///
/// `NotRelated` records a checked negative: the pair was examined and found
/// unrelated, which is different from having no row at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationStatus {
    Active,
    Ended,
    Hidden,
    NotRelated,
}

impl Vocabulary for RelationStatus {
    const KIND: &'static str = "relation status";
    const VARIANTS: &'static [Self] = &[Self::Active, Self::Ended, Self::Hidden, Self::NotRelated];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Hidden => "hidden",
            Self::NotRelated => "not_related",
        }
    }
}

vocabulary_from_str!(RelationStatus);

/// Confidence attached to a membership or relation claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl Vocabulary for ConfidenceLevel {
    const KIND: &'static str = "confidence level";
    const VARIANTS: &'static [Self] = &[Self::Low, Self::Medium, Self::High];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

vocabulary_from_str!(ConfidenceLevel);

// ---------------------------------------------------------------------------
// Thesis status
// ---------------------------------------------------------------------------

/// Review decision on an organization thesis. A thesis with no status is
/// newly proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThesisStatus {
    Validated,
    Denied,
}

impl Vocabulary for ThesisStatus {
    const KIND: &'static str = "thesis status";
    const VARIANTS: &'static [Self] = &[Self::Validated, Self::Denied];
    const RETIRED: &'static [&'static str] = &["pending", "generating"];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Denied => "denied",
        }
    }
}

vocabulary_from_str!(ThesisStatus);

/// Who last changed a thesis status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChangedBy {
    Ai,
    User,
}

impl Vocabulary for StatusChangedBy {
    const KIND: &'static str = "status author";
    const VARIANTS: &'static [Self] = &[Self::Ai, Self::User];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::User => "user",
        }
    }
}

vocabulary_from_str!(StatusChangedBy);

// ---------------------------------------------------------------------------
// Generation status
// ---------------------------------------------------------------------------

/// In-progress markers for background generation. Idle is the absence of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Generating,
}

impl Vocabulary for GenerationStatus {
    const KIND: &'static str = "generation status";
    const VARIANTS: &'static [Self] = &[Self::Generating];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
        }
    }
}

vocabulary_from_str!(GenerationStatus);

// ---------------------------------------------------------------------------
// Page category
// ---------------------------------------------------------------------------

/// Content category assigned to a discovered web page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCategory {
    About,
    Team,
    Product,
    Pricing,
    Blog,
    News,
    Careers,
    Contact,
    Legal,
    Investors,
    CaseStudy,
    Other,
}

impl Vocabulary for PageCategory {
    const KIND: &'static str = "page category";
    const VARIANTS: &'static [Self] = &[
        Self::About,
        Self::Team,
        Self::Product,
        Self::Pricing,
        Self::Blog,
        Self::News,
        Self::Careers,
        Self::Contact,
        Self::Legal,
        Self::Investors,
        Self::CaseStudy,
        Self::Other,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::About => "about",
            Self::Team => "team",
            Self::Product => "product",
            Self::Pricing => "pricing",
            Self::Blog => "blog",
            Self::News => "news",
            Self::Careers => "careers",
            Self::Contact => "contact",
            Self::Legal => "legal",
            Self::Investors => "investors",
            Self::CaseStudy => "case_study",
            Self::Other => "other",
        }
    }
}

vocabulary_from_str!(PageCategory);
