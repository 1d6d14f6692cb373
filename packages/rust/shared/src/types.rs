//! Core domain types for the BrandGraph entity graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BrandGraphError, Result};
use crate::status::{ConfidenceLevel, GenerationStatus, MembershipStatus, RelationStatus};

/// Generate a new time-sortable entity identifier.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

// ---------------------------------------------------------------------------
// Organization identity
// ---------------------------------------------------------------------------

/// External identifier schemes mapped onto the internal organization id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalScheme {
    /// Workspace organization id (`clerk_org_id`).
    Workspace,
    /// Pre-workspace external id. Accepted during the migration only.
    Legacy,
}

impl ExternalScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Legacy => "legacy",
        }
    }
}

/// The conflict key of an organization upsert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalKey {
    pub scheme: ExternalScheme,
    pub id: String,
}

impl ExternalKey {
    pub fn workspace(id: impl Into<String>) -> Self {
        Self {
            scheme: ExternalScheme::Workspace,
            id: id.into(),
        }
    }

    pub fn legacy(id: impl Into<String>) -> Self {
        Self {
            scheme: ExternalScheme::Legacy,
            id: id.into(),
        }
    }
}

/// Any identifier a caller may use to reference an organization.
///
/// Textual form: `id:<uuid>`, `workspace:<id>`, `legacy:<id>`, `domain:<host>`.
/// A bare UUID is read as an internal id; any other bare value as a workspace id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrgRef {
    Id(String),
    Workspace(String),
    Legacy(String),
    Domain(String),
}

impl OrgRef {
    /// The raw identifier value without its scheme.
    pub fn value(&self) -> &str {
        match self {
            Self::Id(v) | Self::Workspace(v) | Self::Legacy(v) | Self::Domain(v) => v,
        }
    }
}

impl std::fmt::Display for OrgRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(v) => write!(f, "id:{v}"),
            Self::Workspace(v) => write!(f, "workspace:{v}"),
            Self::Legacy(v) => write!(f, "legacy:{v}"),
            Self::Domain(v) => write!(f, "domain:{v}"),
        }
    }
}

impl std::str::FromStr for OrgRef {
    type Err = BrandGraphError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BrandGraphError::validation("empty organization identifier"));
        }
        let parsed = match s.split_once(':') {
            Some(("id", v)) => Self::Id(v.to_string()),
            Some(("workspace", v)) => Self::Workspace(v.to_string()),
            Some(("legacy", v)) => Self::Legacy(v.to_string()),
            Some(("domain", v)) => Self::Domain(v.to_string()),
            _ if Uuid::parse_str(s).is_ok() => Self::Id(s.to_string()),
            _ => Self::Workspace(s.to_string()),
        };
        if parsed.value().is_empty() {
            return Err(BrandGraphError::validation(format!(
                "organization identifier '{s}' has no value"
            )));
        }
        Ok(parsed)
    }
}

// ---------------------------------------------------------------------------
// Organization
// ---------------------------------------------------------------------------

/// A stored organization ("brand").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Hostname derived from `url`; unique among non-null values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offerings: Option<String>,
    /// Workspace id (`clerk_org_id`) from the alias crosswalk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Deprecated external id from the alias crosswalk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GenerationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generating_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact organization reference embedded in graph views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Input to an organization upsert. `None` fields never overwrite stored values.
#[derive(Debug, Clone)]
pub struct OrganizationUpsert {
    pub key: ExternalKey,
    pub name: Option<String>,
    pub url: Option<String>,
    pub linkedin_url: Option<String>,
    pub bio: Option<String>,
    pub mission: Option<String>,
    pub offerings: Option<String>,
}

impl OrganizationUpsert {
    pub fn new(key: ExternalKey) -> Self {
        Self {
            key,
            name: None,
            url: None,
            linkedin_url: None,
            bio: None,
            mission: None,
            offerings: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Individuals and memberships
// ---------------------------------------------------------------------------

/// A person, merged across collectors by LinkedIn URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub id: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub linkedin_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to the composite individual + membership upsert.
#[derive(Debug, Clone)]
pub struct IndividualUpsert {
    pub first_name: String,
    pub last_name: Option<String>,
    pub linkedin_url: String,
    pub website: Option<String>,
    pub role: Option<String>,
    /// Kept only when provided; an absent value preserves the stored one.
    pub joined_at: Option<DateTime<Utc>>,
    pub confidence_level: Option<ConfidenceLevel>,
    pub confidence_rationale: Option<String>,
}

/// Ids resolved by an individual + membership upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipIds {
    pub individual_id: String,
    pub organization_id: String,
}

/// The organization ↔ individual edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub organization_id: String,
    pub individual_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_rationale: Option<String>,
    pub status: MembershipStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_at: Option<DateTime<Utc>>,
}

/// An individual together with their membership edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub individual: Individual,
    pub membership: Membership,
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// How a relation endpoint is found or created.
///
/// Resolution order: workspace id, then canonical domain of `url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgSeed {
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One tuple of a bulk relation upsert.
#[derive(Debug, Clone)]
pub struct RelationInput {
    pub source: OrgSeed,
    pub target: OrgSeed,
    pub relation_type: Option<String>,
    pub confidence_level: Option<ConfidenceLevel>,
    pub confidence_rationale: Option<String>,
    pub status: Option<RelationStatus>,
}

/// A directional organization → organization edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source_organization_id: String,
    pub target_organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_rationale: Option<String>,
    pub status: RelationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_changed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// An outbound relation with its target organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedOrganization {
    pub relation: RelationEdge,
    pub target: OrganizationSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_ref_parses_schemes() {
        assert_eq!(
            "workspace:org_2abc".parse::<OrgRef>().unwrap(),
            OrgRef::Workspace("org_2abc".into())
        );
        assert_eq!(
            "legacy:4411".parse::<OrgRef>().unwrap(),
            OrgRef::Legacy("4411".into())
        );
        assert_eq!(
            "domain:example.com".parse::<OrgRef>().unwrap(),
            OrgRef::Domain("example.com".into())
        );
    }

    #[test]
    fn bare_org_ref_uses_uuid_heuristic() {
        let id = new_id();
        assert_eq!(id.parse::<OrgRef>().unwrap(), OrgRef::Id(id.clone()));
        assert_eq!(
            "org_2abc".parse::<OrgRef>().unwrap(),
            OrgRef::Workspace("org_2abc".into())
        );
    }

    #[test]
    fn org_ref_rejects_empty_values() {
        assert!("".parse::<OrgRef>().is_err());
        assert!("workspace:".parse::<OrgRef>().is_err());
    }

    #[test]
    fn org_ref_display_roundtrip() {
        let r = OrgRef::Legacy("77".into());
        assert_eq!(r.to_string().parse::<OrgRef>().unwrap(), r);
    }
}
