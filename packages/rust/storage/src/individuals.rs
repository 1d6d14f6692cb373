//! Individuals and their membership edges.

use brandgraph_canonical::normalize_url;
use brandgraph_shared::{
    BrandGraphError, ConfidenceLevel, Individual, IndividualUpsert, Member, Membership,
    MembershipIds, MembershipStatus, Miss, MissReason, OrgRef, Outcome, Reportable, Result,
    Vocabulary, new_id, read_vocabulary,
};
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, params};
use serde::Serialize;

use crate::organizations::{require_org, resolve_org};
use crate::{
    Storage, col_opt_text, col_opt_ts, col_text, col_ts, finish, now_ts, parse_ts, storage_err,
    ts,
};

/// Result of a membership status change.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipStatusChange {
    pub organization_id: String,
    pub individual_id: String,
    pub status: MembershipStatus,
    pub status_changed_at: DateTime<Utc>,
}

impl Reportable for MembershipStatusChange {
    fn message(&self) -> String {
        format!("membership status set to {}", self.status)
    }
}

impl Storage {
    /// Upsert an individual by LinkedIn URL and link them to an organization.
    ///
    /// The organization must already exist. The edge's `status` is never
    /// touched here; `joined_at` is kept only when provided.
    pub async fn upsert_individual_with_membership(
        &self,
        org: &OrgRef,
        input: &IndividualUpsert,
    ) -> Result<MembershipIds> {
        let tx = self.begin().await?;
        let result = upsert_with_membership_in(&tx, org, input).await;
        finish(tx, result).await
    }

    /// Change the status of an existing membership edge.
    pub async fn update_membership_status(
        &self,
        org: &OrgRef,
        individual_id: &str,
        status: MembershipStatus,
    ) -> Result<Outcome<MembershipStatusChange>> {
        let tx = self.begin().await?;
        let result = update_membership_status_in(&tx, org, individual_id, status).await;
        finish(tx, result).await
    }
}

async fn upsert_with_membership_in(
    conn: &Connection,
    org: &OrgRef,
    input: &IndividualUpsert,
) -> Result<MembershipIds> {
    let organization_id = require_org(conn, org).await?;

    let first_name = input.first_name.trim();
    if first_name.is_empty() {
        return Err(BrandGraphError::validation("individual first_name is required"));
    }
    let linkedin_url = normalize_url(&input.linkedin_url).ok_or_else(|| {
        BrandGraphError::validation(format!(
            "'{}' is not a usable LinkedIn URL",
            input.linkedin_url
        ))
    })?;
    let now = now_ts();

    let mut rows = conn
        .query(
            "INSERT INTO individuals (id, first_name, last_name, linkedin_url, website, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(linkedin_url) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = COALESCE(excluded.last_name, individuals.last_name),
                website = COALESCE(excluded.website, individuals.website),
                updated_at = excluded.updated_at
             RETURNING id AS individual_id",
            params![
                new_id(),
                first_name,
                input.last_name.as_deref(),
                linkedin_url.as_str(),
                input.website.as_deref(),
                now.as_str()
            ],
        )
        .await
        .map_err(storage_err)?;
    let individual_id = match rows.next().await.map_err(storage_err)? {
        Some(row) => col_text(&row, 0)?,
        None => return Err(BrandGraphError::Storage("individual upsert returned no id".into())),
    };
    drop(rows);

    let joined_at = input.joined_at.as_ref().map(ts);
    conn.execute(
        "INSERT INTO organization_individuals
            (organization_id, individual_id, role, joined_at, confidence_level,
             confidence_rationale, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(organization_id, individual_id) DO UPDATE SET
            role = COALESCE(excluded.role, organization_individuals.role),
            joined_at = COALESCE(excluded.joined_at, organization_individuals.joined_at),
            confidence_level = COALESCE(excluded.confidence_level, organization_individuals.confidence_level),
            confidence_rationale = COALESCE(excluded.confidence_rationale, organization_individuals.confidence_rationale),
            updated_at = excluded.updated_at",
        params![
            organization_id.as_str(),
            individual_id.as_str(),
            input.role.as_deref(),
            joined_at,
            input.confidence_level.map(|c| c.as_str()),
            input.confidence_rationale.as_deref(),
            now.as_str()
        ],
    )
    .await
    .map_err(storage_err)?;

    tracing::debug!(%organization_id, %individual_id, "membership upserted");
    Ok(MembershipIds {
        individual_id,
        organization_id,
    })
}

async fn update_membership_status_in(
    conn: &Connection,
    org: &OrgRef,
    individual_id: &str,
    status: MembershipStatus,
) -> Result<Outcome<MembershipStatusChange>> {
    let Some(organization_id) = resolve_org(conn, org).await? else {
        return Ok(Err(Miss::new(
            MissReason::OrganizationNotFound,
            format!("organization {org} not found"),
        )
        .with("organization", org.to_string())
        .with("individual_id", individual_id)));
    };

    let now = now_ts();
    let changed = conn
        .execute(
            "UPDATE organization_individuals
                SET status = ?1, status_changed_at = ?2, updated_at = ?2
              WHERE organization_id = ?3 AND individual_id = ?4",
            params![status.as_str(), now.as_str(), organization_id.as_str(), individual_id],
        )
        .await
        .map_err(storage_err)?;

    if changed == 0 {
        return Ok(Err(Miss::new(
            MissReason::MembershipNotFound,
            format!("individual {individual_id} is not a member of organization {org}"),
        )
        .with("organization_id", organization_id)
        .with("individual_id", individual_id)));
    }

    tracing::info!(%organization_id, individual_id, status = status.as_str(), "membership status updated");
    Ok(Ok(MembershipStatusChange {
        organization_id,
        individual_id: individual_id.to_string(),
        status,
        status_changed_at: parse_ts(&now)?,
    }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Individual + edge columns. Read with [`row_to_member`].
pub(crate) const MEMBER_SELECT: &str = "
SELECT i.id AS individual_id,
       i.first_name AS individual_first_name,
       i.last_name AS individual_last_name,
       i.linkedin_url AS individual_linkedin_url,
       i.website AS individual_website,
       i.created_at AS individual_created_at,
       i.updated_at AS individual_updated_at,
       m.organization_id AS membership_organization_id,
       m.role AS membership_role,
       m.joined_at AS membership_joined_at,
       m.confidence_level AS membership_confidence_level,
       m.confidence_rationale AS membership_confidence_rationale,
       m.status AS membership_status,
       m.status_changed_at AS membership_status_changed_at
  FROM organization_individuals m
  JOIN individuals i ON i.id = m.individual_id";

pub(crate) fn row_to_member(row: &Row) -> Result<Member> {
    let individual = Individual {
        id: col_text(row, 0)?,
        first_name: col_text(row, 1)?,
        last_name: col_opt_text(row, 2),
        linkedin_url: col_text(row, 3)?,
        website: col_opt_text(row, 4),
        created_at: col_ts(row, 5)?,
        updated_at: col_ts(row, 6)?,
    };
    let membership = Membership {
        organization_id: col_text(row, 7)?,
        individual_id: individual.id.clone(),
        role: col_opt_text(row, 8),
        joined_at: col_opt_ts(row, 9)?,
        confidence_level: read_vocabulary::<ConfidenceLevel>(col_opt_text(row, 10).as_deref()),
        confidence_rationale: col_opt_text(row, 11),
        status: read_vocabulary::<MembershipStatus>(col_opt_text(row, 12).as_deref())
            .unwrap_or(MembershipStatus::Active),
        status_changed_at: col_opt_ts(row, 13)?,
    };
    Ok(Member {
        individual,
        membership,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_storage;
    use brandgraph_shared::{ExternalKey, OrganizationUpsert};

    async fn seeded() -> (Storage, String) {
        let storage = test_storage().await;
        let mut input = OrganizationUpsert::new(ExternalKey::workspace("org_acme"));
        input.url = Some("https://acme.com".into());
        let id = storage.upsert_organization(&input).await.unwrap();
        (storage, id)
    }

    fn jane() -> IndividualUpsert {
        IndividualUpsert {
            first_name: "Jane".into(),
            last_name: Some("Doe".into()),
            linkedin_url: "https://www.linkedin.com/in/janedoe/".into(),
            website: None,
            role: Some("CEO".into()),
            joined_at: None,
            confidence_level: Some(ConfidenceLevel::High),
            confidence_rationale: None,
        }
    }

    fn acme() -> OrgRef {
        OrgRef::Workspace("org_acme".into())
    }

    #[tokio::test]
    async fn upsert_requires_existing_org() {
        let storage = test_storage().await;
        let err = storage
            .upsert_individual_with_membership(&OrgRef::Workspace("org_none".into()), &jane())
            .await
            .unwrap_err();
        assert!(matches!(err, BrandGraphError::NotFound { entity: "organization", .. }));
    }

    #[tokio::test]
    async fn merges_individual_by_linkedin_url() {
        let (storage, org_id) = seeded().await;
        let first = storage
            .upsert_individual_with_membership(&acme(), &jane())
            .await
            .unwrap();
        assert_eq!(first.organization_id, org_id);

        let mut again = jane();
        again.linkedin_url = "http://linkedin.com/in/janedoe".into();
        again.last_name = None;
        again.role = None;
        let second = storage
            .upsert_individual_with_membership(&acme(), &again)
            .await
            .unwrap();
        assert_eq!(second, first);

        let members = storage.organization_members(&acme(), false).await.unwrap();
        assert_eq!(members.len(), 1);
        let member = &members[0];
        assert_eq!(member.individual.last_name.as_deref(), Some("Doe"));
        assert_eq!(member.membership.role.as_deref(), Some("CEO"));
        assert_eq!(member.membership.joined_at, None);
        assert_eq!(member.membership.status, MembershipStatus::Active);
    }

    #[tokio::test]
    async fn upsert_preserves_membership_status() {
        let (storage, _) = seeded().await;
        let ids = storage
            .upsert_individual_with_membership(&acme(), &jane())
            .await
            .unwrap();
        storage
            .update_membership_status(&acme(), &ids.individual_id, MembershipStatus::Ended)
            .await
            .unwrap()
            .expect("edge exists");

        storage
            .upsert_individual_with_membership(&acme(), &jane())
            .await
            .unwrap();
        let members = storage.organization_members(&acme(), true).await.unwrap();
        assert_eq!(members[0].membership.status, MembershipStatus::Ended);
    }

    #[tokio::test]
    async fn joined_at_kept_only_when_provided() {
        let (storage, _) = seeded().await;
        let joined = DateTime::parse_from_rfc3339("2021-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut input = jane();
        input.joined_at = Some(joined);
        storage
            .upsert_individual_with_membership(&acme(), &input)
            .await
            .unwrap();
        storage
            .upsert_individual_with_membership(&acme(), &jane())
            .await
            .unwrap();

        let members = storage.organization_members(&acme(), false).await.unwrap();
        assert_eq!(members[0].membership.joined_at, Some(joined));
    }

    #[tokio::test]
    async fn status_update_soft_misses() {
        let (storage, _) = seeded().await;

        let miss = storage
            .update_membership_status(
                &OrgRef::Workspace("org_none".into()),
                "ind-1",
                MembershipStatus::Hidden,
            )
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(miss.reason, MissReason::OrganizationNotFound);
        assert_eq!(miss.echo.get("individual_id").map(String::as_str), Some("ind-1"));

        let miss = storage
            .update_membership_status(&acme(), "ind-1", MembershipStatus::Hidden)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(miss.reason, MissReason::MembershipNotFound);
    }

    #[tokio::test]
    async fn status_update_is_repeatable() {
        let (storage, _) = seeded().await;
        let ids = storage
            .upsert_individual_with_membership(&acme(), &jane())
            .await
            .unwrap();
        for _ in 0..2 {
            let change = storage
                .update_membership_status(&acme(), &ids.individual_id, MembershipStatus::Hidden)
                .await
                .unwrap()
                .expect("edge exists");
            assert_eq!(change.status, MembershipStatus::Hidden);
        }
        assert!(storage.organization_members(&acme(), false).await.unwrap().is_empty());
        assert_eq!(storage.organization_members(&acme(), true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_unusable_linkedin_url() {
        let (storage, _) = seeded().await;
        let mut input = jane();
        input.linkedin_url = "not a url".into();
        let err = storage
            .upsert_individual_with_membership(&acme(), &input)
            .await
            .unwrap_err();
        assert!(matches!(err, BrandGraphError::Validation { .. }));
    }
}
