//! Organization theses and their review decisions.
//!
//! A new thesis is stamped as freshly proposed: status NULL, changed by `ai`.
//! Re-ingesting the same `(organization, level, thesis_html)` only refreshes
//! the supporting evidence, so review decisions survive regeneration.

use brandgraph_shared::{
    BrandGraphError, ContrarianLevel, Miss, MissReason, OrgRef, Outcome, Reportable, Result,
    StatusChangedBy, Thesis, ThesisInput, ThesisStatus, ThesisStatusChange, Vocabulary, new_id,
    read_vocabulary,
};
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, params};
use serde::Serialize;

use crate::organizations::require_org;
use crate::{
    Storage, col_opt_text, col_opt_ts, col_text, col_ts, finish, now_ts, parse_ts,
    query_opt_text, storage_err,
};

/// Per-element result of a thesis ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThesisIngestRow {
    pub id: String,
    pub contrarian_level: ContrarianLevel,
    pub was_newly_inserted: bool,
}

/// Result of a thesis review decision.
#[derive(Debug, Clone, Serialize)]
pub struct ThesisStatusUpdated {
    pub thesis_id: String,
    pub organization_id: String,
    pub status: ThesisStatus,
    pub status_changed_by: StatusChangedBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_changed_by_user_id: Option<String>,
    pub status_changed_at: DateTime<Utc>,
}

impl Reportable for ThesisStatusUpdated {
    fn message(&self) -> String {
        format!("thesis marked {}", self.status)
    }
}

impl Storage {
    /// Upsert theses for an organization, which must exist.
    pub async fn upsert_theses(
        &self,
        org: &OrgRef,
        inputs: &[ThesisInput],
    ) -> Result<Vec<ThesisIngestRow>> {
        let tx = self.begin().await?;
        let result = upsert_theses_in(&tx, org, inputs).await;
        finish(tx, result).await
    }

    /// Record a validated/denied decision on a thesis.
    pub async fn update_thesis_status(
        &self,
        thesis_id: &str,
        change: &ThesisStatusChange,
    ) -> Result<Outcome<ThesisStatusUpdated>> {
        let tx = self.begin().await?;
        let result = update_thesis_status_in(&tx, thesis_id, change).await;
        finish(tx, result).await
    }
}

async fn upsert_theses_in(
    conn: &Connection,
    org: &OrgRef,
    inputs: &[ThesisInput],
) -> Result<Vec<ThesisIngestRow>> {
    let organization_id = require_org(conn, org).await?;
    let mut rows = Vec::with_capacity(inputs.len());

    for input in inputs {
        let level = i64::from(input.contrarian_level);
        let existing = query_opt_text(
            conn,
            "SELECT t.id AS thesis_id FROM organization_theses t
              WHERE t.organization_id = ?1 AND t.contrarian_level = ?2 AND t.thesis_html = ?3",
            params![organization_id.as_str(), level, input.thesis_html.as_str()],
        )
        .await?;
        let was_newly_inserted = existing.is_none();
        let now = now_ts();

        let mut returned = conn
            .query(
                "INSERT INTO organization_theses
                    (id, organization_id, contrarian_level, thesis_html, supporting_evidence,
                     status, status_changed_by, status_changed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?7, ?7)
                 ON CONFLICT(organization_id, contrarian_level, thesis_html) DO UPDATE SET
                    supporting_evidence = COALESCE(excluded.supporting_evidence, organization_theses.supporting_evidence),
                    updated_at = excluded.updated_at
                 RETURNING id AS thesis_id",
                params![
                    new_id(),
                    organization_id.as_str(),
                    level,
                    input.thesis_html.as_str(),
                    input.supporting_evidence.as_deref(),
                    StatusChangedBy::Ai.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        let id = match returned.next().await.map_err(storage_err)? {
            Some(row) => col_text(&row, 0)?,
            None => {
                return Err(BrandGraphError::Storage("thesis upsert returned no id".into()));
            }
        };

        tracing::debug!(thesis_id = %id, level, was_newly_inserted, "thesis stored");
        rows.push(ThesisIngestRow {
            id,
            contrarian_level: input.contrarian_level,
            was_newly_inserted,
        });
    }
    Ok(rows)
}

async fn update_thesis_status_in(
    conn: &Connection,
    thesis_id: &str,
    change: &ThesisStatusChange,
) -> Result<Outcome<ThesisStatusUpdated>> {
    let user_id = change.changed_by.user_id();
    if let Some(user_id) = user_id {
        ensure_user(conn, user_id).await?;
    }

    let now = now_ts();
    let mut rows = conn
        .query(
            "UPDATE organization_theses
                SET status = ?1,
                    status_reason = ?2,
                    status_changed_by = ?3,
                    status_changed_by_user_id = ?4,
                    status_changed_at = ?5,
                    updated_at = ?5
              WHERE id = ?6
             RETURNING organization_id AS thesis_organization_id",
            params![
                change.status.as_str(),
                change.reason.as_deref(),
                change.changed_by.kind().as_str(),
                user_id,
                now.as_str(),
                thesis_id
            ],
        )
        .await
        .map_err(storage_err)?;

    let Some(row) = rows.next().await.map_err(storage_err)? else {
        return Ok(Err(Miss::new(
            MissReason::ThesisNotFound,
            format!("thesis {thesis_id} not found"),
        )
        .with("thesis_id", thesis_id)));
    };
    let organization_id = col_text(&row, 0)?;

    tracing::info!(thesis_id, %organization_id, status = change.status.as_str(), "thesis status updated");
    Ok(Ok(ThesisStatusUpdated {
        thesis_id: thesis_id.to_string(),
        organization_id,
        status: change.status,
        status_changed_by: change.changed_by.kind(),
        status_changed_by_user_id: user_id.map(str::to_string),
        status_changed_at: parse_ts(&now)?,
    }))
}

/// Make sure a workspace user row exists for a review decision.
async fn ensure_user(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, created_at) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
        params![user_id, now_ts()],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub(crate) const THESIS_SELECT: &str = "
SELECT t.id AS thesis_id,
       t.organization_id AS thesis_organization_id,
       t.contrarian_level AS thesis_contrarian_level,
       t.thesis_html AS thesis_html,
       t.supporting_evidence AS thesis_supporting_evidence,
       t.status AS thesis_status,
       t.status_reason AS thesis_status_reason,
       t.status_changed_by AS thesis_status_changed_by,
       t.status_changed_by_user_id AS thesis_status_changed_by_user_id,
       t.status_changed_at AS thesis_status_changed_at,
       t.created_at AS thesis_created_at,
       t.updated_at AS thesis_updated_at
  FROM organization_theses t";

pub(crate) fn row_to_thesis(row: &Row) -> Result<Thesis> {
    let level = row.get::<i64>(2).map_err(storage_err)?;
    Ok(Thesis {
        id: col_text(row, 0)?,
        organization_id: col_text(row, 1)?,
        contrarian_level: ContrarianLevel::new(level)?,
        thesis_html: col_text(row, 3)?,
        supporting_evidence: col_opt_text(row, 4),
        status: read_vocabulary::<ThesisStatus>(col_opt_text(row, 5).as_deref()),
        status_reason: col_opt_text(row, 6),
        status_changed_by: read_vocabulary::<StatusChangedBy>(col_opt_text(row, 7).as_deref()),
        status_changed_by_user_id: col_opt_text(row, 8),
        status_changed_at: col_opt_ts(row, 9)?,
        created_at: col_ts(row, 10)?,
        updated_at: col_ts(row, 11)?,
    })
}
