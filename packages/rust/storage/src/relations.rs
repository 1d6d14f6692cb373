//! Directional organization relations.
//!
//! `not_related` is stored like any other status: it records that someone
//! looked and decided the two organizations are unrelated, which is different
//! from having no edge at all.

use brandgraph_shared::{
    BrandGraphError, ConfidenceLevel, Miss, MissReason, OrgRef, Outcome, RelationEdge,
    RelationInput, RelationStatus, Reportable, Result, Vocabulary, read_vocabulary,
};
use chrono::{DateTime, Utc};
use libsql::{Connection, Row, params};
use serde::Serialize;

use crate::organizations::{resolve_or_create_seed, resolve_org};
use crate::{
    Storage, col_opt_text, col_opt_ts, col_text, col_ts, finish, is_element_error, now_ts,
    parse_ts, query_opt_text, storage_err,
};

/// The edge written for one input tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationUpsertRow {
    pub source_organization_id: String,
    pub target_organization_id: String,
    pub status: RelationStatus,
    pub was_new: bool,
}

/// Per-element result of a bulk relation upsert, aligned with the input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationOutcome {
    Upserted(RelationUpsertRow),
    Skipped { reason: String },
}

/// Result of a relation status change.
#[derive(Debug, Clone, Serialize)]
pub struct RelationStatusChange {
    pub source_organization_id: String,
    pub target_organization_id: String,
    pub status: RelationStatus,
    pub status_changed_at: DateTime<Utc>,
}

impl Reportable for RelationStatusChange {
    fn message(&self) -> String {
        format!("relation status set to {}", self.status)
    }
}

impl Storage {
    /// Resolve-or-create both endpoints of each tuple and upsert the edge.
    ///
    /// The whole batch is one transaction. A tuple that cannot be written
    /// (self relation, unusable endpoint, domain conflict) is rolled back to
    /// its savepoint and reported as skipped; the rest of the batch proceeds.
    pub async fn upsert_relations(&self, inputs: &[RelationInput]) -> Result<Vec<RelationOutcome>> {
        let tx = self.begin().await?;
        let result = upsert_relations_in(&tx, inputs).await;
        finish(tx, result).await
    }

    /// Change the status of an existing relation edge.
    pub async fn update_relation_status(
        &self,
        source: &OrgRef,
        target: &OrgRef,
        status: RelationStatus,
    ) -> Result<Outcome<RelationStatusChange>> {
        let tx = self.begin().await?;
        let result = update_relation_status_in(&tx, source, target, status).await;
        finish(tx, result).await
    }
}

async fn upsert_relations_in(
    conn: &Connection,
    inputs: &[RelationInput],
) -> Result<Vec<RelationOutcome>> {
    let mut outcomes = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        conn.execute("SAVEPOINT relation_item", ())
            .await
            .map_err(storage_err)?;
        match upsert_one(conn, input).await {
            Ok(row) => {
                conn.execute("RELEASE relation_item", ())
                    .await
                    .map_err(storage_err)?;
                tracing::debug!(
                    index,
                    source = %row.source_organization_id,
                    target = %row.target_organization_id,
                    "relation upserted"
                );
                outcomes.push(RelationOutcome::Upserted(row));
            }
            Err(e) if is_element_error(&e) => {
                conn.execute("ROLLBACK TO relation_item", ())
                    .await
                    .map_err(storage_err)?;
                conn.execute("RELEASE relation_item", ())
                    .await
                    .map_err(storage_err)?;
                tracing::warn!(index, error = %e, "skipping relation");
                outcomes.push(RelationOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcomes)
}

async fn upsert_one(conn: &Connection, input: &RelationInput) -> Result<RelationUpsertRow> {
    let source = resolve_or_create_seed(conn, &input.source).await?;
    let target = resolve_or_create_seed(conn, &input.target).await?;
    if source == target {
        return Err(BrandGraphError::validation(format!(
            "relation source and target are the same organization ({source})"
        )));
    }

    let was_new = query_opt_text(
        conn,
        "SELECT r.source_organization_id AS relation_source_id
           FROM organization_relations r
          WHERE r.source_organization_id = ?1 AND r.target_organization_id = ?2",
        params![source.as_str(), target.as_str()],
    )
    .await?
    .is_none();

    let now = now_ts();
    let status = input.status.map(|s| s.as_str());
    let mut rows = conn
        .query(
            "INSERT INTO organization_relations
                (source_organization_id, target_organization_id, relation_type, confidence_level,
                 confidence_rationale, status, status_changed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 'active'), ?7, ?8, ?8)
             ON CONFLICT(source_organization_id, target_organization_id) DO UPDATE SET
                relation_type = COALESCE(excluded.relation_type, organization_relations.relation_type),
                confidence_level = COALESCE(excluded.confidence_level, organization_relations.confidence_level),
                confidence_rationale = COALESCE(excluded.confidence_rationale, organization_relations.confidence_rationale),
                status = COALESCE(?6, organization_relations.status),
                status_changed_at = CASE
                    WHEN ?6 IS NOT NULL AND ?6 <> organization_relations.status THEN excluded.updated_at
                    ELSE organization_relations.status_changed_at
                END,
                updated_at = excluded.updated_at
             RETURNING status AS relation_status",
            params![
                source.as_str(),
                target.as_str(),
                input.relation_type.as_deref(),
                input.confidence_level.map(|c| c.as_str()),
                input.confidence_rationale.as_deref(),
                status,
                status.map(|_| now.as_str()),
                now.as_str()
            ],
        )
        .await
        .map_err(storage_err)?;
    let stored = match rows.next().await.map_err(storage_err)? {
        Some(row) => col_opt_text(&row, 0),
        None => None,
    };

    Ok(RelationUpsertRow {
        source_organization_id: source,
        target_organization_id: target,
        status: read_vocabulary(stored.as_deref()).unwrap_or(RelationStatus::Active),
        was_new,
    })
}

async fn update_relation_status_in(
    conn: &Connection,
    source: &OrgRef,
    target: &OrgRef,
    status: RelationStatus,
) -> Result<Outcome<RelationStatusChange>> {
    let echo = |miss: Miss| {
        miss.with("source", source.to_string())
            .with("target", target.to_string())
    };
    let Some(source_id) = resolve_org(conn, source).await? else {
        return Ok(Err(echo(Miss::new(
            MissReason::OrganizationNotFound,
            format!("source organization {source} not found"),
        ))));
    };
    let Some(target_id) = resolve_org(conn, target).await? else {
        return Ok(Err(echo(Miss::new(
            MissReason::OrganizationNotFound,
            format!("target organization {target} not found"),
        ))));
    };

    let now = now_ts();
    let changed = conn
        .execute(
            "UPDATE organization_relations
                SET status = ?1, status_changed_at = ?2, updated_at = ?2
              WHERE source_organization_id = ?3 AND target_organization_id = ?4",
            params![status.as_str(), now.as_str(), source_id.as_str(), target_id.as_str()],
        )
        .await
        .map_err(storage_err)?;
    if changed == 0 {
        return Ok(Err(echo(Miss::new(
            MissReason::RelationNotFound,
            format!("no relation from {source} to {target}"),
        ))));
    }

    tracing::info!(source = %source_id, target = %target_id, status = status.as_str(), "relation status updated");
    Ok(Ok(RelationStatusChange {
        source_organization_id: source_id,
        target_organization_id: target_id,
        status,
        status_changed_at: parse_ts(&now)?,
    }))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Edge columns. Read with [`row_to_edge`].
pub(crate) const EDGE_COLUMNS: &str = "
       r.source_organization_id AS relation_source_id,
       r.target_organization_id AS relation_target_id,
       r.relation_type AS relation_type,
       r.confidence_level AS relation_confidence_level,
       r.confidence_rationale AS relation_confidence_rationale,
       r.status AS relation_status,
       r.status_changed_at AS relation_status_changed_at,
       r.updated_at AS relation_updated_at";

/// Number of columns in [`EDGE_COLUMNS`].
pub(crate) const EDGE_COLUMN_COUNT: i32 = 8;

pub(crate) fn row_to_edge(row: &Row) -> Result<RelationEdge> {
    Ok(RelationEdge {
        source_organization_id: col_text(row, 0)?,
        target_organization_id: col_text(row, 1)?,
        relation_type: col_opt_text(row, 2),
        confidence_level: read_vocabulary::<ConfidenceLevel>(col_opt_text(row, 3).as_deref()),
        confidence_rationale: col_opt_text(row, 4),
        status: read_vocabulary::<RelationStatus>(col_opt_text(row, 5).as_deref())
            .unwrap_or(RelationStatus::Active),
        status_changed_at: col_opt_ts(row, 6)?,
        updated_at: col_ts(row, 7)?,
    })
}
