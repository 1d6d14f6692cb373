//! Generation status tracking.
//!
//! Profile generation is flagged on the organization row; thesis generation
//! has one marker per contrarian level in `thesis_generations`. Starting is a
//! single conditional write, so two racing starts cannot both succeed, but the
//! flag is advisory: there is no lease, and a crashed job leaves its marker
//! until someone completes it. [`Storage::stale_generations`] lists such
//! markers without clearing them.

use brandgraph_shared::{
    ContrarianLevel, GenerationStatus, Miss, MissReason, OrgRef, Outcome, Reportable, Result,
    Vocabulary,
};
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use serde::Serialize;

use crate::organizations::resolve_org;
use crate::{Storage, col_text, col_ts, finish, now_ts, parse_ts, storage_err, ts};

/// What is being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationScope {
    /// The organization profile (bio, mission, offerings).
    Organization,
    /// Theses at one contrarian level.
    Theses { level: ContrarianLevel },
}

impl GenerationScope {
    pub fn kind(&self) -> GenerationKind {
        match self {
            Self::Organization => GenerationKind::Organization,
            Self::Theses { .. } => GenerationKind::Theses,
        }
    }

    fn level(&self) -> Option<ContrarianLevel> {
        match self {
            Self::Organization => None,
            Self::Theses { level } => Some(*level),
        }
    }
}

/// Scope without a level. Thesis completion clears every level at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    Organization,
    Theses,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Theses => "theses",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationStarted {
    pub organization_id: String,
    pub kind: GenerationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrarian_level: Option<ContrarianLevel>,
    pub started_at: DateTime<Utc>,
}

impl Reportable for GenerationStarted {
    fn message(&self) -> String {
        match self.contrarian_level {
            Some(level) => format!("{} generation started at level {level}", self.kind.as_str()),
            None => format!("{} generation started", self.kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationCompleted {
    pub organization_id: String,
    pub kind: GenerationKind,
    /// Markers cleared: 1 for profiles, one per level for theses.
    pub cleared: u64,
}

impl Reportable for GenerationCompleted {
    fn message(&self) -> String {
        format!("{} generation marked complete", self.kind.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenerationState {
    Idle,
    InProgress { started_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationStateReport {
    pub organization_id: String,
    pub kind: GenerationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrarian_level: Option<ContrarianLevel>,
    #[serde(flatten)]
    pub state: GenerationState,
}

impl Reportable for GenerationStateReport {
    fn message(&self) -> String {
        match self.state {
            GenerationState::Idle => format!("{} generation idle", self.kind.as_str()),
            GenerationState::InProgress { started_at } => format!(
                "{} generation in progress since {}",
                self.kind.as_str(),
                ts(&started_at)
            ),
        }
    }
}

/// An in-progress marker older than the caller's threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleGeneration {
    pub organization_id: String,
    pub kind: GenerationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrarian_level: Option<ContrarianLevel>,
    pub started_at: DateTime<Utc>,
}

fn org_missing(org: &OrgRef) -> Miss {
    Miss::new(
        MissReason::OrganizationNotFound,
        format!("organization {org} not found"),
    )
    .with("organization", org.to_string())
}

impl Storage {
    /// Flag a generation as in progress. A second start is a soft `AlreadyInProgress`.
    pub async fn start_generation(
        &self,
        org: &OrgRef,
        scope: GenerationScope,
    ) -> Result<Outcome<GenerationStarted>> {
        let tx = self.begin().await?;
        let result = start_in(&tx, org, scope).await;
        finish(tx, result).await
    }

    /// Mark a generation idle. Nothing in progress is a soft `NotInProgress`.
    pub async fn complete_generation(
        &self,
        org: &OrgRef,
        kind: GenerationKind,
    ) -> Result<Outcome<GenerationCompleted>> {
        let tx = self.begin().await?;
        let result = complete_in(&tx, org, kind).await;
        finish(tx, result).await
    }

    pub async fn generation_state(
        &self,
        org: &OrgRef,
        scope: GenerationScope,
    ) -> Result<Outcome<GenerationStateReport>> {
        let Some(organization_id) = resolve_org(&self.conn, org).await? else {
            return Ok(Err(org_missing(org)));
        };

        let mut rows = match scope {
            GenerationScope::Organization => {
                self.conn
                    .query(
                        "SELECT COALESCE(o.generating_started_at, o.updated_at) AS generation_started_at
                           FROM organizations o
                          WHERE o.id = ?1 AND o.status IS NOT NULL",
                        params![organization_id.as_str()],
                    )
                    .await
            }
            GenerationScope::Theses { level } => {
                self.conn
                    .query(
                        "SELECT g.started_at AS generation_started_at
                           FROM thesis_generations g
                          WHERE g.organization_id = ?1 AND g.contrarian_level = ?2",
                        params![organization_id.as_str(), i64::from(level)],
                    )
                    .await
            }
        }
        .map_err(storage_err)?;
        let state = match rows.next().await.map_err(storage_err)? {
            Some(row) => GenerationState::InProgress {
                started_at: col_ts(&row, 0)?,
            },
            None => GenerationState::Idle,
        };

        Ok(Ok(GenerationStateReport {
            organization_id,
            kind: scope.kind(),
            contrarian_level: scope.level(),
            state,
        }))
    }

    /// In-progress markers started before `older_than`, oldest first.
    pub async fn stale_generations(&self, older_than: DateTime<Utc>) -> Result<Vec<StaleGeneration>> {
        let cutoff = ts(&older_than);
        let mut rows = self
            .conn
            .query(
                "SELECT o.id AS stale_organization_id,
                        NULL AS stale_contrarian_level,
                        o.generating_started_at AS stale_started_at
                   FROM organizations o
                  WHERE o.status IS NOT NULL AND o.generating_started_at < ?1
                 UNION ALL
                 SELECT g.organization_id AS stale_organization_id,
                        g.contrarian_level AS stale_contrarian_level,
                        g.started_at AS stale_started_at
                   FROM thesis_generations g
                  WHERE g.started_at < ?1
                 ORDER BY stale_started_at",
                params![cutoff.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut stale = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let contrarian_level = match row.get::<i64>(1).ok() {
                Some(level) => Some(ContrarianLevel::new(level)?),
                None => None,
            };
            stale.push(StaleGeneration {
                organization_id: col_text(&row, 0)?,
                kind: if contrarian_level.is_some() {
                    GenerationKind::Theses
                } else {
                    GenerationKind::Organization
                },
                contrarian_level,
                started_at: col_ts(&row, 2)?,
            });
        }
        Ok(stale)
    }
}

async fn start_in(
    conn: &Connection,
    org: &OrgRef,
    scope: GenerationScope,
) -> Result<Outcome<GenerationStarted>> {
    let Some(organization_id) = resolve_org(conn, org).await? else {
        return Ok(Err(org_missing(org)));
    };
    let now = now_ts();

    let changed = match scope {
        GenerationScope::Organization => conn
            .execute(
                "UPDATE organizations
                    SET status = ?1, generating_started_at = ?2
                  WHERE id = ?3 AND status IS NULL",
                params![
                    GenerationStatus::Generating.as_str(),
                    now.as_str(),
                    organization_id.as_str()
                ],
            )
            .await
            .map_err(storage_err)?,
        GenerationScope::Theses { level } => conn
            .execute(
                "INSERT INTO thesis_generations (organization_id, contrarian_level, status, started_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(organization_id, contrarian_level) DO NOTHING",
                params![
                    organization_id.as_str(),
                    i64::from(level),
                    GenerationStatus::Generating.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?,
    };

    if changed == 0 {
        let mut miss = Miss::new(
            MissReason::AlreadyInProgress,
            format!("{} generation already in progress", scope.kind().as_str()),
        )
        .with("organization_id", organization_id);
        if let Some(level) = scope.level() {
            miss = miss.with("contrarian_level", level.to_string());
        }
        return Ok(Err(miss));
    }

    tracing::info!(%organization_id, kind = scope.kind().as_str(), "generation started");
    Ok(Ok(GenerationStarted {
        organization_id,
        kind: scope.kind(),
        contrarian_level: scope.level(),
        started_at: parse_ts(&now)?,
    }))
}

async fn complete_in(
    conn: &Connection,
    org: &OrgRef,
    kind: GenerationKind,
) -> Result<Outcome<GenerationCompleted>> {
    let Some(organization_id) = resolve_org(conn, org).await? else {
        return Ok(Err(org_missing(org)));
    };

    let cleared = match kind {
        GenerationKind::Organization => conn
            .execute(
                "UPDATE organizations
                    SET status = NULL, generating_started_at = NULL
                  WHERE id = ?1 AND status IS NOT NULL",
                params![organization_id.as_str()],
            )
            .await
            .map_err(storage_err)?,
        GenerationKind::Theses => conn
            .execute(
                "DELETE FROM thesis_generations WHERE organization_id = ?1",
                params![organization_id.as_str()],
            )
            .await
            .map_err(storage_err)?,
    };

    if cleared == 0 {
        return Ok(Err(Miss::new(
            MissReason::NotInProgress,
            format!("no {} generation in progress", kind.as_str()),
        )
        .with("organization_id", organization_id)));
    }

    tracing::info!(%organization_id, kind = kind.as_str(), cleared, "generation completed");
    Ok(Ok(GenerationCompleted {
        organization_id,
        kind,
        cleared,
    }))
}
