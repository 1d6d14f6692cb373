//! Organization upsert, identity resolution, and the domain write hook.
//!
//! External identifiers live in `organization_aliases`; the organization row
//! only carries the internal id. `domain` is never written directly: every
//! write that can change `url` calls [`sync_organization_domain`] in the same
//! transaction.

use brandgraph_canonical::extract_hostname;
use brandgraph_shared::{
    BrandGraphError, ExternalKey, ExternalScheme, GenerationStatus, OrgRef, OrgSeed, Organization,
    OrganizationSummary, OrganizationUpsert, Result, new_id, read_vocabulary,
};
use libsql::{Connection, Row, params};

use crate::{
    Storage, col_opt_text, col_opt_ts, col_text, col_ts, finish, now_ts, query_opt_text,
    storage_err,
};

/// Organization columns with the crosswalk ids folded in. Read with [`row_to_organization`].
pub(crate) const ORGANIZATION_SELECT: &str = "
SELECT o.id AS org_id,
       o.name AS org_name,
       o.url AS org_url,
       o.domain AS org_domain,
       o.linkedin_url AS org_linkedin_url,
       o.bio AS org_bio,
       o.mission AS org_mission,
       o.offerings AS org_offerings,
       (SELECT wa.external_id FROM organization_aliases wa
         WHERE wa.organization_id = o.id AND wa.scheme = 'workspace') AS org_workspace_id,
       (SELECT la.external_id FROM organization_aliases la
         WHERE la.organization_id = o.id AND la.scheme = 'legacy') AS org_legacy_id,
       o.status AS org_status,
       o.generating_started_at AS org_generating_started_at,
       o.created_at AS org_created_at,
       o.updated_at AS org_updated_at
  FROM organizations o";

impl Storage {
    /// Create or merge an organization keyed by an external id.
    ///
    /// Incoming `None` fields never overwrite stored values. An unknown key whose
    /// url matches an existing organization's domain attaches to that
    /// organization instead of creating a duplicate. Returns the internal id.
    pub async fn upsert_organization(&self, input: &OrganizationUpsert) -> Result<String> {
        let tx = self.begin().await?;
        let result = upsert_organization_in(&tx, input).await;
        let id = finish(tx, result).await?;
        tracing::debug!(organization_id = %id, scheme = input.key.scheme.as_str(), "organization upserted");
        Ok(id)
    }

    /// Resolve any organization reference to its internal id.
    pub async fn resolve_organization(&self, org: &OrgRef) -> Result<Option<String>> {
        resolve_org(&self.conn, org).await
    }

    pub async fn get_organization(&self, org: &OrgRef) -> Result<Option<Organization>> {
        match resolve_org(&self.conn, org).await? {
            Some(id) => organization_by_id(&self.conn, &id).await,
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Write path
// ---------------------------------------------------------------------------

pub(crate) async fn upsert_organization_in(
    conn: &Connection,
    input: &OrganizationUpsert,
) -> Result<String> {
    let key = &input.key;
    if key.id.trim().is_empty() {
        return Err(BrandGraphError::validation(format!(
            "{} organization key is empty",
            key.scheme.as_str()
        )));
    }
    let now = now_ts();

    let id = match alias_lookup(conn, key.scheme, &key.id).await? {
        Some(id) => id,
        None => {
            let id = match claimable_by_domain(conn, input.url.as_deref(), key).await? {
                Some(owner) => owner,
                None => insert_bare_organization(conn, &now).await?,
            };
            conn.execute(
                "INSERT INTO organization_aliases (scheme, external_id, organization_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key.scheme.as_str(), key.id.as_str(), id.as_str(), now.as_str()],
            )
            .await
            .map_err(storage_err)?;
            id
        }
    };

    conn.execute(
        "UPDATE organizations
            SET name = COALESCE(?1, organizations.name),
                url = COALESCE(?2, organizations.url),
                linkedin_url = COALESCE(?3, organizations.linkedin_url),
                bio = COALESCE(?4, organizations.bio),
                mission = COALESCE(?5, organizations.mission),
                offerings = COALESCE(?6, organizations.offerings),
                updated_at = ?7
          WHERE organizations.id = ?8",
        params![
            input.name.as_deref(),
            input.url.as_deref(),
            input.linkedin_url.as_deref(),
            input.bio.as_deref(),
            input.mission.as_deref(),
            input.offerings.as_deref(),
            now.as_str(),
            id.as_str()
        ],
    )
    .await
    .map_err(storage_err)?;

    sync_organization_domain(conn, &id).await?;
    Ok(id)
}

/// An existing organization owning the url's domain, when it can take `key`.
///
/// The owner can take the key when it has no alias under the same scheme yet.
async fn claimable_by_domain(
    conn: &Connection,
    url: Option<&str>,
    key: &ExternalKey,
) -> Result<Option<String>> {
    let Some(domain) = url.and_then(extract_hostname) else {
        return Ok(None);
    };
    let Some(owner) = org_id_by_domain(conn, &domain).await? else {
        return Ok(None);
    };
    if let Some(existing) = alias_of(conn, &owner, key.scheme).await? {
        return Err(BrandGraphError::conflict(format!(
            "domain {domain} already belongs to organization {owner} ({}:{existing})",
            key.scheme.as_str()
        )));
    }
    tracing::info!(
        organization_id = %owner,
        %domain,
        scheme = key.scheme.as_str(),
        external_id = %key.id,
        "attaching external id to organization matched by domain"
    );
    Ok(Some(owner))
}

async fn insert_bare_organization(conn: &Connection, now: &str) -> Result<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO organizations (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![id.as_str(), now],
    )
    .await
    .map_err(storage_err)?;
    Ok(id)
}

/// Write hook: re-derive `domain` from the organization's current `url`.
///
/// A domain owned by a different organization is a [`BrandGraphError::Conflict`];
/// the caller's transaction is then dropped and rolls back.
pub(crate) async fn sync_organization_domain(conn: &Connection, id: &str) -> Result<Option<String>> {
    let mut rows = conn
        .query(
            "SELECT o.url AS org_url FROM organizations o WHERE o.id = ?1",
            params![id],
        )
        .await
        .map_err(storage_err)?;
    let url = match rows.next().await.map_err(storage_err)? {
        Some(row) => col_opt_text(&row, 0),
        None => return Err(BrandGraphError::not_found("organization", id)),
    };

    let domain = url.as_deref().and_then(extract_hostname);
    if let Some(domain) = &domain {
        if let Some(owner) = org_id_by_domain(conn, domain).await? {
            if owner != id {
                return Err(BrandGraphError::conflict(format!(
                    "domain {domain} already belongs to organization {owner}"
                )));
            }
        }
    }

    conn.execute(
        "UPDATE organizations SET domain = ?1 WHERE id = ?2",
        params![domain.as_deref(), id],
    )
    .await
    .map_err(storage_err)?;
    Ok(domain)
}

/// Find or create a relation endpoint.
///
/// A workspace id goes through the full upsert. A url-only seed matches by
/// canonical domain and only fills a missing name; otherwise it creates the
/// organization from the seed.
pub(crate) async fn resolve_or_create_seed(conn: &Connection, seed: &OrgSeed) -> Result<String> {
    if let Some(workspace_id) = &seed.workspace_id {
        let mut input = OrganizationUpsert::new(ExternalKey::workspace(workspace_id.as_str()));
        input.name = seed.name.clone();
        input.url = seed.url.clone();
        return upsert_organization_in(conn, &input).await;
    }

    let url = seed
        .url
        .as_deref()
        .ok_or_else(|| BrandGraphError::validation("relation endpoint needs a url or workspace_id"))?;
    let domain = extract_hostname(url)
        .ok_or_else(|| BrandGraphError::validation(format!("'{url}' has no usable hostname")))?;
    let now = now_ts();

    if let Some(id) = org_id_by_domain(conn, &domain).await? {
        conn.execute(
            "UPDATE organizations
                SET name = ?1, updated_at = ?2
              WHERE organizations.id = ?3 AND organizations.name IS NULL AND ?1 IS NOT NULL",
            params![seed.name.as_deref(), now.as_str(), id.as_str()],
        )
        .await
        .map_err(storage_err)?;
        return Ok(id);
    }

    let id = insert_bare_organization(conn, &now).await?;
    conn.execute(
        "UPDATE organizations SET name = ?1, url = ?2 WHERE id = ?3",
        params![seed.name.as_deref(), url, id.as_str()],
    )
    .await
    .map_err(storage_err)?;
    sync_organization_domain(conn, &id).await?;
    tracing::debug!(organization_id = %id, %domain, "created organization from relation endpoint");
    Ok(id)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

pub(crate) async fn resolve_org(conn: &Connection, org: &OrgRef) -> Result<Option<String>> {
    match org {
        OrgRef::Id(id) => {
            query_opt_text(
                conn,
                "SELECT o.id AS org_id FROM organizations o WHERE o.id = ?1",
                params![id.as_str()],
            )
            .await
        }
        OrgRef::Workspace(external) => alias_lookup(conn, ExternalScheme::Workspace, external).await,
        OrgRef::Legacy(external) => {
            tracing::warn!(
                legacy_id = %external,
                "organization referenced by deprecated legacy id; use its workspace id"
            );
            alias_lookup(conn, ExternalScheme::Legacy, external).await
        }
        OrgRef::Domain(raw) => match extract_hostname(raw) {
            Some(domain) => org_id_by_domain(conn, &domain).await,
            None => Ok(None),
        },
    }
}

/// Resolve or fail with a hard not-found.
pub(crate) async fn require_org(conn: &Connection, org: &OrgRef) -> Result<String> {
    resolve_org(conn, org)
        .await?
        .ok_or_else(|| BrandGraphError::not_found("organization", org.to_string()))
}

async fn alias_lookup(
    conn: &Connection,
    scheme: ExternalScheme,
    external_id: &str,
) -> Result<Option<String>> {
    query_opt_text(
        conn,
        "SELECT a.organization_id AS alias_organization_id
           FROM organization_aliases a
          WHERE a.scheme = ?1 AND a.external_id = ?2",
        params![scheme.as_str(), external_id],
    )
    .await
}

async fn alias_of(conn: &Connection, id: &str, scheme: ExternalScheme) -> Result<Option<String>> {
    query_opt_text(
        conn,
        "SELECT a.external_id AS alias_external_id
           FROM organization_aliases a
          WHERE a.organization_id = ?1 AND a.scheme = ?2",
        params![id, scheme.as_str()],
    )
    .await
}

async fn org_id_by_domain(conn: &Connection, domain: &str) -> Result<Option<String>> {
    query_opt_text(
        conn,
        "SELECT o.id AS org_id FROM organizations o WHERE o.domain = ?1",
        params![domain],
    )
    .await
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub(crate) async fn organization_by_id(conn: &Connection, id: &str) -> Result<Option<Organization>> {
    let sql = format!("{ORGANIZATION_SELECT} WHERE o.id = ?1");
    let mut rows = conn.query(&sql, params![id]).await.map_err(storage_err)?;
    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(Some(row_to_organization(&row)?)),
        None => Ok(None),
    }
}

pub(crate) fn row_to_organization(row: &Row) -> Result<Organization> {
    Ok(Organization {
        id: col_text(row, 0)?,
        name: col_opt_text(row, 1),
        url: col_opt_text(row, 2),
        domain: col_opt_text(row, 3),
        linkedin_url: col_opt_text(row, 4),
        bio: col_opt_text(row, 5),
        mission: col_opt_text(row, 6),
        offerings: col_opt_text(row, 7),
        workspace_id: col_opt_text(row, 8),
        legacy_id: col_opt_text(row, 9),
        status: read_vocabulary::<GenerationStatus>(col_opt_text(row, 10).as_deref()),
        generating_started_at: col_opt_ts(row, 11)?,
        created_at: col_ts(row, 12)?,
        updated_at: col_ts(row, 13)?,
    })
}

/// Read an [`OrganizationSummary`] from four columns starting at `offset`.
pub(crate) fn row_to_summary(row: &Row, offset: i32) -> Result<OrganizationSummary> {
    Ok(OrganizationSummary {
        id: col_text(row, offset)?,
        name: col_opt_text(row, offset + 1),
        url: col_opt_text(row, offset + 2),
        domain: col_opt_text(row, offset + 3),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_storage;

    fn acme() -> OrganizationUpsert {
        let mut input = OrganizationUpsert::new(ExternalKey::workspace("org_acme"));
        input.name = Some("Acme".into());
        input.url = Some("https://www.acme.com/".into());
        input
    }

    #[tokio::test]
    async fn creates_on_first_sighting() {
        let storage = test_storage().await;
        let id = storage.upsert_organization(&acme()).await.expect("upsert");

        let org = storage
            .get_organization(&OrgRef::Id(id.clone()))
            .await
            .unwrap()
            .expect("stored");
        assert_eq!(org.name.as_deref(), Some("Acme"));
        assert_eq!(org.domain.as_deref(), Some("acme.com"));
        assert_eq!(org.workspace_id.as_deref(), Some("org_acme"));
        assert_eq!(org.legacy_id, None);
        assert_eq!(org.status, None);
    }

    #[tokio::test]
    async fn null_fields_never_overwrite() {
        let storage = test_storage().await;
        let id = storage.upsert_organization(&acme()).await.unwrap();
        let before = storage
            .get_organization(&OrgRef::Id(id.clone()))
            .await
            .unwrap()
            .unwrap();

        let mut bio_only = OrganizationUpsert::new(ExternalKey::workspace("org_acme"));
        bio_only.bio = Some("Makes anvils".into());
        let again = storage.upsert_organization(&bio_only).await.unwrap();
        assert_eq!(again, id);

        let after = storage
            .get_organization(&OrgRef::Id(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.name.as_deref(), Some("Acme"));
        assert_eq!(after.url.as_deref(), Some("https://www.acme.com/"));
        assert_eq!(after.bio.as_deref(), Some("Makes anvils"));
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn domain_follows_url() {
        let storage = test_storage().await;
        let id = storage.upsert_organization(&acme()).await.unwrap();

        let mut moved = OrganizationUpsert::new(ExternalKey::workspace("org_acme"));
        moved.url = Some("http://app.acme.io/login".into());
        storage.upsert_organization(&moved).await.unwrap();

        let org = storage
            .get_organization(&OrgRef::Id(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(org.domain.as_deref(), Some("app.acme.io"));
        assert!(
            storage
                .resolve_organization(&OrgRef::Domain("acme.com".into()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn resolves_every_reference_kind() {
        let storage = test_storage().await;
        let id = storage.upsert_organization(&acme()).await.unwrap();
        let mut legacy = OrganizationUpsert::new(ExternalKey::legacy("4411"));
        legacy.url = Some("acme.com".into());
        assert_eq!(storage.upsert_organization(&legacy).await.unwrap(), id);

        for org in [
            OrgRef::Id(id.clone()),
            OrgRef::Workspace("org_acme".into()),
            OrgRef::Legacy("4411".into()),
            OrgRef::Domain("https://www.acme.com/pricing".into()),
        ] {
            assert_eq!(
                storage.resolve_organization(&org).await.unwrap().as_deref(),
                Some(id.as_str()),
                "{org}"
            );
        }
        assert!(
            storage
                .resolve_organization(&OrgRef::Workspace("org_missing".into()))
                .await
                .unwrap()
                .is_none()
        );

        let org = storage
            .get_organization(&OrgRef::Id(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(org.legacy_id.as_deref(), Some("4411"));
    }

    #[tokio::test]
    async fn domain_owned_by_another_org_conflicts_and_rolls_back() {
        let storage = test_storage().await;
        storage.upsert_organization(&acme()).await.unwrap();

        let mut globex = OrganizationUpsert::new(ExternalKey::workspace("org_globex"));
        globex.url = Some("https://globex.com".into());
        let globex_id = storage.upsert_organization(&globex).await.unwrap();

        let mut hijack = OrganizationUpsert::new(ExternalKey::workspace("org_globex"));
        hijack.url = Some("https://acme.com/about".into());
        hijack.name = Some("Globex".into());
        let err = storage.upsert_organization(&hijack).await.unwrap_err();
        assert!(matches!(err, BrandGraphError::Conflict { .. }));

        let org = storage
            .get_organization(&OrgRef::Id(globex_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(org.url.as_deref(), Some("https://globex.com"));
        assert_eq!(org.name, None);
    }

    #[tokio::test]
    async fn second_workspace_id_for_same_domain_conflicts() {
        let storage = test_storage().await;
        storage.upsert_organization(&acme()).await.unwrap();

        let mut twin = OrganizationUpsert::new(ExternalKey::workspace("org_twin"));
        twin.url = Some("https://acme.com".into());
        let err = storage.upsert_organization(&twin).await.unwrap_err();
        assert!(err.to_string().contains("acme.com"));
        assert!(
            storage
                .resolve_organization(&OrgRef::Workspace("org_twin".into()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let storage = test_storage().await;
        let err = storage
            .upsert_organization(&OrganizationUpsert::new(ExternalKey::workspace("  ")))
            .await
            .unwrap_err();
        assert!(matches!(err, BrandGraphError::Validation { .. }));
    }
}
