//! Whole-organization views composed from the storage read accessors.

use brandgraph_shared::{Member, OrgRef, Organization, RelatedOrganization, Result, Thesis};
use brandgraph_storage::Storage;
use serde::Serialize;
use tracing::{debug, instrument};

/// Everything known about one organization.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationGraph {
    pub organization: Organization,
    /// Outbound relations, including `not_related` verdicts.
    pub relations: Vec<RelatedOrganization>,
    pub members: Vec<Member>,
    pub theses: Vec<Thesis>,
    /// Pages on the organization's domain still waiting for a scrape.
    pub unscraped_count: usize,
    pub scraped_count: usize,
}

/// Build the composed view for `org`.
///
/// The reference is resolved once; every later read goes by internal id so a
/// legacy identifier only logs its deprecation warning a single time.
#[instrument(skip_all, fields(%org, include_hidden = include_hidden))]
pub async fn organization_graph(
    storage: &Storage,
    org: &OrgRef,
    include_hidden: bool,
) -> Result<OrganizationGraph> {
    let base = storage.organization_with_relations(org).await?;
    let id = OrgRef::Id(base.organization.id.clone());

    let members = storage.organization_members(&id, include_hidden).await?;
    let theses = storage.organization_theses(&id, None).await?;
    let unscraped = storage.unscraped_pages(&id).await?;
    let scraped = storage.scraped_pages(&id).await?;

    debug!(
        organization_id = %base.organization.id,
        relations = base.relations.len(),
        members = members.len(),
        theses = theses.len(),
        "organization graph assembled"
    );

    Ok(OrganizationGraph {
        organization: base.organization,
        relations: base.relations,
        members,
        theses,
        unscraped_count: unscraped.count,
        scraped_count: scraped.len(),
    })
}
