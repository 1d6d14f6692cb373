//! Read accessors over the entity graph.
//!
//! Every accessor resolves its organization through [`OrgRef`]; an unknown
//! organization is a hard `NotFound`, except for article access which is a
//! soft [`Outcome`].

use brandgraph_shared::{
    BrandGraphError, ContrarianLevel, LinkedInArticle, Member, Miss, MissReason, OrgRef,
    Organization, Outcome, PageQueue, RelatedOrganization, RelationEdge, Reportable, Result,
    ScrapedPage, Thesis,
};
use libsql::params;
use serde::Serialize;

use crate::articles::{ARTICLE_SELECT, row_to_article};
use crate::individuals::{MEMBER_SELECT, row_to_member};
use crate::organizations::{organization_by_id, require_org, resolve_org, row_to_summary};
use crate::pages::{SCRAPED_PAGE_SELECT, row_to_scraped_content, row_to_web_page};
use crate::relations::{EDGE_COLUMNS, EDGE_COLUMN_COUNT, row_to_edge};
use crate::theses::{THESIS_SELECT, row_to_thesis};
use crate::{Storage, col_text, query_opt_text, storage_err};

/// An organization with its outbound relations.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationWithRelations {
    pub organization: Organization,
    pub relations: Vec<RelatedOrganization>,
}

/// Articles by one member of an organization.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleList {
    pub organization_id: String,
    pub individual_id: String,
    pub count: usize,
    pub articles: Vec<LinkedInArticle>,
}

impl Reportable for ArticleList {
    fn message(&self) -> String {
        format!("{} article(s)", self.count)
    }
}

impl Storage {
    /// The organization plus every outbound edge and its target summary.
    pub async fn organization_with_relations(
        &self,
        org: &OrgRef,
    ) -> Result<OrganizationWithRelations> {
        let id = require_org(&self.conn, org).await?;
        let organization = organization_by_id(&self.conn, &id)
            .await?
            .ok_or_else(|| BrandGraphError::not_found("organization", id.as_str()))?;

        let sql = format!(
            "SELECT {EDGE_COLUMNS},
                    t.id AS target_id,
                    t.name AS target_name,
                    t.url AS target_url,
                    t.domain AS target_domain
               FROM organization_relations r
               JOIN organizations t ON t.id = r.target_organization_id
              WHERE r.source_organization_id = ?1
              ORDER BY t.name, t.id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![id.as_str()])
            .await
            .map_err(storage_err)?;

        let mut relations = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            relations.push(RelatedOrganization {
                relation: row_to_edge(&row)?,
                target: row_to_summary(&row, EDGE_COLUMN_COUNT)?,
            });
        }

        Ok(OrganizationWithRelations {
            organization,
            relations,
        })
    }

    /// The directional edge from `source` to `target`, including `not_related`.
    pub async fn relation_between(
        &self,
        source: &OrgRef,
        target: &OrgRef,
    ) -> Result<Option<RelationEdge>> {
        let source_id = require_org(&self.conn, source).await?;
        let target_id = require_org(&self.conn, target).await?;

        let sql = format!(
            "SELECT {EDGE_COLUMNS}
               FROM organization_relations r
              WHERE r.source_organization_id = ?1 AND r.target_organization_id = ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![source_id.as_str(), target_id.as_str()])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_edge(&row)?)),
            None => Ok(None),
        }
    }

    /// Members with their edge data. Hidden members are left out unless asked for.
    pub async fn organization_members(
        &self,
        org: &OrgRef,
        include_hidden: bool,
    ) -> Result<Vec<Member>> {
        let id = require_org(&self.conn, org).await?;
        let sql = format!(
            "{MEMBER_SELECT}
              WHERE m.organization_id = ?1 AND (?2 = 1 OR m.status <> 'hidden')
              ORDER BY i.last_name, i.first_name, i.id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![id.as_str(), i64::from(include_hidden)])
            .await
            .map_err(storage_err)?;

        let mut members = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            members.push(row_to_member(&row)?);
        }
        Ok(members)
    }

    /// Pages on the organization's domain that have scraped content.
    pub async fn scraped_pages(&self, org: &OrgRef) -> Result<Vec<ScrapedPage>> {
        let Some(domain) = self.organization_domain(org).await? else {
            return Ok(Vec::new());
        };
        let sql = format!("{SCRAPED_PAGE_SELECT} WHERE wp.domain = ?1 ORDER BY wp.normalized_url");
        let mut rows = self
            .conn
            .query(&sql, params![domain.as_str()])
            .await
            .map_err(storage_err)?;

        let mut pages = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            pages.push(ScrapedPage {
                page: row_to_web_page(&row)?,
                content: row_to_scraped_content(&row, 8)?,
            });
        }
        Ok(pages)
    }

    /// Scrapeable pages and queued targets on the organization's domain with no content yet.
    pub async fn unscraped_pages(&self, org: &OrgRef) -> Result<PageQueue> {
        let Some(domain) = self.organization_domain(org).await? else {
            return Ok(PageQueue::default());
        };
        let mut rows = self
            .conn
            .query(
                "SELECT candidates.candidate_url AS unscraped_url
                   FROM (SELECT wp.normalized_url AS candidate_url
                           FROM web_pages wp
                          WHERE wp.domain = ?1 AND wp.should_scrape = 1
                         UNION
                         SELECT st.url AS candidate_url
                           FROM scrape_targets st
                          WHERE st.domain = ?1) AS candidates
                  WHERE NOT EXISTS (SELECT 1 FROM scraped_content sc
                                     WHERE sc.normalized_url = candidates.candidate_url)
                  ORDER BY unscraped_url",
                params![domain.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut urls = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            urls.push(col_text(&row, 0)?);
        }
        Ok(PageQueue::new(urls))
    }

    /// Articles by an individual, visible only through a membership edge.
    ///
    /// Any edge counts, whatever its status: an ended or hidden membership
    /// still exposes the individual's articles. Without an edge the call is a
    /// soft `MembershipNotFound`.
    pub async fn individual_articles(
        &self,
        org: &OrgRef,
        individual_id: &str,
    ) -> Result<Outcome<ArticleList>> {
        let Some(organization_id) = resolve_org(&self.conn, org).await? else {
            return Ok(Err(Miss::new(
                MissReason::OrganizationNotFound,
                format!("organization {org} not found"),
            )
            .with("organization", org.to_string())
            .with("individual_id", individual_id)));
        };

        let linked = query_opt_text(
            &self.conn,
            "SELECT m.individual_id AS member_individual_id
               FROM organization_individuals m
              WHERE m.organization_id = ?1 AND m.individual_id = ?2",
            params![organization_id.as_str(), individual_id],
        )
        .await?;
        if linked.is_none() {
            return Ok(Err(Miss::new(
                MissReason::MembershipNotFound,
                format!("individual {individual_id} is not a member of organization {org}"),
            )
            .with("organization_id", organization_id)
            .with("individual_id", individual_id)));
        }

        let sql = format!(
            "{ARTICLE_SELECT} WHERE a.individual_id = ?1 ORDER BY a.published_at DESC, a.id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![individual_id])
            .await
            .map_err(storage_err)?;
        let mut articles = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            articles.push(row_to_article(&row)?);
        }

        Ok(Ok(ArticleList {
            organization_id,
            individual_id: individual_id.to_string(),
            count: articles.len(),
            articles,
        }))
    }

    /// Theses for an organization, optionally at one level, newest first within a level.
    pub async fn organization_theses(
        &self,
        org: &OrgRef,
        level: Option<ContrarianLevel>,
    ) -> Result<Vec<Thesis>> {
        let id = require_org(&self.conn, org).await?;
        let sql = format!(
            "{THESIS_SELECT}
              WHERE t.organization_id = ?1 AND (?2 IS NULL OR t.contrarian_level = ?2)
              ORDER BY t.contrarian_level, t.created_at DESC, t.id"
        );
        let mut rows = self
            .conn
            .query(&sql, params![id.as_str(), level.map(i64::from)])
            .await
            .map_err(storage_err)?;

        let mut theses = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            theses.push(row_to_thesis(&row)?);
        }
        Ok(theses)
    }

    async fn organization_domain(&self, org: &OrgRef) -> Result<Option<String>> {
        let id = require_org(&self.conn, org).await?;
        query_opt_text(
            &self.conn,
            "SELECT o.domain AS org_domain FROM organizations o WHERE o.id = ?1",
            params![id.as_str()],
        )
        .await
    }
}
