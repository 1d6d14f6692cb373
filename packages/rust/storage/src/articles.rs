//! LinkedIn articles written by individuals.

use brandgraph_canonical::normalize_url;
use brandgraph_shared::{ArticleUpsert, BrandGraphError, LinkedInArticle, Result, new_id};
use libsql::{Connection, Row, params};

use crate::{
    Storage, col_opt_text, col_opt_ts, col_text, finish, now_ts, query_opt_text, storage_err, ts,
};

impl Storage {
    /// Upsert an article keyed by its normalized URL. The author must exist.
    pub async fn upsert_article(&self, input: &ArticleUpsert) -> Result<String> {
        let tx = self.begin().await?;
        let result = upsert_article_in(&tx, input).await;
        finish(tx, result).await
    }
}

async fn upsert_article_in(conn: &Connection, input: &ArticleUpsert) -> Result<String> {
    let author = query_opt_text(
        conn,
        "SELECT i.id AS individual_id FROM individuals i WHERE i.id = ?1",
        params![input.individual_id.as_str()],
    )
    .await?;
    if author.is_none() {
        return Err(BrandGraphError::not_found("individual", input.individual_id.as_str()));
    }

    let url = normalize_url(&input.url).ok_or_else(|| {
        BrandGraphError::validation(format!("'{}' is not a usable article URL", input.url))
    })?;
    let now = now_ts();

    let mut rows = conn
        .query(
            "INSERT INTO linkedin_articles
                (id, individual_id, url, title, content, published_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(url) DO UPDATE SET
                individual_id = excluded.individual_id,
                title = COALESCE(excluded.title, linkedin_articles.title),
                content = COALESCE(excluded.content, linkedin_articles.content),
                published_at = COALESCE(excluded.published_at, linkedin_articles.published_at),
                updated_at = excluded.updated_at
             RETURNING id AS article_id",
            params![
                new_id(),
                input.individual_id.as_str(),
                url.as_str(),
                input.title.as_deref(),
                input.content.as_deref(),
                input.published_at.as_ref().map(ts),
                now.as_str()
            ],
        )
        .await
        .map_err(storage_err)?;
    match rows.next().await.map_err(storage_err)? {
        Some(row) => col_text(&row, 0),
        None => Err(BrandGraphError::Storage("article upsert returned no id".into())),
    }
}

pub(crate) const ARTICLE_SELECT: &str = "
SELECT a.id AS article_id,
       a.individual_id AS article_individual_id,
       a.url AS article_url,
       a.title AS article_title,
       a.content AS article_content,
       a.published_at AS article_published_at
  FROM linkedin_articles a";

pub(crate) fn row_to_article(row: &Row) -> Result<LinkedInArticle> {
    Ok(LinkedInArticle {
        id: col_text(row, 0)?,
        individual_id: col_text(row, 1)?,
        url: col_text(row, 2)?,
        title: col_opt_text(row, 3),
        content: col_opt_text(row, 4),
        published_at: col_opt_ts(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_storage;

    #[tokio::test]
    async fn unknown_author_is_rejected() {
        let storage = test_storage().await;
        let err = storage
            .upsert_article(&ArticleUpsert {
                individual_id: "nobody".into(),
                url: "https://www.linkedin.com/pulse/x".into(),
                title: None,
                content: None,
                published_at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BrandGraphError::NotFound { entity: "individual", .. }));
    }
}
