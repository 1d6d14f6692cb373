//! SQL migration definitions for the BrandGraph database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.
//!
//! Status-like columns are plain `TEXT`; the accepted values live in
//! `brandgraph_shared::status`, so retiring a value is a data migration plus a
//! code change, never a schema change.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: organizations, aliases, individuals, edges, pages, theses",
            sql: r#"
BEGIN;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Organizations ("brands"). domain is derived from url by the write hook.
CREATE TABLE IF NOT EXISTS organizations (
    id                    TEXT PRIMARY KEY,
    name                  TEXT,
    url                   TEXT,
    domain                TEXT UNIQUE,
    linkedin_url          TEXT,
    bio                   TEXT,
    mission               TEXT,
    offerings             TEXT,
    status                TEXT,
    generating_started_at TEXT,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

-- External identifier crosswalk (workspace id, legacy id) -> internal id
CREATE TABLE IF NOT EXISTS organization_aliases (
    scheme          TEXT NOT NULL,
    external_id     TEXT NOT NULL,
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (scheme, external_id),
    UNIQUE (organization_id, scheme)
);

-- Individuals, merged by LinkedIn URL
CREATE TABLE IF NOT EXISTS individuals (
    id           TEXT PRIMARY KEY,
    first_name   TEXT NOT NULL,
    last_name    TEXT,
    linkedin_url TEXT NOT NULL UNIQUE,
    website      TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

-- Membership edges
CREATE TABLE IF NOT EXISTS organization_individuals (
    organization_id      TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    individual_id        TEXT NOT NULL REFERENCES individuals(id) ON DELETE CASCADE,
    role                 TEXT,
    joined_at            TEXT,
    confidence_level     TEXT,
    confidence_rationale TEXT,
    status               TEXT NOT NULL DEFAULT 'active',
    status_changed_at    TEXT,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    PRIMARY KEY (organization_id, individual_id)
);

CREATE INDEX IF NOT EXISTS idx_org_individuals_individual ON organization_individuals(individual_id);

-- Directional organization relations, including explicit not_related
CREATE TABLE IF NOT EXISTS organization_relations (
    source_organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    target_organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    relation_type          TEXT,
    confidence_level       TEXT,
    confidence_rationale   TEXT,
    status                 TEXT NOT NULL DEFAULT 'active',
    status_changed_at      TEXT,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL,
    PRIMARY KEY (source_organization_id, target_organization_id),
    CHECK (source_organization_id <> target_organization_id)
);

CREATE INDEX IF NOT EXISTS idx_org_relations_target ON organization_relations(target_organization_id);

-- Discovered web pages, identified by normalized URL
CREATE TABLE IF NOT EXISTS web_pages (
    id             TEXT PRIMARY KEY,
    url            TEXT NOT NULL,
    normalized_url TEXT NOT NULL UNIQUE,
    domain         TEXT,
    page_category  TEXT NOT NULL,
    should_scrape  INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_web_pages_domain ON web_pages(domain);

-- Scrape queue placeholders
CREATE TABLE IF NOT EXISTS scrape_targets (
    id         TEXT PRIMARY KEY,
    url        TEXT NOT NULL UNIQUE,
    domain     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scrape_targets_domain ON scrape_targets(domain);

-- Crawler output; a row here means "already scraped"
CREATE TABLE IF NOT EXISTS scraped_content (
    normalized_url TEXT PRIMARY KEY,
    raw_payload    TEXT,
    text           TEXT,
    markup         TEXT,
    scraped_at     TEXT NOT NULL
);

-- LinkedIn articles by individuals
CREATE TABLE IF NOT EXISTS linkedin_articles (
    id            TEXT PRIMARY KEY,
    individual_id TEXT NOT NULL REFERENCES individuals(id) ON DELETE CASCADE,
    url           TEXT NOT NULL UNIQUE,
    title         TEXT,
    content       TEXT,
    published_at  TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_linkedin_articles_individual ON linkedin_articles(individual_id);

-- Workspace users referenced by thesis review decisions
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- Theses per (organization, contrarian level)
CREATE TABLE IF NOT EXISTS organization_theses (
    id                        TEXT PRIMARY KEY,
    organization_id           TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    contrarian_level          INTEGER NOT NULL CHECK (contrarian_level BETWEEN 1 AND 10),
    thesis_html               TEXT NOT NULL,
    supporting_evidence       TEXT,
    status                    TEXT,
    status_reason             TEXT,
    status_changed_by         TEXT,
    status_changed_by_user_id TEXT REFERENCES users(id),
    status_changed_at         TEXT,
    created_at                TEXT NOT NULL,
    updated_at                TEXT NOT NULL,
    UNIQUE (organization_id, contrarian_level, thesis_html)
);

-- Per-level thesis generation markers
CREATE TABLE IF NOT EXISTS thesis_generations (
    organization_id  TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    contrarian_level INTEGER NOT NULL,
    status           TEXT NOT NULL,
    started_at       TEXT NOT NULL,
    PRIMARY KEY (organization_id, contrarian_level)
);

INSERT INTO schema_migrations (version) VALUES (1);

COMMIT;
"#,
        },
        Migration {
            version: 2,
            description: "Retire pending/generating thesis statuses (one-way)",
            sql: r#"
BEGIN;

UPDATE organization_theses
   SET status = NULL
 WHERE status IN ('pending', 'generating');

INSERT INTO schema_migrations (version) VALUES (2);

COMMIT;
"#,
        },
    ]
}

/// Highest version defined above.
pub(crate) fn latest_version() -> u32 {
    all_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
