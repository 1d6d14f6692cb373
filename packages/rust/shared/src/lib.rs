//! Shared types, error model, and configuration for BrandGraph.
//!
//! This crate is the foundation depended on by all other BrandGraph crates.
//! It provides:
//! - [`BrandGraphError`], the unified error type, and [`Outcome`] for soft misses
//! - Domain types ([`Organization`], [`Individual`], [`WebPage`], [`Thesis`], [`OrgRef`])
//! - Closed vocabularies with retired-value checks ([`Vocabulary`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod content;
pub mod error;
pub mod outcome;
pub mod status;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, GenerationConfig, IngestionConfig, PageDefaults, config_dir,
    config_file_path, database_path, init_config, load_config, load_config_from,
};
pub use content::{
    ArticleUpsert, ChangedBy, ContrarianLevel, LinkedInArticle, PageQueue, ScrapedContent,
    ScrapedPage, Thesis, ThesisInput, ThesisStatusChange, WebPage, WebPageInput,
};
pub use error::{BrandGraphError, Result};
pub use outcome::{Miss, MissReason, Outcome, Reportable, outcome_report};
pub use status::{
    ConfidenceLevel, GenerationStatus, MembershipStatus, PageCategory, RelationStatus,
    StatusChangedBy, ThesisStatus, Vocabulary, parse_vocabulary, read_vocabulary,
};
pub use types::{
    ExternalKey, ExternalScheme, Individual, IndividualUpsert, Member, Membership, MembershipIds,
    OrgRef, OrgSeed, Organization, OrganizationSummary, OrganizationUpsert, RelatedOrganization,
    RelationEdge, RelationInput, new_id,
};
