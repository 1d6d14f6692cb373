//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use brandgraph_core::graph::organization_graph;
use brandgraph_core::ingest::{
    IngestProgress, IngestSummary, ingest_relations, ingest_scrape_queue, ingest_theses,
    ingest_web_pages,
};
use brandgraph_shared::{
    AppConfig, ArticleUpsert, ChangedBy, ConfidenceLevel, ContrarianLevel, ExternalKey,
    IndividualUpsert, MembershipStatus, OrgRef, OrganizationUpsert, Outcome, PageDefaults,
    RelationStatus, Reportable, ThesisStatus, ThesisStatusChange, database_path, init_config,
    load_config, outcome_report,
};
use brandgraph_storage::{GenerationKind, GenerationScope, Storage};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// BrandGraph: the organization graph behind brand research.
#[derive(Parser)]
#[command(
    name = "brandgraph",
    version,
    about = "Store and query organizations, people, relations, pages, and theses.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database file (overrides `[database] path` from the config).
    #[arg(long, global = true, env = "BRANDGRAPH_DB")]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
///
/// Organization arguments accept `workspace:<id>`, `legacy:<id>`,
/// `domain:<host>`, `id:<uuid>`, or a bare value (UUID or workspace id).
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Organizations.
    Org {
        #[command(subcommand)]
        action: OrgAction,
    },

    /// Individuals and their organization memberships.
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },

    /// LinkedIn articles.
    Article {
        #[command(subcommand)]
        action: ArticleAction,
    },

    /// Organization to organization relations.
    Relation {
        #[command(subcommand)]
        action: RelationAction,
    },

    /// Bulk ingestion of collector or model output (file or stdin).
    Ingest {
        #[command(subcommand)]
        action: IngestAction,
    },

    /// Organization theses.
    Thesis {
        #[command(subcommand)]
        action: ThesisAction,
    },

    /// Web pages and scraped content.
    Pages {
        #[command(subcommand)]
        action: PagesAction,
    },

    /// Generation status markers.
    Generation {
        #[command(subcommand)]
        action: GenerationAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum OrgAction {
    /// Create or merge an organization keyed by its workspace id.
    Upsert {
        /// Workspace organization id.
        key: String,

        /// Treat the key as a deprecated legacy id.
        #[arg(long)]
        legacy: bool,

        #[arg(long)]
        name: Option<String>,

        /// Website URL; the organization's domain is derived from it.
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        linkedin_url: Option<String>,

        #[arg(long)]
        bio: Option<String>,

        #[arg(long)]
        mission: Option<String>,

        #[arg(long)]
        offerings: Option<String>,
    },

    /// Show an organization with relations, members, theses, and page counts.
    Show {
        org: OrgRef,

        /// Include members whose membership is hidden.
        #[arg(long)]
        include_hidden: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum MemberAction {
    /// Create or merge an individual and link them to an organization.
    Upsert {
        org: OrgRef,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: Option<String>,

        /// LinkedIn profile URL, the individual's natural key.
        #[arg(long)]
        linkedin_url: String,

        #[arg(long)]
        website: Option<String>,

        #[arg(long)]
        role: Option<String>,

        /// RFC 3339 timestamp.
        #[arg(long)]
        joined_at: Option<DateTime<Utc>>,

        /// low, medium, or high.
        #[arg(long)]
        confidence: Option<ConfidenceLevel>,

        #[arg(long)]
        rationale: Option<String>,
    },

    /// Set the status of a membership: active, ended, or hidden.
    Status {
        org: OrgRef,
        individual_id: String,
        status: MembershipStatus,
    },

    /// List articles by a member of the organization.
    Articles { org: OrgRef, individual_id: String },
}

#[derive(Subcommand)]
pub(crate) enum ArticleAction {
    /// Create or merge an article keyed by its URL.
    Upsert {
        individual_id: String,
        url: String,

        #[arg(long)]
        title: Option<String>,

        /// File holding the article body ("-" for stdin).
        #[arg(long)]
        content: Option<PathBuf>,

        /// RFC 3339 timestamp.
        #[arg(long)]
        published_at: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
pub(crate) enum RelationAction {
    /// Set the status of an existing relation: active, ended, hidden, or not_related.
    Status {
        source: OrgRef,
        target: OrgRef,
        status: RelationStatus,
    },

    /// Show the relation from `source` to `target`, if one is recorded.
    Show { source: OrgRef, target: OrgRef },
}

#[derive(Subcommand)]
pub(crate) enum IngestAction {
    /// Relation tuples; missing endpoint organizations are created.
    Relations {
        /// Payload file ("-" or omitted for stdin).
        file: Option<PathBuf>,
    },

    /// URLs to scrape under a domain.
    ScrapeQueue {
        #[arg(long)]
        domain: String,

        /// Payload file ("-" or omitted for stdin).
        file: Option<PathBuf>,
    },

    /// Discovered web pages.
    Pages {
        /// Payload file ("-" or omitted for stdin).
        file: Option<PathBuf>,
    },

    /// Generated theses for one organization.
    Theses {
        #[arg(long)]
        org: OrgRef,

        /// Payload file ("-" or omitted for stdin).
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum ThesisAction {
    /// Record a review decision on a thesis.
    Status {
        thesis_id: String,

        /// validated or denied.
        status: ThesisStatus,

        #[arg(long)]
        reason: Option<String>,

        /// Workspace user making the change. Without it the change is attributed to ai.
        #[arg(long)]
        user: Option<String>,
    },

    /// List an organization's theses.
    List {
        org: OrgRef,

        /// Only theses at this contrarian level (1-10).
        #[arg(long)]
        level: Option<ContrarianLevel>,
    },
}

#[derive(Subcommand)]
pub(crate) enum PagesAction {
    /// Pages on the organization's domain still waiting for a scrape.
    Unscraped { org: OrgRef },

    /// Pages on the organization's domain with scraped content.
    Scraped { org: OrgRef },

    /// Store scraped text for a page.
    Record {
        url: String,

        /// File holding the extracted text ("-" or omitted for stdin).
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum GenerationAction {
    /// Mark a generation as started.
    Start {
        org: OrgRef,

        /// Track thesis generation at this level instead of the profile.
        #[arg(long)]
        theses_level: Option<ContrarianLevel>,
    },

    /// Mark a generation as finished.
    Complete {
        org: OrgRef,

        #[arg(long, value_enum, default_value = "organization")]
        kind: KindArg,
    },

    /// Show whether a generation is in progress.
    Status {
        org: OrgRef,

        #[arg(long)]
        theses_level: Option<ContrarianLevel>,
    },

    /// List in-progress markers older than a threshold.
    Stale {
        /// Minutes (defaults to `[generation] stale_after_minutes`).
        #[arg(long)]
        older_than_minutes: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum KindArg {
    Organization,
    Theses,
}

impl From<KindArg> for GenerationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Organization => Self::Organization,
            KindArg::Theses => Self::Theses,
        }
    }
}

fn scope(theses_level: Option<ContrarianLevel>) -> GenerationScope {
    match theses_level {
        Some(level) => GenerationScope::Theses { level },
        None => GenerationScope::Organization,
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries JSON results.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "brandgraph=info",
        1 => "brandgraph=debug",
        _ => "brandgraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Resolved config plus the database it points at.
struct Context {
    config: AppConfig,
    db_path: PathBuf,
}

impl Context {
    fn load(db_override: Option<&Path>) -> Result<Self> {
        let config = load_config()?;
        let db_path = database_path(&config, db_override)?;
        Ok(Self { config, db_path })
    }

    /// Open read-write, creating and migrating the database as needed.
    async fn open(&self) -> Result<Storage> {
        info!(path = %self.db_path.display(), "opening database");
        Ok(Storage::open(&self.db_path).await?)
    }

    /// Open read-only when the database already exists.
    async fn open_for_read(&self) -> Result<Storage> {
        if self.db_path.exists() {
            Ok(Storage::open_readonly(&self.db_path).await?)
        } else {
            self.open().await
        }
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        };
    }

    let ctx = Context::load(cli.db.as_deref())?;
    match cli.command {
        Command::Org { action } => cmd_org(&ctx, action).await,
        Command::Member { action } => cmd_member(&ctx, action).await,
        Command::Article { action } => cmd_article(&ctx, action).await,
        Command::Relation { action } => cmd_relation(&ctx, action).await,
        Command::Ingest { action } => cmd_ingest(&ctx, action).await,
        Command::Thesis { action } => cmd_thesis(&ctx, action).await,
        Command::Pages { action } => cmd_pages(&ctx, action).await,
        Command::Generation { action } => cmd_generation(&ctx, action).await,
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome<T: Reportable>(outcome: &Outcome<T>) -> Result<()> {
    print_json(&outcome_report(outcome))
}

/// Read a file, or stdin when `file` is absent or `-`.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read '{}': {e}", path.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_org(ctx: &Context, action: OrgAction) -> Result<()> {
    match action {
        OrgAction::Upsert {
            key,
            legacy,
            name,
            url,
            linkedin_url,
            bio,
            mission,
            offerings,
        } => {
            let key = if legacy {
                ExternalKey::legacy(key)
            } else {
                ExternalKey::workspace(key)
            };
            let input = OrganizationUpsert {
                name,
                url,
                linkedin_url,
                bio,
                mission,
                offerings,
                ..OrganizationUpsert::new(key)
            };
            let storage = ctx.open().await?;
            let id = storage.upsert_organization(&input).await?;
            let organization = storage.get_organization(&OrgRef::Id(id.clone())).await?;
            info!(organization_id = %id, "organization upserted");
            print_json(&organization)
        }
        OrgAction::Show {
            org,
            include_hidden,
        } => {
            let storage = ctx.open_for_read().await?;
            let graph = organization_graph(&storage, &org, include_hidden).await?;
            print_json(&graph)
        }
    }
}

async fn cmd_member(ctx: &Context, action: MemberAction) -> Result<()> {
    match action {
        MemberAction::Upsert {
            org,
            first_name,
            last_name,
            linkedin_url,
            website,
            role,
            joined_at,
            confidence,
            rationale,
        } => {
            let input = IndividualUpsert {
                first_name,
                last_name,
                linkedin_url,
                website,
                role,
                joined_at,
                confidence_level: confidence,
                confidence_rationale: rationale,
            };
            let storage = ctx.open().await?;
            let ids = storage
                .upsert_individual_with_membership(&org, &input)
                .await?;
            print_json(&ids)
        }
        MemberAction::Status {
            org,
            individual_id,
            status,
        } => {
            let storage = ctx.open().await?;
            let outcome = storage
                .update_membership_status(&org, &individual_id, status)
                .await?;
            print_outcome(&outcome)
        }
        MemberAction::Articles { org, individual_id } => {
            let storage = ctx.open_for_read().await?;
            let outcome = storage.individual_articles(&org, &individual_id).await?;
            print_outcome(&outcome)
        }
    }
}

async fn cmd_article(ctx: &Context, action: ArticleAction) -> Result<()> {
    match action {
        ArticleAction::Upsert {
            individual_id,
            url,
            title,
            content,
            published_at,
        } => {
            let content = match content {
                Some(path) => Some(read_input(Some(&path))?),
                None => None,
            };
            let input = ArticleUpsert {
                individual_id,
                url,
                title,
                content,
                published_at,
            };
            let storage = ctx.open().await?;
            let id = storage.upsert_article(&input).await?;
            print_json(&serde_json::json!({ "article_id": id }))
        }
    }
}

async fn cmd_relation(ctx: &Context, action: RelationAction) -> Result<()> {
    match action {
        RelationAction::Status {
            source,
            target,
            status,
        } => {
            let storage = ctx.open().await?;
            let outcome = storage
                .update_relation_status(&source, &target, status)
                .await?;
            print_outcome(&outcome)
        }
        RelationAction::Show { source, target } => {
            let storage = ctx.open_for_read().await?;
            let edge = storage.relation_between(&source, &target).await?;
            print_json(&edge)
        }
    }
}

async fn cmd_ingest(ctx: &Context, action: IngestAction) -> Result<()> {
    let storage = ctx.open().await?;
    let reporter = CliProgress::new();

    match action {
        IngestAction::Relations { file } => {
            let raw = read_input(file.as_deref())?;
            let report = ingest_relations(&storage, &raw, &reporter).await?;
            print_json(&report)
        }
        IngestAction::ScrapeQueue { domain, file } => {
            let raw = read_input(file.as_deref())?;
            let report = ingest_scrape_queue(&storage, &raw, &domain, &reporter).await?;
            print_json(&report)
        }
        IngestAction::Pages { file } => {
            let raw = read_input(file.as_deref())?;
            let defaults = PageDefaults::try_from(&ctx.config)?;
            let report = ingest_web_pages(&storage, &raw, defaults, &reporter).await?;
            print_json(&report)
        }
        IngestAction::Theses { org, file } => {
            let raw = read_input(file.as_deref())?;
            let report = ingest_theses(&storage, &raw, &org, &reporter).await?;
            print_json(&report)
        }
    }
}

async fn cmd_thesis(ctx: &Context, action: ThesisAction) -> Result<()> {
    match action {
        ThesisAction::Status {
            thesis_id,
            status,
            reason,
            user,
        } => {
            let change = ThesisStatusChange {
                status,
                reason,
                changed_by: user.map_or(ChangedBy::Ai, ChangedBy::User),
            };
            let storage = ctx.open().await?;
            let outcome = storage.update_thesis_status(&thesis_id, &change).await?;
            print_outcome(&outcome)
        }
        ThesisAction::List { org, level } => {
            let storage = ctx.open_for_read().await?;
            let theses = storage.organization_theses(&org, level).await?;
            print_json(&theses)
        }
    }
}

async fn cmd_pages(ctx: &Context, action: PagesAction) -> Result<()> {
    match action {
        PagesAction::Unscraped { org } => {
            let storage = ctx.open_for_read().await?;
            let queue = storage.unscraped_pages(&org).await?;
            print_json(&queue)
        }
        PagesAction::Scraped { org } => {
            let storage = ctx.open_for_read().await?;
            let pages = storage.scraped_pages(&org).await?;
            print_json(&pages)
        }
        PagesAction::Record { url, file } => {
            let text = read_input(file.as_deref())?;
            let storage = ctx.open().await?;
            let normalized = storage
                .record_scraped_content(&url, None, Some(&text), None)
                .await?;
            print_json(&serde_json::json!({ "normalized_url": normalized }))
        }
    }
}

async fn cmd_generation(ctx: &Context, action: GenerationAction) -> Result<()> {
    match action {
        GenerationAction::Start { org, theses_level } => {
            let storage = ctx.open().await?;
            let outcome = storage.start_generation(&org, scope(theses_level)).await?;
            print_outcome(&outcome)
        }
        GenerationAction::Complete { org, kind } => {
            let storage = ctx.open().await?;
            let outcome = storage.complete_generation(&org, kind.into()).await?;
            print_outcome(&outcome)
        }
        GenerationAction::Status { org, theses_level } => {
            let storage = ctx.open_for_read().await?;
            let outcome = storage.generation_state(&org, scope(theses_level)).await?;
            print_outcome(&outcome)
        }
        GenerationAction::Stale { older_than_minutes } => {
            let minutes = older_than_minutes.unwrap_or(ctx.config.generation.stale_after_minutes);
            let age = chrono::Duration::from_std(Duration::from_secs(minutes.saturating_mul(60)))
                .map_err(|e| eyre!("invalid threshold of {minutes} minutes: {e}"))?;
            let storage = ctx.open_for_read().await?;
            let stale = storage.stale_generations(Utc::now() - age).await?;
            info!(minutes, count = stale.len(), "stale generations listed");
            print_json(&stale)
        }
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner on stderr while an ingest call runs.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl IngestProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, summary: &IngestSummary) {
        self.spinner.finish_and_clear();
        eprintln!(
            "  {}: {} inserted, {} updated, {} skipped ({:.1}s)",
            summary.kind,
            summary.inserted,
            summary.updated,
            summary.skipped,
            summary.elapsed.as_secs_f64()
        );
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn org_refs_and_statuses_parse_from_args() {
        let cli = Cli::parse_from([
            "brandgraph",
            "relation",
            "status",
            "domain:acme.com",
            "org_globex",
            "not_related",
        ]);
        match cli.command {
            Command::Relation {
                action:
                    RelationAction::Status {
                        source,
                        target,
                        status,
                    },
            } => {
                assert_eq!(source, OrgRef::Domain("acme.com".into()));
                assert_eq!(target, OrgRef::Workspace("org_globex".into()));
                assert_eq!(status, RelationStatus::NotRelated);
            }
            _ => panic!("expected relation status"),
        }
    }

    #[test]
    fn retired_thesis_status_is_rejected() {
        let parsed = Cli::try_parse_from(["brandgraph", "thesis", "status", "t1", "pending"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn generation_level_out_of_range_is_rejected() {
        let parsed = Cli::try_parse_from([
            "brandgraph",
            "generation",
            "start",
            "org_acme",
            "--theses-level",
            "11",
        ]);
        assert!(parsed.is_err());
    }
}
