//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use visapress_core::{
    BulkProgress, BulkReport, BulkRequest, ImageServices, Pipeline, PlanOutcome, PlanRequest,
    Settings,
};
use visapress_providers::{HttpObjectStore, OpenRouterClient, RevalidateHook, UnsplashClient};
use visapress_sanitizer::slugify;
use visapress_shared::{
    AppConfig, AutoSchedule, ContentStatus, Lifecycle, Period, PipelineError, TopicStatus,
    init_config, load_config, read_secret, validate_api_key,
};
use visapress_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Visapress: AI content pipeline for travel-visa articles.
#[derive(Parser)]
#[command(
    name = "visapress",
    version,
    about = "Plan, generate, review and publish travel-visa articles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database file (overrides `pipeline.database_path`).
    #[arg(long, env = "VISAPRESS_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
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
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Manage subjects (countries).
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },

    /// Create and inspect topic plans.
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Review planned topics.
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },

    /// Generate, review and publish articles.
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum SubjectAction {
    /// Register a subject.
    Add {
        /// Display name, e.g. "Italy".
        name: String,

        /// URL slug (defaults to the slugified name).
        #[arg(long)]
        slug: Option<String>,
    },
    /// List subjects.
    List,
}

/// Options shared by `plan create` and `plan bulk`.
#[derive(clap::Args)]
pub(crate) struct PlanOptions {
    /// Planning period, YYYY-MM.
    #[arg(long)]
    pub period: Period,

    /// Topics per plan (defaults to `pipeline.default_topic_count`).
    #[arg(long)]
    pub topics: Option<u32>,

    /// Insert topics already approved.
    #[arg(long)]
    pub auto_approve: bool,

    /// First publication date, YYYY-MM-DD. Enables auto scheduling.
    #[arg(long)]
    pub schedule_start: Option<NaiveDate>,

    /// Publication rate used with `--schedule-start`.
    #[arg(long, default_value = "3")]
    pub posts_per_week: u32,
}

impl PlanOptions {
    fn auto_schedule(&self) -> Option<AutoSchedule> {
        self.schedule_start.map(|start_date| AutoSchedule {
            start_date,
            posts_per_week: self.posts_per_week,
        })
    }
}

#[derive(Subcommand)]
pub(crate) enum PlanAction {
    /// Create a plan for one subject.
    Create {
        /// Subject ID.
        #[arg(long)]
        subject: String,

        #[command(flatten)]
        options: PlanOptions,
    },
    /// Create one plan per subject.
    Bulk {
        /// Subject IDs (comma-separated).
        #[arg(long, value_delimiter = ',', required_unless_present = "all")]
        subjects: Vec<String>,

        /// Use every registered subject.
        #[arg(long, conflicts_with = "subjects")]
        all: bool,

        #[command(flatten)]
        options: PlanOptions,
    },
    /// List plans.
    List {
        /// Only plans of this subject.
        #[arg(long)]
        subject: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum TopicAction {
    /// List the topics of a plan.
    List {
        /// Plan ID.
        #[arg(long)]
        plan: String,

        /// Filter by status (pending, approved, generating, ...).
        #[arg(long)]
        status: Option<String>,
    },
    /// Approve a pending topic.
    Approve { id: String },
    /// Reject a topic.
    Reject { id: String },
    /// Put a topic stuck in `generating` back to `approved`.
    Reset { id: String },
}

#[derive(Subcommand)]
pub(crate) enum ContentAction {
    /// Generate the article for an approved topic.
    Generate {
        /// Topic ID.
        topic: String,
    },
    /// Approve an article in review.
    Approve { id: String },
    /// Reject an article in review.
    Reject { id: String },
    /// Publish an approved article.
    Publish { id: String },
    /// Print an article as JSON.
    Show { id: String },
    /// List articles.
    List {
        /// Filter by status (review, approved, rejected, published).
        #[arg(long)]
        status: Option<String>,
    },
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "visapress=info",
        1 => "visapress=debug",
        _ => "visapress=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let db = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.pipeline.database_path));

    match cli.command {
        Command::Subject { action } => match action {
            SubjectAction::Add { name, slug } => cmd_subject_add(&db, &name, slug.as_deref()).await,
            SubjectAction::List => cmd_subject_list(&db).await,
        },
        Command::Plan { action } => match action {
            PlanAction::Create { subject, options } => {
                cmd_plan_create(&config, &db, &subject, &options).await
            }
            PlanAction::Bulk {
                subjects,
                all,
                options,
            } => cmd_plan_bulk(&config, &db, subjects, all, &options).await,
            PlanAction::List { subject } => cmd_plan_list(&db, subject.as_deref()).await,
        },
        Command::Topic { action } => match action {
            TopicAction::List { plan, status } => {
                cmd_topic_list(&db, &plan, status.as_deref()).await
            }
            TopicAction::Approve { id } => {
                let pipeline = open_pipeline(&config, &db, false).await?;
                pipeline.approve_topic(&id).await?;
                println!("Topic {id} approved.");
                Ok(())
            }
            TopicAction::Reject { id } => {
                let pipeline = open_pipeline(&config, &db, false).await?;
                pipeline.reject_topic(&id).await?;
                println!("Topic {id} rejected.");
                Ok(())
            }
            TopicAction::Reset { id } => {
                let pipeline = open_pipeline(&config, &db, false).await?;
                pipeline.reset_topic(&id).await?;
                println!("Topic {id} reset to approved.");
                Ok(())
            }
        },
        Command::Content { action } => match action {
            ContentAction::Generate { topic } => cmd_content_generate(&config, &db, &topic).await,
            ContentAction::Approve { id } => {
                let pipeline = open_pipeline(&config, &db, false).await?;
                pipeline.approve_content(&id).await?;
                println!("Content {id} approved.");
                Ok(())
            }
            ContentAction::Reject { id } => {
                let pipeline = open_pipeline(&config, &db, false).await?;
                pipeline.reject_content(&id).await?;
                println!("Content {id} rejected.");
                Ok(())
            }
            ContentAction::Publish { id } => cmd_content_publish(&config, &db, &id).await,
            ContentAction::Show { id } => cmd_content_show(&db, &id).await,
            ContentAction::List { status } => cmd_content_list(&db, status.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Open the database read-only for listing commands.
async fn open_for_reading(db: &Path) -> Result<Storage> {
    if !db.exists() {
        return Err(eyre!(
            "no database at '{}'. Add a subject first or pass --db.",
            db.display()
        ));
    }
    Ok(Storage::open_readonly(db).await?)
}

/// Build the pipeline and its collaborators from config.
///
/// With `needs_llm` the OpenRouter key must be set; other commands never
/// call the model and tolerate its absence.
async fn open_pipeline(config: &AppConfig, db: &Path, needs_llm: bool) -> Result<Pipeline> {
    if needs_llm {
        validate_api_key(config)?;
    }
    let settings = Settings::from_config(config);
    let key = read_secret(&config.openrouter.api_key_env).unwrap_or_default();
    let llm = OpenRouterClient::new(&config.openrouter, key)?.with_site_url(&settings.site_url);

    let storage = Storage::open(db).await?;
    let mut pipeline = Pipeline::new(storage, Arc::new(llm), settings);

    match image_services(config) {
        Ok(images) => pipeline = pipeline.with_images(images),
        Err(e) => debug!(reason = %e, "cover images disabled"),
    }
    if let Some(hook) = RevalidateHook::from_config(&config.site)? {
        pipeline = pipeline.with_invalidator(Arc::new(hook));
    }
    Ok(pipeline)
}

fn image_services(config: &AppConfig) -> visapress_shared::Result<ImageServices> {
    Ok(ImageServices {
        photos: Arc::new(UnsplashClient::from_env(&config.unsplash)?),
        store: Arc::new(HttpObjectStore::from_env(&config.object_storage)?),
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_subject_add(db: &Path, name: &str, slug: Option<&str>) -> Result<()> {
    let slug = slug.map(String::from).unwrap_or_else(|| slugify(name));
    if slug.is_empty() {
        return Err(eyre!("cannot derive a slug from '{name}'; pass --slug"));
    }
    let storage = Storage::open(db).await?;
    let subject = storage.insert_subject(name, &slug).await?;
    println!("Subject added: {} ({})", subject.id, subject.slug);
    Ok(())
}

async fn cmd_subject_list(db: &Path) -> Result<()> {
    let storage = open_for_reading(db).await?;
    let subjects = storage.list_subjects().await?;
    if subjects.is_empty() {
        println!("No subjects registered.");
        return Ok(());
    }
    for s in subjects {
        println!("{}  {:<24} {}", s.id, s.name, s.slug);
    }
    Ok(())
}

async fn cmd_plan_create(
    config: &AppConfig,
    db: &Path,
    subject: &str,
    options: &PlanOptions,
) -> Result<()> {
    let pipeline = open_pipeline(config, db, true).await?;
    let request = PlanRequest {
        subject_id: subject.to_string(),
        period: options.period,
        topic_count: options.topics,
        auto_approve: options.auto_approve,
        auto_schedule: options.auto_schedule(),
    };

    info!(subject, period = %options.period, "creating plan");
    let spinner = spinner(format!("Planning topics for {}", options.period));
    let outcome = pipeline.create_plan(&request).await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    println!();
    println!("  Plan created!");
    println!("  ID:        {}", outcome.plan_id);
    println!("  Topics:    {}", outcome.topics_generated);
    if outcome.recovered {
        println!("  Recovered: truncated model output");
    }
    if outcome.dropped > 0 {
        println!("  Dropped:   {}", outcome.dropped);
    }
    println!();
    Ok(())
}

async fn cmd_plan_bulk(
    config: &AppConfig,
    db: &Path,
    subjects: Vec<String>,
    all: bool,
    options: &PlanOptions,
) -> Result<()> {
    let pipeline = open_pipeline(config, db, true).await?;
    let subject_ids = if all {
        pipeline
            .storage()
            .list_subjects()
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect()
    } else {
        subjects
    };

    let request = BulkRequest {
        subject_ids,
        period: options.period,
        topics_per_subject: options.topics,
        auto_approve: options.auto_approve,
        auto_schedule: options.auto_schedule(),
    };
    let reporter = CliProgress::new();
    let report = pipeline.bulk_create_plans(&request, &reporter).await?;

    println!();
    println!("  Bulk planning finished.");
    println!("  Requested: {}", report.requested);
    println!("  Created:   {}", report.created_plans.len());
    println!("  Failed:    {}", report.failed_subjects.len());
    println!("  Topics:    {}", report.total_topics_created);
    for failed in &report.failed_subjects {
        println!("    ✗ {}: {}", failed.subject_id, failed.error);
    }
    println!();
    Ok(())
}

async fn cmd_plan_list(db: &Path, subject: Option<&str>) -> Result<()> {
    let storage = open_for_reading(db).await?;
    let plans = storage.list_plans(subject).await?;
    if plans.is_empty() {
        println!("No plans.");
        return Ok(());
    }
    for p in plans {
        println!(
            "{}  {}  {:<10} {}/{} approved  (subject {})",
            p.id, p.period, p.status, p.approved_topics, p.generated_topics, p.subject_id
        );
    }
    Ok(())
}

async fn cmd_topic_list(db: &Path, plan: &str, status: Option<&str>) -> Result<()> {
    let status = status.map(parse_status::<TopicStatus>).transpose()?;
    let storage = open_for_reading(db).await?;
    let topics = storage.list_topics(plan, status).await?;
    for t in topics {
        let scheduled = t
            .scheduled_for
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {:<10} p{:<2} {:<16} {}  {}",
            t.id, t.status, t.proposal.priority, t.proposal.category, scheduled, t.proposal.title.primary
        );
    }
    Ok(())
}

async fn cmd_content_generate(config: &AppConfig, db: &Path, topic: &str) -> Result<()> {
    let pipeline = open_pipeline(config, db, true).await?;

    let spinner = spinner("Writing article".to_string());
    let outcome = pipeline.generate_content(topic).await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    println!();
    println!("  Article generated, awaiting review.");
    println!("  ID:     {}", outcome.content_id);
    println!("  Words:  {}", outcome.word_count);
    println!("  Cover:  {}", if outcome.has_image { "yes" } else { "no" });
    for f in &outcome.enrichment_failures {
        println!("  ! {}: {}", f.step, f.message);
    }
    println!();
    Ok(())
}

async fn cmd_content_publish(config: &AppConfig, db: &Path, id: &str) -> Result<()> {
    let pipeline = open_pipeline(config, db, false).await?;
    match pipeline.publish_content(id).await {
        Ok(outcome) => {
            println!();
            println!("  Published!");
            println!("  Post: {}", outcome.published_entity_id);
            println!("  URL:  {}", outcome.url);
            for f in &outcome.enrichment_failures {
                println!("  ! {}: {}", f.step, f.message);
            }
            println!();
            Ok(())
        }
        Err(PipelineError::AlreadyPublished { entity_id, url }) => {
            println!("Already published as {entity_id}: {url}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_content_show(db: &Path, id: &str) -> Result<()> {
    let storage = open_for_reading(db).await?;
    let content = storage
        .get_content(id)
        .await?
        .ok_or_else(|| eyre!("content not found: {id}"))?;
    println!("{}", serde_json::to_string_pretty(&content)?);
    Ok(())
}

async fn cmd_content_list(db: &Path, status: Option<&str>) -> Result<()> {
    let status = status.map(parse_status::<ContentStatus>).transpose()?;
    let storage = open_for_reading(db).await?;
    for c in storage.list_contents(status).await? {
        println!(
            "{}  {:<9} {:>5}w  {}",
            c.id, c.status, c.word_count, c.title.primary
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

fn parse_status<S: Lifecycle>(s: &str) -> Result<S> {
    S::parse(s).ok_or_else(|| {
        let known: Vec<&str> = S::ALL.iter().map(|v| v.as_str()).collect();
        eyre!("unknown {} status '{s}': expected one of {}", S::ENTITY, known.join(", "))
    })
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    spinner
}

/// Bulk progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting bulk run".to_string()),
        }
    }
}

impl BulkProgress for CliProgress {
    fn subject_started(&self, subject_id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Planning [{current}/{total}] {subject_id}"));
    }

    fn subject_finished(&self, subject_id: &str, outcome: &visapress_shared::Result<PlanOutcome>) {
        match outcome {
            Ok(plan) => self.spinner.println(format!(
                "  ✓ {subject_id}: {} topics",
                plan.topics_generated
            )),
            Err(e) => self.spinner.println(format!("  ✗ {subject_id}: {e}")),
        }
    }

    fn done(&self, _report: &BulkReport) {
        self.spinner.finish_and_clear();
    }
}
