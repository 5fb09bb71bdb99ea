use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pressroom_common::{Config, FileConfig, Taxonomy};
use pressroom_pipeline::generation::LlmGenerator;
use pressroom_pipeline::infra::{select_language_model, MalformedOutputLog, RateLimitedModel, RateLimiter};
use pressroom_pipeline::pipeline::process::SourceDefaults;
use pressroom_pipeline::pipeline::DiscoveryRequest;
use pressroom_pipeline::reclassify::reclassify;
use pressroom_pipeline::scheduler::{today_ist, DiscoveryScheduler};
use pressroom_pipeline::source::HttpContentSource;
use pressroom_pipeline::store::{MemoryRegistry, PgRegistry};
use pressroom_pipeline::traits::{DocumentRegistry, JobLedger, TaskQueue};
use pressroom_pipeline::translation::{LlmTranslator, TranslationRetry};
use pressroom_pipeline::{LocalQueue, Pipeline, PipelineDeps, RetryPolicy};

#[derive(Parser)]
#[command(name = "pressroom", about = "Press release ingestion and translation pipeline")]
struct Cli {
    /// Path to config TOML file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep all state in memory instead of Postgres.
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start workers and the periodic discovery loop.
    Run,
    /// One discovery pass, then wait for every dispatched task.
    Discover {
        /// Listing date (YYYY-MM-DD). Defaults to today on the portal.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Dispatch at most this many new documents.
        #[arg(long)]
        limit: Option<usize>,
        /// Only this listing entry.
        #[arg(long)]
        url: Option<String>,
    },
    /// Process a single release URL directly.
    Process {
        #[arg(long)]
        url: String,
        #[arg(long)]
        ministry: String,
    },
    /// Recompute audience and category tags from the taxonomy.
    Reclassify {
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply database migrations.
    Migrate,
    /// List ready documents and their languages.
    Ready,
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("pressroom=info".parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

struct Registry {
    documents: Arc<dyn DocumentRegistry>,
    ledger: Arc<dyn JobLedger>,
}

async fn open_registry(config: &Config, in_memory: bool) -> Result<Registry> {
    let Some(url) = config.database_url.as_deref().filter(|_| !in_memory) else {
        warn!("Using in-memory registry; nothing will persist past this process");
        let memory = Arc::new(MemoryRegistry::new());
        return Ok(Registry {
            documents: memory.clone(),
            ledger: memory,
        });
    };

    let pg = Arc::new(PgRegistry::connect(url).await?);
    pg.migrate().await.context("Failed to run migrations")?;
    info!("Connected to Postgres");
    Ok(Registry {
        documents: pg.clone(),
        ledger: pg,
    })
}

fn load_taxonomy(file: &FileConfig) -> Result<Taxonomy> {
    let taxonomy = match &file.taxonomy_path {
        Some(path) => Taxonomy::load(path)?,
        None => Taxonomy::builtin()?,
    };
    info!(ministries = taxonomy.len(), "Taxonomy loaded");
    Ok(taxonomy)
}

fn build_pipeline(config: &Config, file: &FileConfig, registry: &Registry) -> Result<Arc<Pipeline>> {
    let model = select_language_model(config)?;
    let limiter = Arc::new(RateLimiter::from_config(&file.rate_limit));
    let limited = RateLimitedModel::new(model, limiter, file.rate_limit.rate_limited_backoff());
    let malformed = Arc::new(MalformedOutputLog::new(file.pipeline.malformed_output_log.clone()));

    let generator = LlmGenerator::new(limited.clone(), malformed.clone());
    let translator = LlmTranslator::new(limited, TranslationRetry::from_config(&file.translation), malformed);
    let source = HttpContentSource::from_config(file.source.clone())?;

    let deps = PipelineDeps::builder()
        .source(Arc::new(source))
        .generator(Arc::new(generator))
        .translator(Arc::new(translator))
        .registry(registry.documents.clone())
        .ledger(registry.ledger.clone())
        .taxonomy(Arc::new(load_taxonomy(file)?))
        .source_language(file.pipeline.source_language)
        .target_languages(file.pipeline.target_languages())
        .build();

    Ok(Arc::new(Pipeline::new(deps)))
}

fn build_queue(pipeline: Arc<Pipeline>, file: &FileConfig) -> LocalQueue {
    let policy = RetryPolicy::new(file.pipeline.task_max_attempts, file.pipeline.task_initial_backoff());
    LocalQueue::new(pipeline, file.pipeline.worker_concurrency, policy)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = Config::from_env();
    config.log_redacted();

    let file = match &cli.config {
        Some(path) => {
            info!(config = %path.display(), "Loading config");
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };

    if let Command::Migrate = cli.command {
        let registry = PgRegistry::connect(config.require_database_url()?).await?;
        registry.migrate().await?;
        info!("Migrations applied");
        return Ok(());
    }

    let registry = open_registry(&config, cli.in_memory).await?;

    match cli.command {
        Command::Run => {
            let pipeline = build_pipeline(&config, &file, &registry)?;
            let queue = build_queue(pipeline.clone(), &file);
            let scheduler = DiscoveryScheduler::new(pipeline, Arc::new(queue.clone()), file.scheduler.clone());

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            };
            scheduler.run_until(shutdown).await;

            info!(in_flight = queue.in_flight(), "Draining in-flight tasks");
            queue.wait_idle().await;
        }
        Command::Discover { date, limit, url } => {
            let pipeline = build_pipeline(&config, &file, &registry)?;
            let queue = build_queue(pipeline.clone(), &file);
            let scheduler = DiscoveryScheduler::new(pipeline, Arc::new(queue.clone()), file.scheduler.clone());

            let request = DiscoveryRequest {
                date: date.unwrap_or_else(today_ist),
                limit,
                url,
            };
            let outcome = scheduler.discover_with_retry(&request).await?;
            queue.wait_idle().await;
            info!(
                listed = outcome.listed,
                already_known = outcome.already_known,
                dispatched = outcome.dispatched,
                dispatch_failed = outcome.dispatch_failed,
                "Discover finished"
            );
        }
        Command::Process { url, ministry } => {
            let pipeline = build_pipeline(&config, &file, &registry)?;
            let queue = build_queue(pipeline.clone(), &file);

            let outcome = pipeline
                .process_document(&url, &ministry, SourceDefaults::default(), &queue as &dyn TaskQueue)
                .await?;
            queue.wait_idle().await;
            info!(url = url.as_str(), outcome = ?outcome, "Process finished");
        }
        Command::Reclassify { dry_run } => {
            let taxonomy = load_taxonomy(&file)?;
            let report = reclassify(registry.documents.as_ref(), &taxonomy, dry_run).await?;
            println!(
                "examined={} changed={} unmatched={}{}",
                report.examined,
                report.changed,
                report.unmatched,
                if dry_run { " (dry run)" } else { "" }
            );
        }
        Command::Ready => {
            for document in registry.documents.ready_documents().await? {
                let languages = registry.documents.available_languages(document.id).await?;
                let codes: Vec<&str> = languages.iter().map(|l| l.code()).collect();
                println!("{}\t{}\t{}", document.source_url, codes.join(","), document.title);
            }
        }
        Command::Migrate => {}
    }

    Ok(())
}
