//! `nexus-pages`: operate the page store, its background indexing and
//! normalization jobs, and one-shot maintenance triggers from the command
//! line (spec §6, `[SUPPLEMENT]`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use nexus_pages::config::Config;
use nexus_pages::errors::Result;
use nexus_pages::events::{DeferredSink, EventSink, FanOutSink};
use nexus_pages::import::{self, ImportAccumulator, ImportRecordJob, ImportReportJob};
use nexus_pages::index::{FrontMatterIndex, FullTextIndex, IndexingService, IndexingSink};
use nexus_pages::inventory::{FullSweepJob, InventorySink};
use nexus_pages::logger;
use nexus_pages::page::PageStore;
use nexus_pages::queue::{Coordinator, Job};
use nexus_pages::shadowing::ScanJob;

#[derive(Parser)]
#[command(name = "nexus-pages", about = "Content-addressed page store with background job coordination")]
struct Cli {
    #[arg(long, default_value = "nexus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the store, indexing service and cron schedules until interrupted.
    Serve,
    /// Run the C9 import engine over a CSV file.
    Import {
        file: PathBuf,
        #[arg(long)]
        template: Option<String>,
    },
    /// Query the front-matter index for an exact value at a dotted path.
    FindBy { key: String, value: String },
    /// Query the front-matter index for string values with a given prefix.
    FindByPrefix { key: String, prefix: String },
    /// Query the front-matter index for ids where a dotted path is present.
    FindByKeyExistence { key: String },
    /// Query the full-text index.
    Search { query: String },
    /// Run the C7 shadowing-migration scan once.
    MigrateShadows,
    /// Run the C8 inventory full sweep once.
    NormalizeInventory,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logger::init_for_data_dir(&config.data_dir, &config.log_level) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        log::error!("failed to create data directory {:?}: {e}", config.data_dir);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Everything a subcommand needs: the store, the coordinator, and the
/// indexing service wired together through a [`DeferredSink`] to break the
/// store/indexing-service construction cycle.
struct Context {
    store: Arc<PageStore>,
    coordinator: Coordinator,
    indexing: Arc<IndexingService>,
}

fn build_context(config: &Config) -> Result<Context> {
    let deferred = Arc::new(DeferredSink::new());
    let store = Arc::new(PageStore::new(&config.data_dir, deferred.clone() as Arc<dyn EventSink>));
    let coordinator = Coordinator::new();
    let fm_index = Arc::new(FrontMatterIndex::new());
    let ft_index = Arc::new(FullTextIndex::open_or_create(&config.fulltext_index_dir)?);
    let indexing = Arc::new(IndexingService::new(coordinator.clone(), fm_index, ft_index, store.clone()));
    let inventory_sink = Arc::new(InventorySink::new(store.clone(), coordinator.clone()));
    coordinator.register_queue(nexus_pages::shadowing::SHADOWING_QUEUE);
    deferred.bind(Arc::new(FanOutSink(vec![Arc::new(IndexingSink(indexing.clone())), inventory_sink])));
    Ok(Context { store, coordinator, indexing })
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Serve => run_serve(&config).await,
        Command::Import { file, template } => run_import(&config, &file, template.as_deref()).await,
        Command::FindBy { key, value } => run_find_by(&config, &key, &value),
        Command::FindByPrefix { key, prefix } => run_find_by_prefix(&config, &key, &prefix),
        Command::FindByKeyExistence { key } => run_find_by_key_existence(&config, &key),
        Command::Search { query } => run_search(&config, &query),
        Command::MigrateShadows => run_migrate_shadows(&config),
        Command::NormalizeInventory => run_normalize_inventory(&config),
    }
}

async fn run_serve(config: &Config) -> Result<()> {
    let ctx = build_context(config)?;

    let mut schedules = Vec::new();
    if config.cron.shadowing_scan {
        let store = ctx.store.clone();
        let coordinator = ctx.coordinator.clone();
        schedules.push(nexus_pages::queue::schedule(ctx.coordinator.clone(), &config.cron.shadowing_scan_expr, move || {
            Box::new(ScanJob::new(store.clone(), coordinator.clone()))
        })?);
    }
    if config.cron.inventory_sweep {
        let store = ctx.store.clone();
        schedules.push(nexus_pages::queue::schedule(ctx.coordinator.clone(), &config.cron.inventory_sweep_expr, move || {
            Box::new(FullSweepJob::new(store.clone()))
        })?);
    }

    log::info!("nexus-pages serving from {:?}", config.data_dir);
    let cancel = tokio_util::sync::CancellationToken::new();
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("failed to listen for shutdown signal: {e}");
    }
    log::info!("shutdown requested");
    for handle in &schedules {
        handle.stop();
    }
    ctx.coordinator.drain(&cancel).await;
    Ok(())
}

async fn run_import(config: &Config, file: &std::path::Path, template: Option<&str>) -> Result<()> {
    let ctx = build_context(config)?;
    let reader = std::fs::File::open(file)?;
    let mut records = import::parse_records(reader).map_err(|e| nexus_pages::errors::PageError::Config(e.to_string()))?;
    if let Some(template) = template {
        for record in &mut records {
            if record.template.is_none() {
                record.template = Some(template.to_string());
            }
        }
    }

    let accumulator = ImportAccumulator::new();
    for record in records {
        ImportRecordJob::new(ctx.store.clone(), accumulator.clone(), record).execute()?;
    }
    ImportReportJob::new(ctx.store.clone(), accumulator.clone()).execute()?;

    let cancel = tokio_util::sync::CancellationToken::new();
    ctx.indexing.wait_for_completion(Duration::from_secs(30), &cancel).await;
    let (created, updated, failed) = accumulator.snapshot();
    log::info!("import complete: {} created, {} updated, {} failed", created.len(), updated.len(), failed.len());
    Ok(())
}

fn run_find_by(config: &Config, key: &str, value: &str) -> Result<()> {
    let ctx = build_context(config)?;
    rebuild_frontmatter_index_sync(&ctx)?;
    for id in ctx.indexing.front_matter_index().query_exact_match(key, value) {
        println!("{id}");
    }
    Ok(())
}

fn run_find_by_prefix(config: &Config, key: &str, prefix: &str) -> Result<()> {
    let ctx = build_context(config)?;
    rebuild_frontmatter_index_sync(&ctx)?;
    for id in ctx.indexing.front_matter_index().query_prefix_match(key, prefix) {
        println!("{id}");
    }
    Ok(())
}

fn run_find_by_key_existence(config: &Config, key: &str) -> Result<()> {
    let ctx = build_context(config)?;
    rebuild_frontmatter_index_sync(&ctx)?;
    for id in ctx.indexing.front_matter_index().query_key_existence(key) {
        println!("{id}");
    }
    Ok(())
}

fn run_search(config: &Config, query: &str) -> Result<()> {
    let ctx = build_context(config)?;
    for id in ctx.store.list()? {
        if let Ok((_, body)) = ctx.store.read_markdown(id.as_str()) {
            ctx.indexing.full_text_index().upsert(id.as_str(), &body)?;
        }
    }
    for id in ctx.indexing.full_text_index().search(query)? {
        println!("{id}");
    }
    Ok(())
}

/// The one-shot query subcommands rebuild the front-matter index in the
/// calling thread rather than waiting on the queue-driven indexing service,
/// since a single-shot CLI invocation has no long-running coordinator to
/// wait on between process start and the query itself.
fn rebuild_frontmatter_index_sync(ctx: &Context) -> Result<()> {
    for id in ctx.store.list()? {
        if let Ok((_, fm)) = ctx.store.read_front_matter(id.as_str()) {
            ctx.indexing.front_matter_index().replace_for_id(id.as_str(), fm.flatten());
        }
    }
    Ok(())
}

fn run_migrate_shadows(config: &Config) -> Result<()> {
    let ctx = build_context(config)?;
    ScanJob::new(ctx.store.clone(), ctx.coordinator.clone()).execute()?;
    wait_for_queue_drain(&ctx.coordinator, nexus_pages::shadowing::SHADOWING_QUEUE);
    Ok(())
}

fn run_normalize_inventory(config: &Config) -> Result<()> {
    let ctx = build_context(config)?;
    FullSweepJob::new(ctx.store.clone()).execute()?;
    Ok(())
}

fn wait_for_queue_drain(coordinator: &Coordinator, queue_name: &str) {
    for _ in 0..600 {
        match coordinator.queue_stats(queue_name) {
            Ok(stats) if stats.jobs_remaining == 0 && !stats.is_active => return,
            Ok(_) => std::thread::sleep(Duration::from_millis(50)),
            Err(_) => return,
        }
    }
}
