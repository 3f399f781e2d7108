use anyhow::{bail, Context};
use clap::Parser;
use regchange_scraper::app::ports::JobTracker;
use regchange_scraper::config::Settings;
use regchange_scraper::constants::{DEFAULT_SETTINGS_PATH, DEFAULT_SOURCES_PATH, SOURCES_PATH_ENV};
use regchange_scraper::infra::job_api::HttpJobTracker;
use regchange_scraper::pipeline::{ScanOrchestrator, ScanOutcome};
use regchange_scraper::registry::{SourceCatalog, StageRegistry};
use regchange_scraper::storage::InMemoryJobTracker;
use regchange_scraper::types::Document;
use regchange_scraper::{logging, metrics};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

const ALL_JOBS: &str = "all";

#[derive(Parser)]
#[command(name = "regchange_scraper")]
#[command(about = "Scans regulatory-change sources and reports normalized documents")]
#[command(version = "0.1.0")]
struct Cli {
    /// Source id to scan, or `all` for every enabled source
    job: String,

    /// Source configuration file or directory of *.json files
    #[arg(long)]
    sources: Option<PathBuf>,

    /// Scanner settings (TOML)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Track runs in memory and print the documents instead of reporting to the API
    #[arg(long)]
    dry_run: bool,

    /// Write dry-run documents to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn sources_path(cli: &Cli) -> PathBuf {
    cli.sources
        .clone()
        .or_else(|| std::env::var(SOURCES_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCES_PATH))
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match &cli.settings {
        Some(path) => Settings::load(Some(path)),
        None if Path::new(DEFAULT_SETTINGS_PATH).exists() => Settings::load(Some(Path::new(DEFAULT_SETTINGS_PATH))),
        None => Settings::load(None),
    };
    settings.context("Failed to load scanner settings")
}

fn print_summary(outcomes: &[ScanOutcome]) {
    println!("\n📊 Scan results:");
    for outcome in outcomes {
        match &outcome.error {
            None => println!(
                "   ✅ {} (run {}): {} document(s)",
                outcome.source_id,
                outcome.run_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
                outcome.documents.len()
            ),
            Some(e) => println!("   ❌ {}: {}", outcome.source_id, e),
        }
    }
}

fn emit_documents(outcomes: &[ScanOutcome], output: Option<&Path>) -> anyhow::Result<()> {
    let documents: Vec<&Document> = outcomes.iter().flat_map(|o| o.documents.iter()).collect();
    let json = serde_json::to_string_pretty(&documents)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("💾 Wrote {} document(s) to {}", documents.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    metrics::init_metrics();

    let settings = load_settings(&cli)?;
    let path = sources_path(&cli);
    let catalog = SourceCatalog::load(&path)
        .with_context(|| format!("Failed to load sources from {}", path.display()))?;
    let registry = Arc::new(StageRegistry::with_builtin_stages(&settings)?);

    let tracker: Arc<dyn JobTracker> = if cli.dry_run {
        info!("🧪 Dry run: tracking runs in memory");
        Arc::new(InMemoryJobTracker::new())
    } else {
        Arc::new(HttpJobTracker::new(settings.api.base_url.clone())?)
    };
    let orchestrator = ScanOrchestrator::new(registry, tracker)
        .with_max_concurrent(settings.orchestrator.max_concurrent_sources);
    let correlation_id = Uuid::new_v4().to_string();

    let (outcomes, success) = if cli.job == ALL_JOBS {
        println!("🚀 Scanning all {} enabled source(s)...", catalog.enabled().len());
        let outcomes = orchestrator.run_all(catalog.all(), Some(&correlation_id)).await;
        (outcomes, true)
    } else {
        let Some(source) = catalog.get(&cli.job) else {
            bail!(
                "Unknown job '{}'. Available: {}",
                cli.job,
                catalog.ids().join(", ")
            );
        };
        println!("🚀 Scanning {}...", source.name);
        let outcome = orchestrator.run_source(source, Some(&correlation_id)).await;
        let success = outcome.is_success();
        (vec![outcome], success)
    };

    print_summary(&outcomes);
    if cli.dry_run {
        emit_documents(&outcomes, cli.output.as_deref())?;
    }
    Ok(success)
}

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG and friends may come from .env
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
