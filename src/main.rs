//! indexer-aggregator - search many torrent indexers at once
//!
//! Loads indexer definitions, builds the configured indexers and runs one
//! command from the CLI, printing JSON to stdout.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use indexer_aggregator::cli::{CliOptions, Command, USAGE};
use indexer_aggregator::config::Config;
use indexer_aggregator::indexer::cardigann::store::{DefinitionSet, DefinitionStore};
use indexer_aggregator::indexer::http::{ChallengeSolver, FlareSolverrClient, ReqwestFetcher};
use indexer_aggregator::indexer::manager::{IndexerManager, ManagerOptions};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config);

    let options = CliOptions::from_args()?;
    let Some(command) = options.command else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command {
        Command::Help => println!("{}", USAGE),
        Command::Validate { path } => validate(path.unwrap_or_else(|| config.definitions_path.clone()))?,
        Command::List { filter } => {
            let store = DefinitionStore::open(&config.definitions_path);
            let definitions: Vec<_> = store
                .search(filter.as_deref().unwrap_or_default())
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "name": d.name,
                        "description": d.description,
                        "type": d.tracker_type().to_string(),
                        "links": d.all_links(),
                    })
                })
                .collect();
            let output = serde_json::json!({
                "stats": store.stats(),
                "definitions": definitions,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Search(request) => {
            let manager = build_manager(&config)?;
            let response = manager.search(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Test { indexer } => {
            let manager = build_manager(&config)?;
            match manager.test_indexer(&indexer).await {
                Ok(_) => println!("{}", serde_json::json!({ "indexer": indexer, "ok": true })),
                Err(e) => {
                    println!(
                        "{}",
                        serde_json::json!({ "indexer": indexer, "ok": false, "error": e.to_string() })
                    );
                    bail!("indexer test failed");
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "indexer_aggregator=info".into());

    // Logs go to stderr so stdout stays valid JSON
    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_manager(config: &Config) -> Result<IndexerManager> {
    let store = Arc::new(DefinitionStore::open(&config.definitions_path));
    let instances = config.load_instances()?;
    let fetcher = Arc::new(ReqwestFetcher::new().context("Failed to build HTTP client")?);

    let solver: Option<Arc<dyn ChallengeSolver>> = if config.flaresolverr_enabled {
        let client = FlareSolverrClient::new(&config.flaresolverr_url)
            .context("Failed to build FlareSolverr client")?;
        tracing::info!(url = %config.flaresolverr_url, "Challenge solver enabled");
        Some(Arc::new(client))
    } else {
        None
    };

    Ok(IndexerManager::from_store(
        store,
        instances,
        fetcher,
        solver,
        ManagerOptions::from(config),
    ))
}

fn validate(path: std::path::PathBuf) -> Result<()> {
    let set = DefinitionSet::load_dir(&path);
    let output = serde_json::json!({
        "path": path.display().to_string(),
        "loaded": set.len(),
        "failed": set.failures().len(),
        "failures": set.failures(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    if !set.failures().is_empty() {
        bail!("{} definition(s) failed to load", set.failures().len());
    }
    Ok(())
}
