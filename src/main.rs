//! CLI entry point for the open-access downloader.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use oa_downloader_core::api::{self, AppState};
use oa_downloader_core::fetch::{
    BrowserSession, DirectFetch, FetchClientOptions, RetryPolicy, StrategyRegistry,
    UniversalStrategy, build_fetch_client,
};
use oa_downloader_core::pipeline::{
    BatchScheduler, PostFetchPipeline, ResultAggregator, RowResolver,
};
use oa_downloader_core::storage::{
    DocumentStore, GcsObjectStore, LocalObjectStore, MemoryDocumentStore, ObjectStore,
    SqliteDocumentStore,
};
use oa_downloader_core::{Database, LopdfTextExtractor};
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod progress;

use app_config::{Settings, load_file_config};
use cli::{Args, Command};
use progress::BatchProgress;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_file_config(args.config.as_deref())?;
    let mut settings = Settings::resolve(file_config.as_ref(), args.command.batch_args())?;
    if let Command::Serve { bind: Some(bind), .. } = &args.command {
        settings.bind_address = *bind;
    }
    debug!(?settings, "settings resolved");

    let database = match &settings.database_path {
        Some(path) => Some(
            Database::new(path)
                .await
                .with_context(|| format!("Failed to open database '{}'", path.display()))?,
        ),
        None => None,
    };
    let scheduler = Arc::new(build_scheduler(&settings, database.clone())?);

    let exit = match args.command {
        Command::Serve { .. } => {
            info!(address = %settings.bind_address, "starting HTTP entry point");
            api::serve(settings.bind_address, AppState::new(scheduler))
                .await
                .context("HTTP server failed")?;
            ExitCode::SUCCESS
        }
        Command::Run { input, .. } => {
            let body = match &input {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("Failed to read input '{}'", path.display()))?,
                None => {
                    let mut buffer = Vec::new();
                    io::stdin()
                        .read_to_end(&mut buffer)
                        .context("Failed to read stdin")?;
                    buffer
                }
            };
            run_once(&scheduler, &body, !args.quiet && io::stderr().is_terminal()).await?
        }
    };

    if let Some(database) = database {
        database.close().await;
    }
    Ok(exit)
}

/// Wires the strategies, stores and scheduler from `settings`.
fn build_scheduler(settings: &Settings, database: Option<Database>) -> Result<BatchScheduler> {
    let options = FetchClientOptions {
        connect_timeout: settings.connect_timeout,
        read_timeout: settings.read_timeout,
        ..FetchClientOptions::default()
    };

    let direct = DirectFetch::with_options(&options).context("Failed to build HTTP client")?;
    let registry =
        StrategyRegistry::with_defaults(&options).context("Failed to build publisher strategies")?;
    let browser = BrowserSession::discover(settings.browser_path.clone());
    if browser.executable().is_none() {
        warn!("no headless browser found; automated sessions disabled");
    }
    let universal =
        UniversalStrategy::new(&options, browser).context("Failed to build universal strategy")?;
    let resolver = RowResolver::new(
        Arc::new(direct),
        Arc::new(registry),
        Arc::new(universal),
        RetryPolicy::new(settings.max_retries, settings.base_delay),
    );

    let object_store: Arc<dyn ObjectStore> = match &settings.object_store_endpoint {
        Some(endpoint) => Arc::new(GcsObjectStore::new(
            build_fetch_client(&options).context("Failed to build upload client")?,
            endpoint.clone(),
            settings.public_base_url.clone(),
            settings.storage_token.clone(),
        )),
        None => Arc::new(LocalObjectStore::new(
            settings.object_store_root.clone(),
            settings.public_base_url.clone(),
        )),
    };
    let postfetch = PostFetchPipeline::new(
        object_store,
        Arc::new(LopdfTextExtractor),
        settings.bucket.clone(),
    );

    let document_store: Arc<dyn DocumentStore> = match database {
        Some(database) => Arc::new(SqliteDocumentStore::new(database)),
        None => {
            debug!("no database_path configured; status documents kept in memory");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    BatchScheduler::new(
        Arc::new(resolver),
        Arc::new(postfetch),
        Arc::new(ResultAggregator::new(document_store)),
        settings.output_dir.clone(),
        settings.concurrency,
    )
    .context("Invalid scheduler settings")
}

/// Runs one payload, prints the response JSON and maps the outcome to an exit code.
async fn run_once(scheduler: &BatchScheduler, body: &[u8], show_progress: bool) -> Result<ExitCode> {
    let progress = BatchProgress::start(show_progress);
    let callback = progress.as_ref().map(BatchProgress::callback);
    let outcome = api::process_payload(scheduler, body, callback).await;
    if let Some(progress) = progress {
        progress.finish();
    }

    match outcome {
        Ok(response) => {
            let fetched = response.results.iter().filter(|r| r.success).count();
            info!(
                records = response.results.len(),
                fetched,
                "batch finished"
            );
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error.body())?);
            Ok(if error.status().is_client_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
