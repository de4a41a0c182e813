use anyhow::Result;
use chartpulse::application::orchestrator::AnalysisOrchestrator;
use chartpulse::config::Config;
use chartpulse::infrastructure::export;
use chartpulse::infrastructure::persistence::database::Database;
use chartpulse::infrastructure::persistence::query_service::PgQueryService;
use chartpulse::infrastructure::persistence::repositories::{
    PgAssetRepository, PgBarRepository, PgRunRepository, PgSignalRepository, PgTrendRepository,
};
use chartpulse::interfaces::api;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chartpulse", about = "Cryptocurrency market analytics pipeline")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run trend classification and signal detection over the active assets.
    Analyze {
        /// Analysis mode override: legacy or advanced.
        #[arg(long)]
        mode: Option<String>,
    },
    /// Answer a free-text question against the derived records.
    Query {
        /// The question, e.g. "which coins bottomed out this week?"
        text: String,
        /// Retrieval window: 1h, 24h, 7d or 30d.
        #[arg(long)]
        timeframe: Option<String>,
        #[arg(long)]
        min_confidence: Option<f64>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Export trend and signal tables to CSV files.
    Export {
        /// Target directory for the CSV files.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    let default_level = if cli.debug || config.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_target(false)
        .init();

    match cli.command {
        Command::Analyze { mode } => {
            if let Some(mode) = mode {
                config.analysis_mode = mode.parse()?;
            }
            run_analysis(&config).await
        }
        Command::Query {
            text,
            timeframe,
            min_confidence,
            limit,
        } => run_query(&config, text, timeframe, min_confidence, limit).await,
        Command::Export { output_dir } => {
            let db = Database::connect(&config.db).await?;
            export::export_all(&db.pool, &output_dir).await?;
            Ok(())
        }
    }
}

async fn run_analysis(config: &Config) -> Result<()> {
    let db = Database::connect(&config.db).await?;

    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(PgAssetRepository::new(db.pool.clone())),
        Arc::new(PgBarRepository::new(db.pool.clone())),
        Arc::new(PgTrendRepository::new(db.pool.clone())),
        Arc::new(PgSignalRepository::new(db.pool.clone())),
        Arc::new(PgRunRepository::new(db.pool.clone())),
        config.analysis_mode,
        config.history_days,
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling analysis");
            signal_token.cancel();
        }
    });

    let summary = orchestrator.run(cancel).await?;
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        errors = summary.errors,
        trends = summary.trends_stored,
        signals = summary.signals_stored,
        "run finished"
    );
    for (signal_type, count) in &summary.signals_by_type {
        info!(signal_type = %signal_type, count = *count, "signal breakdown");
    }
    Ok(())
}

async fn run_query(
    config: &Config,
    text: String,
    timeframe: Option<String>,
    min_confidence: Option<f64>,
    limit: Option<i64>,
) -> Result<()> {
    let db = Database::connect(&config.db).await?;
    let gateway = PgQueryService::new(db.pool.clone());

    let body = serde_json::json!({
        "query": text,
        "filters": {
            "timeframe": timeframe,
            "min_confidence": min_confidence,
            "limit": limit,
        }
    })
    .to_string();

    let response = api::handle_query(Some(&body), &gateway).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.success { Ok(()) } else { std::process::exit(1) }
}
