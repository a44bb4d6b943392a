//! Vigil CLI binary.
//!
//! Provides the command-line interface for the Vigil risk drift monitor.

mod integration;

use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use integration::engine::{CycleEngine, EngineConfig};
use integration::paths;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vigil::ClientRegistry;
use vigil_alert::{
    EpisodeStore, LogChannel, NotificationChannel, SqliteEpisodeStore, WebhookChannel,
};
use vigil_data::{MarketDataSource, PriceArchive, YahooChartSource};
use vigil_output::{
    EpisodeEventExport, ExportFormat, Exporter, RiskFigureExport, VolatilityExport,
};

/// Most recent episode events listed per client in status output.
const STATUS_EVENT_LIMIT: usize = 5;

/// Most recent episode events pulled for an events export.
const EVENT_EXPORT_LIMIT: usize = 1000;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil: Portfolio risk drift monitor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every client in the roster
    Run {
        /// Path to the client roster
        #[arg(long, default_value = "clients.toml")]
        config: PathBuf,

        /// State directory (defaults to the platform data dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Evaluation date (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Webhook endpoint for notifications (overrides the roster)
        #[arg(long)]
        webhook: Option<String>,

        /// Clients evaluated concurrently
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Output format (json or text)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Evaluate a single client
    Client {
        /// Client id from the roster
        id: String,

        /// Path to the client roster
        #[arg(long, default_value = "clients.toml")]
        config: PathBuf,

        /// State directory (defaults to the platform data dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Evaluation date (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Webhook endpoint for notifications (overrides the roster)
        #[arg(long)]
        webhook: Option<String>,

        /// Output format (json or text)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show stored episode state and latest risk per client
    Status {
        /// Path to the client roster
        #[arg(long, default_value = "clients.toml")]
        config: PathBuf,

        /// State directory (defaults to the platform data dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Restrict to one client id
        #[arg(long)]
        client: Option<String>,

        /// Output format (json or text)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Export audit history
    Export {
        /// What to export: risk, volatility or events
        kind: String,

        /// Client id (risk and events exports)
        #[arg(long)]
        client: Option<String>,

        /// Asset symbol (volatility export)
        #[arg(long)]
        symbol: Option<String>,

        /// Range start (defaults to a year before the end)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Range end (defaults to today, UTC)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Export format (csv, json or pretty-json)
        #[arg(long, default_value = "csv")]
        format: String,

        /// State directory (defaults to the platform data dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data_dir,
            as_of,
            webhook,
            concurrency,
            format,
        } => {
            run_roster(config, data_dir, as_of, webhook, concurrency, &format).await?;
        }
        Commands::Client {
            id,
            config,
            data_dir,
            as_of,
            webhook,
            format,
        } => {
            run_client(&id, config, data_dir, as_of, webhook, &format).await?;
        }
        Commands::Status {
            config,
            data_dir,
            client,
            format,
        } => {
            show_status(config, data_dir, client, &format)?;
        }
        Commands::Export {
            kind,
            client,
            symbol,
            start,
            end,
            output,
            format,
            data_dir,
        } => {
            export_data(&kind, client, symbol, start, end, output, &format, data_dir)?;
        }
    }

    Ok(())
}

/// Assemble an engine from the roster settings and CLI overrides.
fn build_engine(
    registry: &ClientRegistry,
    data_dir: Option<PathBuf>,
    webhook: Option<String>,
    concurrency: usize,
) -> Result<CycleEngine, Box<dyn std::error::Error>> {
    let settings = registry.settings();
    let data_dir = paths::resolve_data_dir(data_dir)?;

    let store: Arc<dyn EpisodeStore> =
        Arc::new(SqliteEpisodeStore::new(paths::state_db_path(&data_dir))?);
    let source: Arc<dyn MarketDataSource> = Arc::new(YahooChartSource::new()?);

    // A broken archive costs the raw price audit trail, not the cycle.
    let archive = match PriceArchive::new(paths::prices_db_path(&data_dir)) {
        Ok(archive) => Some(archive),
        Err(e) => {
            eprintln!("Warning: price archive unavailable: {}", e);
            None
        }
    };

    let endpoint = webhook.or_else(|| settings.webhook_url.clone());
    let channel: Arc<dyn NotificationChannel> = match endpoint {
        Some(url) => Arc::new(WebhookChannel::new(url)?),
        None => Arc::new(LogChannel::new()),
    };

    let mut config = EngineConfig::from_settings(settings);
    config.concurrency = concurrency;
    Ok(CycleEngine::new(store, source, channel, archive, &config)?)
}

async fn run_roster(
    config: PathBuf,
    data_dir: Option<PathBuf>,
    as_of: Option<NaiveDate>,
    webhook: Option<String>,
    concurrency: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ClientRegistry::load(&config)?;
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let engine = build_engine(&registry, data_dir, webhook, concurrency)?;

    let pb = ProgressBar::new(registry.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("valid template")
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(StdDuration::from_millis(100));
    pb.set_message(format!("Evaluating {} clients...", registry.len()));

    let report = engine.run_cycle(&registry, as_of, Some(&pb)).await?;
    pb.finish_with_message(format!("Evaluated {} clients", report.records.len()));

    if format.to_lowercase() == "json" {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(())
}

async fn run_client(
    id: &str,
    config: PathBuf,
    data_dir: Option<PathBuf>,
    as_of: Option<NaiveDate>,
    webhook: Option<String>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ClientRegistry::load(&config)?;
    let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
    let engine = build_engine(&registry, data_dir, webhook, 1)?;

    let report = engine.run_single(&registry, id, as_of).await?;

    if format.to_lowercase() == "json" {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(())
}

fn show_status(
    config: PathBuf,
    data_dir: Option<PathBuf>,
    client: Option<String>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ClientRegistry::load(&config)?;
    let data_dir = paths::resolve_data_dir(data_dir)?;
    let store = SqliteEpisodeStore::new(paths::state_db_path(&data_dir))?;

    let client_ids = client.map_or_else(|| registry.client_ids(), |id| vec![id]);

    if format.to_lowercase() == "json" {
        let mut clients = Vec::new();
        for client_id in &client_ids {
            let mut entry = json!({ "client_id": client_id });
            if let Some(figure) = store.latest_risk_figure(client_id)? {
                entry["latest_risk"] = json!({
                    "as_of": figure.as_of,
                    "risk_value": figure.risk_value,
                });
            }
            if let Some(versioned) = store.load(client_id)? {
                let episode = versioned.episode;
                entry["episode"] = json!({
                    "episode_id": episode.episode_id,
                    "open": episode.is_open(),
                    "opened_at": episode.opened_at,
                    "closed_at": episode.closed_at,
                    "last_seen": episode.last_seen,
                });
            }
            clients.push(entry);
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "clients": clients }))?
        );
        return Ok(());
    }

    println!("Client status");
    println!("=============\n");

    for client_id in &client_ids {
        println!("{}", client_id);

        match store.latest_risk_figure(client_id)? {
            Some(figure) => println!(
                "  Latest risk:   {:.2}% (as of {})",
                figure.risk_value * 100.0,
                figure.as_of
            ),
            None => println!("  Latest risk:   none recorded"),
        }

        match store.load(client_id)? {
            Some(versioned) if versioned.episode.is_open() => println!(
                "  Episode:       OPEN since {} (last seen {})",
                versioned.episode.opened_at, versioned.episode.last_seen
            ),
            Some(versioned) => println!(
                "  Episode:       resolved {}",
                versioned
                    .episode
                    .closed_at
                    .map_or_else(|| "unknown".to_string(), |d| d.to_string())
            ),
            None => println!("  Episode:       none"),
        }

        for event in store.episode_events(client_id, STATUS_EVENT_LIMIT)? {
            println!("    {} {} ({})", event.as_of, event.event, event.episode_id);
        }
        println!();
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn export_data(
    kind: &str,
    client: Option<String>,
    symbol: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    output: Option<PathBuf>,
    format: &str,
    data_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let format: ExportFormat = format.parse()?;
    let data_dir = paths::resolve_data_dir(data_dir)?;
    let store = SqliteEpisodeStore::new(paths::state_db_path(&data_dir))?;

    let end = end.unwrap_or_else(|| Utc::now().date_naive());
    let start = start.unwrap_or_else(|| end - Duration::days(365));

    match kind {
        "risk" => {
            let client = client.ok_or("--client is required for risk export")?;
            let rows: Vec<RiskFigureExport> = store
                .risk_history(&client, start, end)?
                .into_iter()
                .map(|f| RiskFigureExport::new(f.client_id, f.as_of, f.risk_value))
                .collect();
            write_export(&rows, output.as_deref(), format)
        }
        "volatility" => {
            let symbol = symbol.ok_or("--symbol is required for volatility export")?;
            let rows: Vec<VolatilityExport> = store
                .estimate_history(&symbol, start, end)?
                .into_iter()
                .map(|e| VolatilityExport::new(e.symbol, e.as_of, e.sigma, e.sample_size))
                .collect();
            write_export(&rows, output.as_deref(), format)
        }
        "events" => {
            let client = client.ok_or("--client is required for events export")?;
            let mut events = store.episode_events(&client, EVENT_EXPORT_LIMIT)?;
            events.retain(|e| e.as_of >= start && e.as_of <= end);
            // Stored most recent first; exports read better oldest first.
            events.reverse();
            let rows: Vec<EpisodeEventExport> = events
                .into_iter()
                .map(|e| {
                    EpisodeEventExport::new(e.client_id, e.episode_id.to_string(), e.event, e.as_of)
                })
                .collect();
            write_export(&rows, output.as_deref(), format)
        }
        other => {
            Err(format!("Unknown export kind: {} (expected risk, volatility or events)", other)
                .into())
        }
    }
}

fn write_export<E: Exporter>(
    rows: &E,
    output: Option<&Path>,
    format: ExportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            rows.export_to_file(path, format)?;
            println!("Wrote {}", path.display());
        }
        None => {
            let text = rows.export_to_string(format)?;
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
