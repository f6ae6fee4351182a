//! kitewatch: kitesurf wind monitor.
//!
//! Single binary with two halves:
//! 1. Server side: an authorized trigger that stores one station reading per
//!    call, and a public time-windowed history query over the stored rows.
//! 2. Client side: a refresh loop that shows the live reading, its safety
//!    verdict, the short-term trend and the forecast, keeping a local history.

mod app;
mod config;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use common::config::AppConfig;
use common::{Error, Measurement, SourceKind, SpeedUnit, TemperatureUnit, TrendResult};
use pipeline::DisplaySettings;
use station_client::{build_source, ProxiedStationClient};
use tracing::{error, info, warn};
use wind_store::{MeasurementStore, SqliteWindStore};

use crate::app::WindApp;
use crate::server::ServerState;

/// Kitesurf wind monitor
#[derive(Parser)]
#[command(name = "kitewatch", version, about = "Kitesurf wind monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the ingestion trigger and history query over HTTP.
    Serve,
    /// Fetch and store one reading, then exit.
    Ingest,
    /// Run ingestion on a fixed interval until interrupted.
    Schedule {
        /// Override `ingest.interval_secs`.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Live view of the selected station.
    Watch {
        /// Start on this source instead of the configured one.
        #[arg(long)]
        source: Option<SourceKind>,
        /// Refresh once and exit.
        #[arg(long)]
        once: bool,
    },
    /// Print the hourly forecast.
    Forecast {
        /// Bypass the cache.
        #[arg(long)]
        force: bool,
    },
    /// Inspect or manage the local history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show or change display preferences.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Most recent records first.
    List {
        #[arg(long)]
        hours: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    ExportJson {
        #[arg(long)]
        hours: Option<i64>,
    },
    ExportCsv {
        #[arg(long)]
        hours: Option<i64>,
    },
    /// Merge records from a JSON export.
    ImportJson { path: PathBuf },
    Stats {
        #[arg(long)]
        hours: Option<i64>,
    },
    Clear,
    /// Read the stored window from the relay's history endpoint.
    Remote {
        #[arg(long, default_value_t = 24)]
        hours: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    SpeedUnit { unit: SpeedUnit },
    TemperatureUnit { unit: TemperatureUnit },
    /// Minimum rideable speed in knots.
    MinSpeed { knots: f64 },
    /// Watch refresh period in seconds.
    Interval { secs: u64 },
    Reset,
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "kitewatch=info,station_client=info,forecast_client=info,pipeline=info,wind_store=info"
                    .into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Serve => serve(&cfg).await,
        Command::Ingest => ingest_once(&cfg).await,
        Command::Schedule { interval_secs } => schedule(&cfg, interval_secs).await,
        Command::Watch { source, once } => watch(&cfg, source, once).await,
        Command::Forecast { force } => forecast(&cfg, force).await,
        Command::History { action } => history(&cfg, action).await,
        Command::Settings { action } => settings(&cfg, action),
    };

    if let Err(e) = result {
        error!("{} failed: {}", e.kind(), e);
        std::process::exit(1);
    }
}

// ── Server side ───────────────────────────────────────────────────────

async fn open_store(cfg: &AppConfig) -> Result<SqliteWindStore, Error> {
    let store = SqliteWindStore::new(&cfg.store.db_path);
    store.init().await?;
    info!("Measurement store: {}", store.db_path().display());
    Ok(store)
}

async fn serve(cfg: &AppConfig) -> Result<(), Error> {
    config::require_station_credentials(cfg)?;
    if cfg.ingest.cron_secret.is_empty() {
        warn!("CRON_SECRET is not set; every ingestion trigger will be rejected");
    }

    let addr: SocketAddr = cfg
        .server
        .bind
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address '{}': {e}", cfg.server.bind)))?;

    let state = ServerState {
        source: build_source(cfg.station.source, &cfg.station)?,
        store: Arc::new(open_store(cfg).await?),
        ingest: cfg.ingest.clone(),
        query: cfg.query.clone(),
    };
    info!("Ingesting from {}", cfg.station.source);

    server::start_server(addr, state, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    })
    .await
}

async fn ingest_once(cfg: &AppConfig) -> Result<(), Error> {
    config::require_station_credentials(cfg)?;
    let source = build_source(cfg.station.source, &cfg.station)?;
    let store = open_store(cfg).await?;

    let outcome = server::ingest::run_ingestion(
        source.as_ref(),
        &store,
        cfg.ingest.dedupe_on_source_timestamp,
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&outcome.row)?);
    Ok(())
}

async fn schedule(cfg: &AppConfig, interval_secs: Option<u64>) -> Result<(), Error> {
    config::require_station_credentials(cfg)?;
    let source = build_source(cfg.station.source, &cfg.station)?;
    let store: Arc<dyn MeasurementStore> = Arc::new(open_store(cfg).await?);
    let period = Duration::from_secs(interval_secs.unwrap_or(cfg.ingest.interval_secs).max(1));

    info!("Ingesting from {} every {:?}", cfg.station.source, period);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
            _ = ticker.tick() => {
                // A failed tick is logged; the next tick is the retry.
                if let Err(e) = server::ingest::run_ingestion(
                    source.as_ref(),
                    store.as_ref(),
                    cfg.ingest.dedupe_on_source_timestamp,
                )
                .await
                {
                    error!("Scheduled ingestion failed ({}): {}", e.kind(), e);
                }
            }
        }
    }
}

// ── Client side ───────────────────────────────────────────────────────

fn print_reading(m: &Measurement, trend: &TrendResult, display: &DisplaySettings) {
    let safety = m.safety();
    let gust = m
        .wind_gust_knots()
        .map(|g| format!(", gusts {}", display.format_speed(g)))
        .unwrap_or_default();
    let rideable = if m.meets_minimum(display.min_wind_speed_knots) {
        ""
    } else {
        " (below minimum)"
    };

    println!(
        "[{}] {}{} from {} ({:.0}°) | {} | {} {}{}",
        m.timestamp().format("%H:%M:%S"),
        display.format_speed(m.wind_speed_knots()),
        gust,
        m.cardinal(),
        m.wind_direction_avg_deg(),
        safety.label,
        m.category().title(),
        trend.icon,
        rideable,
    );
    if let Some(t) = m.temperature_f() {
        println!("    {}", display.format_temperature(t));
    }
}

async fn watch(cfg: &AppConfig, source: Option<SourceKind>, once: bool) -> Result<(), Error> {
    let app = WindApp::from_config(cfg)?;

    let first = match source {
        Some(kind) if kind != app.selected_source().await => app.switch_source(kind).await,
        _ => app.refresh_measurement().await,
    };
    match first {
        Ok(Some(snap)) => print_reading(&snap.measurement, &snap.trend, &app.display_settings()),
        Ok(None) => {}
        Err(e) => warn!("Station unavailable: {}", e),
    }
    if once {
        return Ok(());
    }

    if let Err(e) = app.refresh_forecast(false).await {
        warn!("Forecast unavailable: {}", e);
    }
    print_forecast_peak(&app, &app.display_settings());

    let mut settings_rx = app.settings().subscribe();
    loop {
        let period = Duration::from_secs(app.display_settings().update_interval_secs.max(1));
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
            changed = settings_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                continue;
            }
            _ = tokio::time::sleep(period) => {}
        }

        let display = app.display_settings();
        match app.refresh_measurement().await {
            Ok(Some(snap)) => print_reading(&snap.measurement, &snap.trend, &display),
            Ok(None) => {}
            // Keep showing the last reading; the next tick retries.
            Err(e) => {
                warn!("Station unavailable: {}", e);
                if let Some(last) = app.latest().await {
                    print_reading(&last, &app.trend().await, &display);
                }
            }
        }
        if let Err(e) = app.refresh_forecast(false).await {
            warn!("Forecast unavailable: {}", e);
        }
        print_forecast_peak(&app, &display);
    }
}

/// Strongest upcoming hour from the last forecast fetched, stale or not.
fn print_forecast_peak(app: &WindApp, display: &DisplaySettings) {
    let Some(points) = app.cached_forecast() else {
        return;
    };
    if let Some(peak) = points
        .iter()
        .max_by(|a, b| a.speed_knots.total_cmp(&b.speed_knots))
    {
        println!(
            "    forecast peak {} on {} at {:02}:00",
            display.format_speed(peak.speed_knots),
            peak.date.format("%a"),
            peak.hour_of_day,
        );
    }
}

async fn forecast(cfg: &AppConfig, force: bool) -> Result<(), Error> {
    let app = WindApp::from_config(cfg)?;
    let display = app.display_settings();
    let points = app.refresh_forecast(force).await?;

    let mut day = None;
    for p in points {
        if day != Some(p.date) {
            println!("{}", p.date.format("%a %d %b"));
            day = Some(p.date);
        }
        println!(
            "  {:02}:00  {:>10}  gusts {:>10}  {} ({:.0}°)",
            p.hour_of_day,
            display.format_speed(p.speed_knots),
            display.format_speed(p.gust_knots),
            common::degrees_to_cardinal(p.direction_deg),
            p.direction_deg,
        );
    }
    Ok(())
}

async fn history(cfg: &AppConfig, action: HistoryAction) -> Result<(), Error> {
    if let HistoryAction::Remote { hours, limit } = action {
        return remote_history(cfg, hours, limit).await;
    }

    let app = WindApp::from_config(cfg)?;
    let display = app.display_settings();
    let mut history = app.history().lock().await;

    match action {
        HistoryAction::List { hours, limit } => {
            for record in history.query(hours, limit) {
                let m = &record.measurement;
                println!(
                    "{}  {:>10}  {:>3}  {:<8} {}",
                    m.timestamp().to_rfc3339(),
                    display.format_speed(m.wind_speed_knots()),
                    m.cardinal(),
                    m.safety().level.as_str(),
                    m.source_id(),
                );
            }
        }
        HistoryAction::ExportJson { hours } => println!("{}", history.export_json(hours)?),
        HistoryAction::ExportCsv { hours } => print!("{}", history.export_csv(hours)),
        HistoryAction::ImportJson { path } => {
            let json = std::fs::read_to_string(&path)?;
            let added = history.import_json(&json)?;
            info!("Imported {} records from {}", added, path.display());
        }
        HistoryAction::Stats { hours } => match history.stats(hours) {
            Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
            None => println!("No history in window"),
        },
        HistoryAction::Clear => {
            history.clear()?;
            info!("History cleared");
        }
        HistoryAction::Remote { .. } => {}
    }
    Ok(())
}

async fn remote_history(cfg: &AppConfig, hours: u32, limit: u32) -> Result<(), Error> {
    let client = ProxiedStationClient::new(&cfg.station.proxy_base_url, cfg.station.timeout_secs)?;
    let remote = client.fetch_history(hours, limit).await?;
    let display = pipeline::SettingsStore::from_config(
        &cfg.client,
        Arc::new(pipeline::FileBlobStore::new(&cfg.history.data_dir)?),
    )
    .get();

    for m in &remote.measurements {
        println!(
            "{}  {:>10}  {:>3}  {:<8} {}",
            m.timestamp().to_rfc3339(),
            display.format_speed(m.wind_speed_knots()),
            m.cardinal(),
            m.safety().level.as_str(),
            m.source_id(),
        );
    }
    if remote.skipped > 0 {
        warn!("Skipped {} malformed relay rows", remote.skipped);
    }
    if let Some(stats) = &remote.stats {
        println!(
            "count={} avg={} max_gust={} min={} max={}",
            stats.count,
            display.format_speed(stats.avg_wind_speed),
            display.format_speed(stats.max_gust),
            stats
                .min_wind_speed
                .map(|v| display.format_speed(v))
                .unwrap_or_else(|| "-".into()),
            display.format_speed(stats.max_wind_speed),
        );
    }
    Ok(())
}

fn settings(cfg: &AppConfig, action: SettingsAction) -> Result<(), Error> {
    let blob = Arc::new(pipeline::FileBlobStore::new(&cfg.history.data_dir)?);
    let store = pipeline::SettingsStore::from_config(&cfg.client, blob);

    let current = match action {
        SettingsAction::Show => store.get(),
        SettingsAction::SpeedUnit { unit } => store.update(|s| s.speed_unit = unit)?,
        SettingsAction::TemperatureUnit { unit } => store.update(|s| s.temperature_unit = unit)?,
        SettingsAction::MinSpeed { knots } => {
            store.update(|s| s.min_wind_speed_knots = knots.max(0.0))?
        }
        SettingsAction::Interval { secs } => {
            store.update(|s| s.update_interval_secs = secs.max(1))?
        }
        SettingsAction::Reset => store.reset()?,
    };
    println!("{}", serde_json::to_string_pretty(&current)?);
    Ok(())
}
