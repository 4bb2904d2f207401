use clap::{Parser, Subcommand};
use quarry::actions::{FixedResources, NoopActions};
use quarry::config::{AppConfig, LoggingConfig};
use quarry::domain::GeoPoint;
use quarry::engine::PursuitEngine;
use quarry::error::{QuarryError, Result};
use quarry::events::LogSink;
use quarry::nav::SimulatedNavigator;
use quarry::sources;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{watch, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(version = "0.1.0")]
#[command(about = "Real-time sighting acquisition and pursuit engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    config: String,

    /// Starting latitude
    #[arg(long, default_value_t = 40.7128)]
    lat: f64,

    /// Starting longitude
    #[arg(long, default_value_t = -74.0060)]
    lon: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pursuit engine
    Run,
    /// Run a single forced refresh and print the queue
    Scan,
    /// Validate the configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let start = GeoPoint::new(cli.lat, cli.lon);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = load_config(&cli.config)?;
            let _guard = init_logging(&config.logging);
            run_engine(config, start).await?;
        }
        Commands::Scan => {
            let config = load_config(&cli.config)?;
            let _guard = init_logging(&config.logging);
            run_scan(config, start).await?;
        }
        Commands::Check => {
            init_logging_simple();
            let config = load_config(&cli.config)?;
            println!(
                "configuration ok: {} watched species, {} policy overrides",
                config.watchlist.len(),
                config.overrides.len()
            );
        }
    }

    Ok(())
}

fn load_config(dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(dir)?;
    if let Err(errors) = config.validate() {
        return Err(QuarryError::Validation(errors.join("; ")));
    }
    Ok(config)
}

async fn run_engine(config: AppConfig, start: GeoPoint) -> Result<()> {
    let sources = sources::build_sources(&config)?;
    info!(
        sources = sources.len(),
        watched = config.watchlist.len(),
        %start,
        "starting pursuit engine"
    );

    let position = Arc::new(RwLock::new(start));
    let navigator = Arc::new(SimulatedNavigator::new(
        Arc::clone(&position),
        config.pursuit.base_speed_kmh,
    ));
    let engine = PursuitEngine::new(
        &config,
        position,
        sources,
        navigator,
        Arc::new(NoopActions),
        Arc::new(FixedResources::new(u32::MAX)),
        Arc::new(LogSink),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await
}

async fn run_scan(config: AppConfig, start: GeoPoint) -> Result<()> {
    let sources = sources::build_sources(&config)?;
    let position = Arc::new(RwLock::new(start));
    let navigator = Arc::new(SimulatedNavigator::new(
        Arc::clone(&position),
        config.pursuit.base_speed_kmh,
    ));
    let mut engine = PursuitEngine::new(
        &config,
        position,
        sources,
        navigator,
        Arc::new(NoopActions),
        Arc::new(FixedResources::new(u32::MAX)),
        Arc::new(LogSink),
    )?;

    let merged = engine.refresh_now().await;
    let queue = engine.handle().queue_snapshot().await;
    info!(merged, live = queue.len(), "scan complete");
    for target in queue {
        info!(
            id = %target.id,
            species = %target.species,
            distance_m = target.distance_m,
            eta_secs = target.eta_secs,
            expires_at = %target.expires_at,
            "queued target"
        );
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,quarry={}", config.level)));

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "quarry.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .init();
            None
        }
    }
}

fn init_logging_simple() {
    // Minimal logging for one-shot CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
