//! Weather station monitor service.
//!
//! Runs the ingestion orchestrator in the configured connection mode
//! and logs every published telemetry event until interrupted:
//! - Local broadcast, cloud stream, or both with fallback
//! - Periodic summary refresh via the cloud query endpoint
//! - Graceful shutdown on Ctrl+C

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use station_ingest::{ConnectionMode, IngestConfig, Orchestrator};

#[derive(Parser, Debug)]
#[command(name = "station-monitor")]
#[command(about = "Weather station telemetry monitor with cloud/local failover")]
struct Args {
    /// Connection mode: local-only, cloud-with-local-fallback, cloud-only
    #[arg(long, default_value = "local-only")]
    mode: ConnectionMode,

    /// Cloud access token (required for the cloud modes)
    #[arg(long, env = "STATION_TOKEN")]
    token: Option<String>,

    /// Local UDP port the hub broadcasts on
    #[arg(long, default_value = "50222")]
    broadcast_port: u16,

    /// Seconds between summary refreshes via the query endpoint
    #[arg(long, default_value = "300")]
    summary_refresh_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!(mode = %args.mode, "Starting weather station monitor");

    let config = IngestConfig {
        mode: args.mode,
        access_token: args.token.clone(),
        broadcast_port: args.broadcast_port,
        summary_refresh_interval: Duration::from_secs(args.summary_refresh_secs),
        ..IngestConfig::default()
    };

    let orchestrator = Orchestrator::new(config);

    orchestrator.on_weather_updated(|snapshot| {
        info!(
            temperature = snapshot.air_temperature,
            humidity = snapshot.relative_humidity,
            pressure = snapshot.station_pressure,
            dew_point = snapshot.dew_point(),
            "Weather updated"
        );
    });

    orchestrator.on_wind_updated(|sample| {
        info!(
            speed = sample.speed,
            direction = sample.direction,
            "Rapid wind"
        );
    });

    orchestrator.on_device_status(|status| {
        info!(
            voltage = status.voltage,
            rssi = status.rssi,
            "Device status"
        );
    });

    orchestrator.on_station_changed(|station| {
        info!(
            station_id = station.station_id,
            name = %station.display_name(),
            "Station selected"
        );
    });

    orchestrator.on_status_changed(|message| info!(status = message, "Session status"));
    orchestrator.on_error(|message| warn!(error = message, "Ingestion error"));

    if !orchestrator.start().await {
        error!("Ingestion failed to start");
        anyhow::bail!("ingestion failed to start in {} mode", args.mode);
    }

    info!(
        source = %orchestrator.active_source(),
        "Monitor running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");

    // Bounded shutdown: never hang on a stuck channel
    if tokio::time::timeout(Duration::from_secs(5), orchestrator.stop())
        .await
        .is_err()
    {
        warn!("Shutdown timed out, exiting anyway");
    }

    if let Some(last) = orchestrator.last_update() {
        info!(last_update = %last, "Monitor session complete");
    } else {
        info!("Monitor session complete, no telemetry received");
    }

    Ok(())
}
