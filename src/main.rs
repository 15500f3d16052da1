//! CLI entry point for sensor-bridge
//!
//! Opens the device, starts the reader thread and serves the HTTP API until Ctrl-C,
//! SIGTERM, or the reader stopping on a fatal read error.
//!
//! # Usage
//!
//! ```bash
//! sensor-bridge                                   # everything from config/env
//! sensor-bridge /dev/ttyUSB1 115200 0.0.0.0 8080 samples.csv
//! sensor-bridge --config deploy/bridge.toml --log-format json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use sensor_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use sensor_bridge::http::{self, AppState};
use sensor_bridge::storage::{CsvArchive, DeviceProfile, SampleStore};
use sensor_bridge::{logging, transport, Bridge};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sensor-bridge")]
#[command(about = "Serial sensor to HTTP bridge", long_about = None)]
struct Cli {
    /// Serial device path
    port: Option<String>,

    /// Serial baud rate
    baud_rate: Option<u32>,

    /// HTTP host to bind
    http_host: Option<String>,

    /// HTTP port to bind
    http_port: Option<u16>,

    /// CSV archive path
    db_path: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(port) = self.port {
            config.serial.port = port;
        }
        if let Some(baud_rate) = self.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(host) = self.http_host {
            config.http.host = host;
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if let Some(path) = self.db_path {
            config.storage.path = path;
        }
        if let Some(level) = self.log_level {
            config.application.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.application.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BridgeConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate()?;

    logging::init_from_config(&config)?;

    run(config).await
}

async fn run(config: BridgeConfig) -> Result<()> {
    let transport = transport::open(&config.serial).context("Failed to open serial port")?;
    info!(
        port = transport.port_name(),
        virtual_port = transport.is_virtual(),
        baud_rate = transport.baud_rate(),
        "Serial port initialized"
    );

    let profile = DeviceProfile::new(
        transport.port_name(),
        config.device.sampling_rate,
        config.device.debug,
    )
    .shared();
    let archive = CsvArchive::open(&config.storage.path, profile.clone())
        .context("Failed to open sample archive")?;
    let store: Arc<dyn SampleStore> = Arc::new(archive);

    let (bridge, reader) = Bridge::connect(transport, store, profile, &config.command)?;
    let reader = reader.spawn()?;

    let listener = TcpListener::bind((config.http.host.as_str(), config.http.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.http.host, config.http.port))?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(http::serve(listener, AppState::new(bridge), async move {
        let _ = stop_rx.await;
    }));

    let mut watch = tokio::time::interval(Duration::from_millis(250));
    let signal = shutdown_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => {
                info!("Shutdown signal received");
                break;
            }
            _ = watch.tick() => {
                if reader.is_finished() {
                    error!("Reader loop exited; shutting down");
                    break;
                }
            }
        }
    }

    let _ = stop_tx.send(());
    server.await.context("HTTP server task failed")??;

    let stats = reader.shutdown()?;
    info!(
        frames = stats.frames,
        samples = stats.samples_stored,
        responses = stats.responses,
        malformed = stats.malformed,
        "Bridge stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
