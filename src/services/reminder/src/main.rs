//! Main executable for the reminder service
//!
//! Entry point for the Kinesia reminder service: loads configuration, wires
//! the component graph, starts the background due-notification scanner and
//! serves the HTTP API until a shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reminder_service::{
    create_routes, ReminderConfig, ReminderError, ReminderManager, Result,
};

/// Command line arguments for the reminder service
#[derive(Parser, Debug)]
#[command(name = "reminder-server")]
#[command(about = "Kinesia exercise reminder scheduling and delivery service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Service host address
    #[arg(long)]
    host: Option<String>,

    /// Service port
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON logs for log shippers
    #[arg(long)]
    json_logs: bool,

    /// Disable the periodic due-notification scanner
    #[arg(long)]
    no_scanner: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs);

    info!(
        "Starting Kinesia reminder service v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Some(config_file) = &args.config {
        info!("Loading configuration from file: {}", config_file);
        std::env::set_var("REMINDER_CONFIG_FILE", config_file);
    }
    let mut config = match ReminderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    override_config_from_args(&mut config, &args);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!(
        "Server will bind to {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Store backend: {:?}, scan interval: {}s, deferred queue: {}",
        config.store.backend,
        config.scanner.interval_seconds,
        if config.queue.enabled {
            "enabled"
        } else {
            "polling only"
        }
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let manager = match ReminderManager::new(config).await {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Failed to initialize the reminder service: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let scanner_handle = manager.start_scanner(shutdown.clone());

    let app = create_routes(manager);
    let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
        ReminderError::internal(format!("Failed to bind {}: {}", bind_addr, e))
    })?;
    info!("Reminder service listening on {}", bind_addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        error!("HTTP server error: {}", e);
    }

    info!("Initiating graceful shutdown...");
    shutdown.cancel();
    if let Some(handle) = scanner_handle {
        if let Err(e) = handle.await {
            error!("Scanner task did not stop cleanly: {}", e);
        }
    }

    info!("Reminder service shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber with an env-filter and either a plain
/// or JSON fmt layer.
fn init_tracing(log_level: &str, json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("reminder_service={},tower_http=info", log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).json())
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Command line arguments win over environment and file configuration.
fn override_config_from_args(config: &mut ReminderConfig, args: &Args) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_scanner {
        config.scanner.enabled = false;
    }
}

/// Resolves when either Ctrl+C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
