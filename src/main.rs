use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use globe_latency::{
    client::{ArcStore, FilterUpdate, Watcher},
    config::Config,
    web::{AppState, WebServer, handlers::parse_locations},
};

#[derive(Parser)]
#[command(name = "globe-latency")]
#[command(version)]
#[command(about = "Real-time network latency aggregation and SSE streaming")]
#[command(long_about = None)]
struct Cli {
    /// Log level
    #[arg(short = 'v', long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/SSE server
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Listening IP address
        #[arg(short = 'H', long, value_name = "IP")]
        host: Option<String>,

        /// Listening port
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },
    /// Follow a running server's latency stream from the terminal
    Watch {
        /// Base URL of the server
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,

        /// Comma separated location codes (defaults to the server's probes)
        #[arg(short, long)]
        locations: Option<String>,

        /// Delay between refreshes
        #[arg(short, long, default_value = "5s", value_parser = humantime::parse_duration)]
        interval: Duration,

        /// Only show arcs to these providers
        #[arg(long = "provider")]
        providers: Vec<String>,

        /// Only show arcs to servers in these regions
        #[arg(long = "region")]
        regions: Vec<String>,

        #[arg(long)]
        min_latency: Option<f64>,

        #[arg(long)]
        max_latency: Option<f64>,

        /// Run a single refresh, print the arcs and exit
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    match cli.command {
        Command::Serve { config, host, port } => serve(config, host, port).await,
        Command::Watch {
            server,
            locations,
            interval,
            providers,
            regions,
            min_latency,
            max_latency,
            once,
        } => {
            let filters = FilterUpdate {
                providers: (!providers.is_empty()).then_some(providers),
                regions: (!regions.is_empty()).then_some(regions),
                min_latency,
                max_latency,
            };
            let locations = locations.as_deref().map(parse_locations);
            watch(&server, locations, interval, filters, once).await
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let log_filter = if level == "trace" {
        format!("globe_latency={level},tower_http=trace")
    } else {
        format!("globe_latency={level}")
    };
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| log_filter.into()),
    );

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn serve(config_path: PathBuf, host: Option<String>, port: Option<u16>) -> Result<()> {
    info!("Starting globe-latency v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(Some(&config_path))?;
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }
    info!(
        nearest_k = config.stream.nearest_k,
        history = config.history.enabled,
        "Configuration loaded"
    );

    let state = AppState::from_config(config)?;
    let web_server = WebServer::new(state)?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );

    let cancellation_token = CancellationToken::new();
    spawn_shutdown_listener(cancellation_token.clone());

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let server_task = tokio::spawn(web_server.serve_with_cancellation(ready_tx, cancellation_token));

    match ready_rx.await {
        Ok(Ok(addr)) => info!(addr = %addr, "Web server ready"),
        Ok(Err(e)) => return Err(e).context("Web server failed to start"),
        Err(_) => warn!("Web server exited before signalling readiness"),
    }

    server_task.await.context("Web server task panicked")??;
    info!("Shutdown complete");
    Ok(())
}

async fn watch(
    server: &str,
    locations: Option<Vec<String>>,
    interval: Duration,
    filters: FilterUpdate,
    once: bool,
) -> Result<()> {
    let watcher = Watcher::new(
        server,
        locations.as_deref(),
        Arc::new(Mutex::new(ArcStore::new())),
    )?;
    let store = watcher.store();
    store.lock().await.set_filters(filters);
    info!(url = %watcher.url(), "Watching latency stream");

    if let Err(e) = watcher.load_catalog().await {
        warn!(error = %e, "Could not load server catalog, keeping default providers");
    }

    if once {
        let status = watcher.run_session().await;
        let mut store = store.lock().await;
        store.apply_filters();
        println!("providers: {}", store.providers().join(", "));
        for arc in store.filtered_arcs() {
            println!(
                "{:<24} {:<28} {:>8.2} ms {:>10.2} km  {}",
                arc.id,
                arc.target_location,
                arc.latency,
                arc.distance,
                arc.color
            );
        }
        println!("session: {status}");
        return Ok(());
    }

    let cancellation_token = CancellationToken::new();
    spawn_shutdown_listener(cancellation_token.clone());
    watcher.run(interval, cancellation_token).await;
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully");
            }
        }

        token.cancel();
    });
}
