//! rovdeck: rover remote-control dashboard server.
//!
//! ```bash
//! # Defaults plus ./config.yaml if present
//! rovdeck
//!
//! # Alternate file, listening on localhost only
//! rovdeck --config /etc/rovdeck.yaml --host 127.0.0.1 --port 8080
//!
//! # Verbose diagnostics
//! RUST_LOG=rovdeck=debug rovdeck
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rovdeck::Config;
use rovdeck::dashboard::Dashboard;

#[derive(Parser)]
#[command(name = "rovdeck", about = "rovdeck: rover remote-control dashboard")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
    /// Listen address, overrides `server.host`
    #[arg(long)]
    host: Option<String>,
    /// Listen port, overrides `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

fn load_config(cli: &Cli) -> Config {
    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; using default configuration", e);
            Config::default()
        }
    };

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_ascii_lowercase()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The level comes from the file, so peek at it before the subscriber exists
    let level = Config::load(&cli.config).map(|config| config.logging.level).unwrap_or_default();
    init_tracing(if level.is_empty() { "info" } else { &level });

    let config = load_config(&cli);

    let dashboard = Arc::new(Dashboard::builder(config).build());
    let log = dashboard.event_log();
    log.info("Starting server...");
    log.info(format!(
        "Configuration loaded: Video={}, Port={}",
        dashboard.config().video.source,
        dashboard.config().server.port
    ));

    dashboard.start().context("failed to start dashboard")?;

    let listener = match rovdeck::web::bind(&dashboard.config().server.host, dashboard.config().server.port).await {
        Ok(listener) => listener,
        Err(e) => {
            dashboard.shutdown().await;
            return Err(e).context("failed to open listen socket");
        }
    };
    let addr = listener.local_addr().context("listen socket has no local address")?;

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(rovdeck::web::serve_on(listener, Arc::clone(&dashboard), shutdown.clone()));
    log.info(format!("Server started at http://{addr}"));
    info!("Press Ctrl-C to stop");

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Could not listen for shutdown signal: {}", e);
            }
            log.info("Closing server...");

            // Sessions see the dashboard token and close, letting the server drain
            dashboard.shutdown().await;
            shutdown.cancel();
            (&mut server).await
        }
        finished = &mut server => {
            dashboard.shutdown().await;
            finished
        }
    };

    match outcome {
        Ok(result) => result.context("web server failed")?,
        Err(e) => warn!("Web server task failed: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}
