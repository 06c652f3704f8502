//! paasmond — the paasmon exporter daemon.
//!
//! Assembles the exporter:
//! - Exporter config (TOML)
//! - Firehose relay stream provider
//! - App discovery + one app watcher per started app
//! - Prometheus `/metrics` endpoint
//!
//! # Usage
//!
//! ```text
//! paasmond run --config /etc/paasmon/paasmon.toml
//! paasmond check-config --config /etc/paasmon/paasmon.toml --resolved
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use prometheus::Registry;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use paasmon_core::ExporterConfig;
use paasmon_discovery::{AppDiscovery, ConfigFileAppSource};
use paasmond::{build_router, TcpStreamProvider};

const DEFAULT_CONFIG: &str = "/etc/paasmon/paasmon.toml";

#[derive(Parser)]
#[command(name = "paasmond", about = "paasmon exporter daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the configured apps and serve their metrics.
    Run {
        /// Exporter config file.
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Override the listen address from the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Validate a config file and print a summary.
    CheckConfig {
        /// Exporter config file.
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Also print the config with every default filled in.
        #[arg(long)]
        resolved: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, listen } => run(config, listen).await,
        Command::CheckConfig { config, resolved } => check_config(&config, resolved),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,paasmond=debug,paasmon_events=debug,paasmon_discovery=debug")
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config_path: PathBuf, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let config = ExporterConfig::from_file(&config_path)?;
    let listen = listen.unwrap_or(config.listen);
    info!(config = ?config_path, apps = config.apps.len(), "paasmon exporter starting");

    // ── Subsystems ─────────────────────────────────────────────

    let registry = Registry::new();
    let provider = Arc::new(TcpStreamProvider::from_config(&config.firehose));
    info!(address = %config.firehose.address, "firehose relay configured");

    let source = Arc::new(ConfigFileAppSource::new(config_path.clone()));
    let discovery = Arc::new(AppDiscovery::new(
        source,
        Arc::new(registry.clone()),
        provider,
    ));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────

    let discovery_handle = {
        let discovery = discovery.clone();
        let interval = Duration::from_secs(config.discovery_interval_secs);
        tokio::spawn(async move {
            discovery.run(interval, shutdown_rx).await;
        })
    };

    // ── Metrics endpoint ───────────────────────────────────────

    let router = build_router(registry);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listen, "metrics endpoint listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Discovery closes every watcher on its way out.
    if let Err(e) = discovery_handle.await {
        warn!(error = %e, "discovery task failed; watchers may not have been closed");
    }

    info!("paasmon exporter stopped");
    Ok(())
}

fn check_config(path: &Path, resolved: bool) -> anyhow::Result<()> {
    let config = ExporterConfig::from_file(path)?;
    println!("config ok: {}", path.display());
    println!("  listen:    {}", config.listen);
    println!("  firehose:  {}", config.firehose.address);
    println!("  discovery: every {}s", config.discovery_interval_secs);
    for app in &config.apps {
        println!(
            "  app {} ({}): {} instance(s), {:?}",
            app.name, app.guid, app.instances, app.state
        );
    }
    if resolved {
        println!();
        print!("{}", config.to_toml_string()?);
    }
    Ok(())
}
