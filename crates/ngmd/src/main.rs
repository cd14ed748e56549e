//! ngmd — the ngm monitoring daemon.
//!
//! Loads `ngm.toml`, expands every configured component into one scrape
//! target per built-in profile kind, and keeps a scrape suite running for
//! each until interrupted. SIGHUP reloads the `[continuous_profiling]`
//! section; component changes need a restart.
//!
//! # Usage
//!
//! ```text
//! ngmd run --config /etc/ngm/ngm.toml
//! ngmd check --config /etc/ngm/ngm.toml
//! ```

mod targets;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use ngm_conprof::{MemProfileStore, ScrapeManager};
use ngm_core::{ConfigHandle, NgmConfig};

use crate::targets::expand_targets;

#[derive(Parser)]
#[command(name = "ngmd", about = "ngm continuous profiling daemon", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every configured target until interrupted.
    Run {
        /// Path to ngm.toml.
        #[arg(long, short, default_value = "ngm.toml")]
        config: PathBuf,

        /// Gunzip profiles before storing them.
        #[arg(long)]
        gzip: bool,
    },
    /// Validate a config file and print the URLs that would be scraped.
    Check {
        #[arg(long, short, default_value = "ngm.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, gzip } => run(&config, gzip).await,
        Command::Check { config } => check(&config),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ngmd=debug,ngm=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<NgmConfig> {
    NgmConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

async fn run(config_path: &Path, gzip: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    info!(path = %config_path.display(), "ngm daemon starting");

    let handle = ConfigHandle::new(config.continuous_profiling.clone());
    if !handle.is_enabled() {
        warn!("continuous profiling is disabled; suites will idle until it is enabled");
    }

    let store = Arc::new(MemProfileStore::new(handle.clone()));
    let manager = Arc::new(ScrapeManager::new(store.clone(), handle.clone()).with_gzip(gzip));

    for component in &config.targets {
        manager.start_component(component).await.with_context(|| {
            format!("invalid target {}/{}", component.component, component.address)
        })?;
    }
    let follower = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.run().await }
    });
    info!(
        targets = manager.active_targets().await.len(),
        interval_secs = handle.current().interval_seconds,
        "scrape suites started"
    );

    wait_for_shutdown(config_path, &handle).await?;
    info!("shutdown signal received");

    manager.shutdown().await;
    if let Err(e) = follower.await {
        warn!(error = %e, "config follower task failed");
    }
    store.close();
    info!(profiles = store.len(), "ngm daemon stopped");
    Ok(())
}

/// Wait for ctrl-c. On unix, SIGHUP re-reads the continuous profiling
/// section of the config file in the meantime.
#[cfg(unix)]
async fn wait_for_shutdown(config_path: &Path, handle: &ConfigHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => return res.context("waiting for shutdown signal"),
            _ = hangup.recv() => reload(config_path, handle),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_config_path: &Path, _handle: &ConfigHandle) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")
}

#[cfg_attr(not(unix), allow(dead_code))]
fn reload(config_path: &Path, handle: &ConfigHandle) {
    match NgmConfig::from_file(config_path) {
        Ok(config) => {
            if let Err(e) = handle.update(config.continuous_profiling) {
                warn!(error = %e, "config reload rejected");
            }
        }
        Err(e) => warn!(path = %config_path.display(), error = %e, "config reload failed"),
    }
}

fn check(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let targets = expand_targets(&config)?;

    println!(
        "config ok: {} component(s), {} target(s), profiling {}",
        config.targets.len(),
        targets.len(),
        if config.continuous_profiling.enable {
            "enabled"
        } else {
            "disabled"
        }
    );
    for target in &targets {
        println!("{}\t{}", target.identity(), target.url_string());
    }
    Ok(())
}
