//! Device daemon entry point.
//!
//! Attaches to a hub that `shmctl create` already set up, then runs
//! discovery until SIGINT/SIGTERM. Everything interesting lives in
//! `lowcar-daemon`; this binary only wires config, signals and logging.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lowcar_daemon::config::DaemonConfig;
use lowcar_daemon::discovery::{self, PortRegistry};
use lowcar_shm::Hub;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lowcard")]
#[command(about = "lowcar device daemon", long_about = None)]
#[command(version)]
struct Args {
    /// TOML config file; defaults apply for anything unset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the hub name prefix from the config
    #[arg(long)]
    shm_prefix: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path)
            .with_context(|| format!("bad config {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(prefix) = args.shm_prefix {
        config.shm_prefix = prefix;
    }

    let hub = Arc::new(Hub::attach(&config.shm_prefix).with_context(|| {
        format!(
            "no hub '{}' (run `shmctl create` first?)",
            config.shm_prefix
        )
    })?);
    let registry = Arc::new(PortRegistry::new(&config));

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("signal handler installation failed")?;

    info!(hub = %config.shm_prefix, "lowcard starting");
    discovery::run(hub, registry, &config, stop_rx);
    info!("lowcard stopped");
    Ok(())
}
