//! Supervisor for the shared-memory hub.
//!
//! The hub outlives any single client, so its lifecycle belongs to this
//! tool rather than to the daemon or the executor: `create` before
//! starting them, `destroy` after stopping them. `status` attaches
//! read-only and prints what is live.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lowcar_shm::{Hub, supervisor};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shmctl")]
#[command(about = "Manage the lowcar shared-memory hub", long_about = None)]
#[command(version)]
struct Cli {
    /// Name prefix for the shared-memory objects and semaphores
    #[arg(long, default_value = "lowcar")]
    prefix: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the hub regions and semaphores
    Create,
    /// Unlink the hub regions and semaphores
    Destroy,
    /// Show the device catalog and run mode
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Create => {
            supervisor::create(&cli.prefix).context("hub creation failed")?;
            println!("hub '{}' created", cli.prefix);
        }
        Command::Destroy => {
            supervisor::destroy(&cli.prefix).context("hub destruction failed")?;
            println!("hub '{}' destroyed", cli.prefix);
        }
        Command::Status => {
            let hub = Hub::attach(&cli.prefix)
                .with_context(|| format!("no hub '{}' (run `shmctl create` first?)", cli.prefix))?;
            let catalog = hub.catalog();
            println!("run mode: {:?}", hub.run_mode());
            println!("catalog:  {catalog:#010x}");
            for (slot, identity) in hub.identifiers() {
                println!("  slot {slot:2}: {identity}");
            }
        }
    }
    Ok(())
}
