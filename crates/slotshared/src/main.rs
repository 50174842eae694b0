//! slotshared — the SlotShare daemon.
//!
//! Single binary that assembles the agent-sharing control plane:
//! - State store (redb)
//! - Heartbeat registry + in-process cluster scheduler
//! - Agent-sharing scheduler and its reconciliation loop
//! - REST API + Prometheus metrics, including the endpoint agent workers
//!   post their status reports to
//!
//! # Usage
//!
//! ```text
//! slotshared standalone --config /etc/slotshare/slotshare.toml --port 8470
//! slotshared check --config /etc/slotshare/slotshare.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use slotshare_core::DaemonConfig;
use slotshare_state::StateStore;
use slotshared::standalone;

#[derive(Parser)]
#[command(name = "slotshared", about = "SlotShare agent-sharing daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (all subsystems in one process).
    Standalone {
        /// Path to slotshare.toml.
        #[arg(long, default_value = "/etc/slotshare/slotshare.toml")]
        config: PathBuf,

        /// Port to listen on, overriding the config.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state, overriding the config.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// JSON application plan to apply at startup.
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Validate the config and its agent declarations, then exit.
    Check {
        /// Path to slotshare.toml.
        #[arg(long, default_value = "/etc/slotshare/slotshare.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,slotshared=debug,slotshare=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            config,
            port,
            data_dir,
            plan,
        } => {
            let mut daemon_config = DaemonConfig::from_file(&config)?;
            if let Some(port) = port {
                daemon_config.daemon.port = port;
            }
            if let Some(data_dir) = data_dir {
                daemon_config.daemon.data_dir = data_dir;
            }
            let plan = plan.as_deref().map(standalone::load_plan).transpose()?;
            standalone::run_standalone(daemon_config, plan).await
        }
        Command::Check { config } => {
            let daemon_config = DaemonConfig::from_file(&config)?;
            let daemon = standalone::assemble(&daemon_config, StateStore::open_in_memory()?)?;
            let agents = daemon.scheduler.get_agent_role_names();
            info!(path = ?config, agents = agents.len(), "config is valid");
            println!("{}", serde_json::to_string_pretty(&agents)?);
            Ok(())
        }
    }
}
