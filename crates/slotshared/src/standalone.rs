//! Standalone mode — every subsystem in one process.
//!
//! In this mode, the daemon:
//! 1. Opens the state store under the data directory
//! 2. Builds the heartbeat registry and the in-process cluster scheduler
//! 3. Declares the configured agent roles and recovers the blacklist
//! 4. Applies the initial application plan, if one was given
//! 5. Runs the reconciliation loop and serves the REST API until Ctrl-C

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use slotshare_cluster::{HeartbeatRegistry, LocalClusterScheduler};
use slotshare_core::{AppPlan, DaemonConfig};
use slotshare_scheduler::AgentSharingScheduler;
use slotshare_state::StateStore;

/// File name of the state database inside the data directory.
pub const DB_FILE: &str = "slotshare.redb";

/// Assembled subsystems.
pub struct Daemon {
    pub scheduler: Arc<AgentSharingScheduler>,
    pub nodes: Arc<HeartbeatRegistry>,
    pub cluster: Arc<LocalClusterScheduler>,
}

/// Wire the subsystems together over `store` and declare every configured
/// agent role. Fails on the first invalid declaration.
pub fn assemble(config: &DaemonConfig, store: StateStore) -> anyhow::Result<Daemon> {
    let cluster = Arc::new(LocalClusterScheduler::new(config.cluster.hosts.clone()));
    let nodes = Arc::new(HeartbeatRegistry::new(store.clone()));
    let scheduler = AgentSharingScheduler::new(
        config.daemon.app.clone(),
        cluster.clone(),
        nodes.clone(),
        store,
    )
    .with_config(config.scheduler.clone());

    for agent in &config.agents {
        scheduler
            .declare_agent_role(&agent.name, agent.info.clone())
            .with_context(|| format!("declaring agent role {}", agent.name))?;
    }
    let recovered = scheduler.recover_blacklist();
    info!(
        app = %config.daemon.app,
        agents = config.agents.len(),
        blacklist_entries = recovered,
        "scheduler assembled"
    );

    Ok(Daemon {
        scheduler: Arc::new(scheduler),
        nodes,
        cluster,
    })
}

/// Read an application plan from a JSON file.
pub fn load_plan(path: &Path) -> anyhow::Result<AppPlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading plan {}", path.display()))?;
    let plan: AppPlan = serde_json::from_str(&content)
        .with_context(|| format!("parsing plan {}", path.display()))?;
    Ok(plan)
}

/// Run the daemon until Ctrl-C.
pub async fn run_standalone(config: DaemonConfig, plan: Option<AppPlan>) -> anyhow::Result<()> {
    info!(app = %config.daemon.app, "SlotShare daemon starting in standalone mode");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.daemon.data_dir)?;
    let db_path = config.daemon.data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let daemon = assemble(&config, store)?;
    if let Some(plan) = plan {
        daemon.scheduler.set_app_plan(plan);
    }

    // ── Reconciliation loop ────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(Arc::clone(&daemon.scheduler).run(shutdown_rx));

    // ── API server ─────────────────────────────────────────────

    let router = slotshare_api::build_router(Arc::clone(&daemon.scheduler));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.daemon.port));
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // The loop flushes the blacklist on its way out.
    let _ = loop_handle.await;

    info!("SlotShare daemon stopped");
    Ok(())
}
