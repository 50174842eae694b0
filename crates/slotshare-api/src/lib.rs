//! slotshare-api — REST API for SlotShare.
//!
//! axum routes over the agent-sharing scheduler: declared agents, their
//! readiness, target-to-agent routing, the blacklist and counters. Agent
//! workers post their status reports here.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/agents` | Declared agent role names |
//! | GET | `/api/v1/agents/{name}/ready` | Readiness and identity of one agent |
//! | POST | `/api/v1/agents/{name}/heartbeat` | Worker status report |
//! | GET | `/api/v1/roles/{name}/agent` | Agent serving a target role |
//! | GET | `/api/v1/blacklist/{target}` | Agents blacklisted for a target |
//! | GET | `/api/v1/stats` | Scheduler counters |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use slotshare_scheduler::AgentSharingScheduler;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<AgentSharingScheduler>,
}

/// Build the complete API router (REST + metrics + health).
pub fn build_router(scheduler: Arc<AgentSharingScheduler>) -> Router {
    let api_state = ApiState { scheduler };

    let api_routes = Router::new()
        .route("/agents", get(handlers::list_agents))
        .route("/agents/{name}/ready", get(handlers::agent_readiness))
        .route("/agents/{name}/heartbeat", post(handlers::agent_heartbeat))
        .route("/roles/{name}/agent", get(handlers::role_agent))
        .route("/blacklist/{target}", get(handlers::blacklist_for_target))
        .route("/stats", get(handlers::stats))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
        .route("/healthz", get(handlers::healthz))
}
