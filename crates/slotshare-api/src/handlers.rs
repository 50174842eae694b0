//! REST API handlers.
//!
//! Each handler takes the scheduler lock for one public operation and
//! returns a JSON response.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::debug;

use slotshare_cluster::AgentCurrentStatus;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Readiness view of one agent role.
#[derive(Debug, Serialize)]
pub struct AgentReadiness {
    pub agent: String,
    pub ready: bool,
    /// Slot identity seen by the last full sync.
    pub identifier: Option<String>,
    pub has_targets: bool,
    pub blacklisted_at: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RoleRouting {
    pub role: String,
    pub agent: String,
}

// ── Agents ─────────────────────────────────────────────────────

/// GET /api/v1/agents
pub async fn list_agents(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.scheduler.get_agent_role_names())
}

/// GET /api/v1/agents/{name}/ready
pub async fn agent_readiness(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let scheduler = &state.scheduler;
    if !scheduler.get_agent_role_names().contains(&name) {
        return error_response("agent role not declared", StatusCode::NOT_FOUND).into_response();
    }
    ApiResponse::ok(AgentReadiness {
        ready: scheduler.is_agent_service_ready(&name),
        identifier: scheduler.get_agent_identifier(&name),
        has_targets: scheduler.has_valid_target_roles(&name),
        blacklisted_at: scheduler.get_agent_node_in_blacklist_timestamp(&name),
        agent: name,
    })
    .into_response()
}

/// POST /api/v1/agents/{name}/heartbeat
pub async fn agent_heartbeat(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(status): Json<AgentCurrentStatus>,
) -> impl IntoResponse {
    if state.scheduler.report_agent_status(&name, status) {
        (StatusCode::ACCEPTED, ApiResponse::ok(name)).into_response()
    } else {
        error_response("agent role not declared", StatusCode::NOT_FOUND).into_response()
    }
}

// ── Routing ────────────────────────────────────────────────────

/// GET /api/v1/roles/{name}/agent
pub async fn role_agent(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.find_agent_role_name(&name) {
        Some(agent) => ApiResponse::ok(RoleRouting { role: name, agent }).into_response(),
        None => {
            debug!(role = %name, "no agent serves role");
            error_response("role is not served by an agent", StatusCode::NOT_FOUND).into_response()
        }
    }
}

/// GET /api/v1/blacklist/{target}
pub async fn blacklist_for_target(
    State(state): State<ApiState>,
    Path(target): Path<String>,
) -> impl IntoResponse {
    ApiResponse::ok(state.scheduler.get_in_blacklist_agent_roles(&target))
}

// ── Counters ───────────────────────────────────────────────────

/// GET /api/v1/stats
pub async fn stats(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.scheduler.stats())
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.scheduler.stats();
    let body = slotshare_scheduler::render_prometheus(state.scheduler.app(), &stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
