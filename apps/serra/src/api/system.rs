//! Health, kill switch, audit log and snapshot handlers.

use super::ApiResult;
use crate::events::HomeEvent;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serra_core::formats::encode_snapshot;
use serra_core::{AuditEntry, KillSwitch};
use tracing::warn;

const DEFAULT_AUDIT_LIMIT: usize = 50;
const DEFAULT_KILL_REASON: &str = "Emergency stop activated";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub driver: &'static str,
    pub kill_switch_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct KillRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub format: &'static str,
    pub size_bytes: usize,
    pub data: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let kill_switch_active = state.home().await.kill_switch().active;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend_kind(),
        driver: state.driver.kind(),
        kill_switch_active,
    })
}

pub async fn kill_status(State(state): State<AppState>) -> Json<KillSwitch> {
    Json(state.home().await.kill_switch().clone())
}

/// Engage the kill switch. The body is optional.
pub async fn activate_kill(
    State(state): State<AppState>,
    body: Option<Json<KillRequest>>,
) -> ApiResult<Json<KillSwitch>> {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_KILL_REASON.to_string());
    let now = state.now();
    let kill = state
        .commit(|home| Ok(home.activate_kill_switch(&reason, now)?.clone()))
        .await?;
    warn!(reason = %reason, "kill switch activated");
    state.events.publish(HomeEvent::KillSwitchChanged {
        active: true,
        reason: Some(reason),
    });
    Ok(Json(kill))
}

pub async fn deactivate_kill(State(state): State<AppState>) -> ApiResult<Json<KillSwitch>> {
    let now = state.now();
    let kill = state
        .commit(|home| Ok(home.deactivate_kill_switch(now)?.clone()))
        .await?;
    warn!("kill switch deactivated");
    state.events.publish(HomeEvent::KillSwitchChanged {
        active: false,
        reason: None,
    });
    Ok(Json(kill))
}

pub async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEntry>> {
    let home = state.home().await;
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    Json(home.audit_log(limit).into_iter().cloned().collect())
}

/// Binary snapshot of the whole state, base64 encoded.
pub async fn snapshot(State(state): State<AppState>) -> ApiResult<Json<SnapshotResponse>> {
    let bytes = encode_snapshot(&*state.home().await)?;
    Ok(Json(SnapshotResponse {
        format: "serra-snapshot",
        size_bytes: bytes.len(),
        data: STANDARD.encode(&bytes),
    }))
}
