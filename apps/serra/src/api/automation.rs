//! Automation session handlers.

use super::ApiResult;
use crate::events::HomeEvent;
use crate::executor;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serra_core::session::DEFAULT_DURATION_MINUTES;
use serra_core::{SceneId, SessionView, ZoneId, ZoneMode};
use tracing::{info, warn};

const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub scene_id: SceneId,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_MINUTES
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ZoneAutomationStatus {
    pub zone_id: ZoneId,
    pub mode: ZoneMode,
    pub session: Option<SessionView>,
}

pub async fn session_status(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
) -> ApiResult<Json<ZoneAutomationStatus>> {
    let now = state.now();
    let mut home = state.home().await;
    let before = home.running_session(zone).map(|s| s.id);
    let session = home.session_status(zone, now)?;
    if let (Some(id), None) = (before, &session) {
        // Expiry follows the clock and stands even if this save fails.
        state.persist(&home)?;
        state.events.publish(HomeEvent::SessionChanged {
            zone_id: zone,
            session_id: id,
            running: false,
        });
    }
    Ok(Json(ZoneAutomationStatus {
        zone_id: zone,
        mode: home.zone(zone)?.mode,
        session,
    }))
}

/// Start a session and run a first evaluation right away.
///
/// A failed first evaluation is noted on the session and does not stop it.
pub async fn start_session(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
    Json(req): Json<StartRequest>,
) -> ApiResult<Json<SessionView>> {
    let now = state.now();
    let session_id = state
        .commit(|home| home.start_session(zone, req.scene_id, req.duration_minutes, now))
        .await?;
    info!(
        zone_id = zone.0,
        scene_id = req.scene_id.0,
        duration_minutes = req.duration_minutes,
        "automation session started"
    );
    state.events.publish(HomeEvent::SessionChanged {
        zone_id: zone,
        session_id,
        running: true,
    });

    if let Err(e) = executor::evaluate_scene(&state, req.scene_id, false).await {
        warn!(zone_id = zone.0, error = %e, "initial evaluation failed");
        let note = format!("initial evaluation error: {e}");
        state
            .commit(|home| home.annotate_session(session_id, note))
            .await?;
    }

    let home = state.home().await;
    let session = home.session(session_id)?;
    Ok(Json(session.view(state.now(), home.scene(session.scene)?.name.clone())))
}

pub async fn stop_session(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
) -> ApiResult<Json<SessionView>> {
    let id = state.commit(|home| home.stop_session(zone)).await?;
    info!(zone_id = zone.0, session_id = id.0, "automation session stopped");
    state.events.publish(HomeEvent::SessionChanged {
        zone_id: zone,
        session_id: id,
        running: false,
    });
    let home = state.home().await;
    let session = home.session(id)?;
    let scene_name = home
        .scene(session.scene)
        .map(|s| s.name.clone())
        .unwrap_or_default();
    Ok(Json(session.view(state.now(), scene_name)))
}

pub async fn history(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<SessionView>>> {
    let home = state.home().await;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(home.session_history(zone, limit, state.now())?))
}
