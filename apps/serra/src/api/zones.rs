//! Zone handlers.

use super::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serra_core::{Device, Scene, Sensor, Zone, ZoneId};

#[derive(Debug, Deserialize)]
pub struct CreateZoneRequest {
    pub slug: String,
    pub name: String,
}

/// A zone with everything that lives in it.
#[derive(Debug, Serialize)]
pub struct ZoneDetail {
    #[serde(flatten)]
    pub zone: Zone,
    pub devices: Vec<Device>,
    pub sensors: Vec<Sensor>,
    pub active_scene: Option<Scene>,
}

pub async fn list_zones(State(state): State<AppState>) -> Json<Vec<Zone>> {
    let home = state.home().await;
    Json(home.zones().cloned().collect())
}

pub async fn get_zone(
    State(state): State<AppState>,
    Path(id): Path<ZoneId>,
) -> ApiResult<Json<ZoneDetail>> {
    let home = state.home().await;
    let zone = home.zone(id)?.clone();
    let devices = home.devices().filter(|d| d.zone == id).cloned().collect();
    let sensors = home.sensors_in_zone(id).into_iter().cloned().collect();
    let active_scene = home
        .scenes_in_zone(id)
        .into_iter()
        .find(|s| s.active)
        .cloned();
    Ok(Json(ZoneDetail {
        zone,
        devices,
        sensors,
        active_scene,
    }))
}

pub async fn create_zone(
    State(state): State<AppState>,
    Json(req): Json<CreateZoneRequest>,
) -> ApiResult<(StatusCode, Json<Zone>)> {
    let zone = state
        .commit(|home| {
            let id = home.create_zone(&req.slug, &req.name)?;
            Ok(home.zone(id)?.clone())
        })
        .await?;
    Ok((StatusCode::CREATED, Json(zone)))
}
