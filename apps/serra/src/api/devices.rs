//! Device and outlet handlers.

use super::ApiResult;
use crate::executor::{self, SwitchResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serra_core::home::OutletConfig;
use serra_core::{Device, DeviceId, Outlet, OutletId, ZoneId};

/// A device with its outlets.
#[derive(Debug, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub outlets: Vec<Outlet>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub state: bool,
    /// Hold the outlet against automation for this many minutes (0 = until cleared).
    #[serde(default)]
    pub override_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchAllRequest {
    pub state: bool,
}

pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceView>> {
    let home = state.home().await;
    let views = home
        .devices()
        .map(|d| DeviceView {
            device: d.clone(),
            outlets: home.outlets_of_device(d.id).into_iter().cloned().collect(),
        })
        .collect();
    Json(views)
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
) -> ApiResult<Json<DeviceView>> {
    let home = state.home().await;
    let device = home.device(id)?.clone();
    let outlets = home.outlets_of_device(id).into_iter().cloned().collect();
    Ok(Json(DeviceView { device, outlets }))
}

pub async fn list_outlets(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
) -> ApiResult<Json<Vec<Outlet>>> {
    let home = state.home().await;
    home.device(id)?;
    Ok(Json(home.outlets_of_device(id).into_iter().cloned().collect()))
}

pub async fn switch_outlet(
    State(state): State<AppState>,
    Path((device, outlet)): Path<(DeviceId, OutletId)>,
    Json(req): Json<SwitchRequest>,
) -> ApiResult<Json<Outlet>> {
    let outlet =
        executor::switch_outlet(&state, device, outlet, req.state, req.override_minutes).await?;
    Ok(Json(outlet))
}

pub async fn switch_device(
    State(state): State<AppState>,
    Path(device): Path<DeviceId>,
    Json(req): Json<SwitchAllRequest>,
) -> ApiResult<Json<Vec<SwitchResult>>> {
    Ok(Json(executor::switch_device(&state, device, req.state).await?))
}

pub async fn switch_zone(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
    Json(req): Json<SwitchAllRequest>,
) -> ApiResult<Json<Vec<SwitchResult>>> {
    Ok(Json(executor::switch_zone(&state, zone, req.state).await?))
}

pub async fn configure_outlet(
    State(state): State<AppState>,
    Path((device, outlet)): Path<(DeviceId, OutletId)>,
    Json(config): Json<OutletConfig>,
) -> ApiResult<Json<Outlet>> {
    let updated = state
        .commit(|home| {
            home.device_outlet(device, outlet)?;
            Ok(home.configure_outlet(outlet, config)?.clone())
        })
        .await?;
    Ok(Json(updated))
}

pub async fn clear_override(
    State(state): State<AppState>,
    Path((device, outlet)): Path<(DeviceId, OutletId)>,
) -> ApiResult<Json<Outlet>> {
    let updated = state
        .commit(|home| {
            home.device_outlet(device, outlet)?;
            home.clear_manual_override(outlet)?;
            Ok(home.outlet(outlet)?.clone())
        })
        .await?;
    Ok(Json(updated))
}
