//! Sensor handlers.

use super::ApiResult;
use crate::events::HomeEvent;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serra_core::{Sensor, SensorId, SensorSnapshot, Timestamp, ZoneId};
use tracing::debug;

/// Gateway payload. `observed_at` defaults to now.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub zone_id: ZoneId,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub observed_at: Option<Timestamp>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub zone_id: ZoneId,
    pub sensor_id: SensorId,
    pub observed_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct SensorView {
    #[serde(flatten)]
    pub sensor: Sensor,
    pub latest: SensorSnapshot,
}

pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let now = state.now();
    let observed_at = req.observed_at.unwrap_or(now);
    let sensor_id = state
        .commit(|home| {
            home.ingest_reading(req.zone_id, req.temperature, req.humidity, observed_at, now)
        })
        .await?;
    debug!(zone_id = req.zone_id.0, sensor_id = sensor_id.0, "reading ingested");
    state.events.publish(HomeEvent::ReadingIngested {
        zone_id: req.zone_id,
        sensor_id,
        temperature: req.temperature,
        humidity: req.humidity,
        observed_at,
    });
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            zone_id: req.zone_id,
            sensor_id,
            observed_at,
        }),
    ))
}

pub async fn list_zone_sensors(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
) -> ApiResult<Json<Vec<SensorView>>> {
    let home = state.home().await;
    home.zone(zone)?;
    let views = home
        .sensors_in_zone(zone)
        .into_iter()
        .map(|s| SensorView {
            sensor: s.clone(),
            latest: home.latest_for_sensor(s.id),
        })
        .collect();
    Ok(Json(views))
}

pub async fn latest_for_zone(
    State(state): State<AppState>,
    Path(zone): Path<ZoneId>,
) -> ApiResult<Json<SensorSnapshot>> {
    let home = state.home().await;
    home.zone(zone)?;
    Ok(Json(home.latest_snapshot(zone)))
}
