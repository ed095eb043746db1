//! # Rule Scheduler
//!
//! Background loop driving active scenes. Each tick:
//! 1. Poll bridge sensors (when a bridge is configured)
//! 2. Complete sessions that ran out
//! 3. Evaluate every active scene, unless the kill switch is engaged

use crate::events::HomeEvent;
use crate::executor::{ExecError, evaluate_scene};
use crate::state::AppState;
use serra_core::{Metric, SceneId, Sensor, SerraError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Start the scheduler. It stops when `shutdown` flips to `true`.
pub fn spawn(state: AppState, tick: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_secs = tick.as_secs(), "rule scheduler started");
        loop {
            tokio::select! {
                _ = interval.tick() => run_tick(&state).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("rule scheduler stopped");
    })
}

/// One scheduler pass.
pub async fn run_tick(state: &AppState) {
    if state.driver.can_poll_sensors() {
        if let Err(e) = poll_sensors(state).await {
            warn!(error = %e, "polled readings not saved");
        }
    }
    if let Err(e) = expire_sessions(state).await {
        warn!(error = %e, "completed sessions not saved");
    }

    for scene_id in active_scenes(state).await {
        match evaluate_scene(state, scene_id, false).await {
            Ok(_) => {}
            Err(ExecError::Core(SerraError::NoSensorData(zone))) => {
                debug!(scene_id = scene_id.0, zone_id = zone.0, "no readings yet, scene skipped");
            }
            Err(e) => warn!(scene_id = scene_id.0, error = %e, "scheduled evaluation failed"),
        }
    }
}

async fn expire_sessions(state: &AppState) -> serra_core::Result<()> {
    let now = state.now();
    let mut home = state.home().await;
    let expired = home.expire_sessions(now);
    if expired.is_empty() {
        return Ok(());
    }
    for id in &expired {
        if let Ok(session) = home.session(*id) {
            info!(zone_id = session.zone.0, session_id = id.0, "automation session completed");
            state.events.publish(HomeEvent::SessionChanged {
                zone_id: session.zone,
                session_id: *id,
                running: false,
            });
        }
    }
    state.persist(&home)
}

/// Every active scene, or none while the kill switch is engaged.
async fn active_scenes(state: &AppState) -> Vec<SceneId> {
    let home = state.home().await;
    if home.kill_switch().active {
        debug!("kill switch active, skipping scheduled evaluation");
        return Vec::new();
    }
    home.active_scenes().into_iter().map(|scene| scene.id).collect()
}

async fn poll_sensors(state: &AppState) -> serra_core::Result<()> {
    let sensors: Vec<Sensor> = {
        let home = state.home().await;
        home.zones()
            .flat_map(|z| home.sensors_in_zone(z.id))
            .filter(|s| s.provider != "gateway")
            .cloned()
            .collect()
    };

    let mut polled = Vec::new();
    for sensor in sensors {
        match state.driver.read_sensor(&sensor).await {
            Ok(Some(payload)) => polled.push((sensor, payload)),
            Ok(None) => {}
            Err(e) => warn!(sensor_id = sensor.id.0, error = %e, "sensor poll failed"),
        }
    }
    if polled.is_empty() {
        return Ok(());
    }

    let now = state.now();
    let mut home = state.home().await;
    for (sensor, payload) in polled {
        for (metric, value) in [
            (Metric::Temperature, payload.temperature),
            (Metric::Humidity, payload.humidity),
        ] {
            let Some(value) = value else { continue };
            if let Err(e) = home.record_reading(sensor.id, metric, value, now) {
                warn!(sensor_id = sensor.id.0, error = %e, "discarding polled reading");
            }
        }
        state.events.publish(HomeEvent::ReadingIngested {
            zone_id: sensor.zone,
            sensor_id: sensor.id,
            temperature: payload.temperature,
            humidity: payload.humidity,
            observed_at: now,
        });
    }
    state.persist(&home)
}
