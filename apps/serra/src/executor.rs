//! # Executor
//!
//! Carries decisions out on real devices.
//!
//! The home lock is held while planning and while recording results, never
//! across a device call.
//!
//! Switch results are written to the in-memory home before it is saved,
//! since the devices have already changed. A failed save is still returned
//! to the caller and the next successful save catches the file up.

use crate::driver::DriverError;
use crate::events::{HomeEvent, SwitchSource};
use crate::state::AppState;
use serde::Serialize;
use serra_core::{
    Device, DeviceId, EvaluationReport, HomeState, Outlet, OutletId, SceneId, SerraError,
    SwitchOutcome, Timestamp, ZoneId,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] SerraError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result of switching one outlet in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchResult {
    pub outlet_id: OutletId,
    pub outlet_name: String,
    pub state: bool,
    pub outcome: SwitchOutcome,
}

fn switch_details(outlet: &Outlet, state: bool, source: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("outlet_id".to_string(), outlet.id.0.to_string()),
        ("outlet".to_string(), outlet.display_name().to_string()),
        ("state".to_string(), if state { "on" } else { "off" }.to_string()),
        ("source".to_string(), source.to_string()),
    ])
}

fn record_switch(
    state: &AppState,
    home: &mut HomeState,
    device: DeviceId,
    outlet: &Outlet,
    on: bool,
    source: SwitchSource,
    now: Timestamp,
) -> serra_core::Result<()> {
    home.record_outlet_state(outlet.id, on)?;
    let label = match source {
        SwitchSource::Manual => "manual",
        SwitchSource::Automation => "automation",
    };
    home.audit("outlet_switched", switch_details(outlet, on, label), now);
    state.events.publish(HomeEvent::OutletSwitched {
        device_id: device,
        outlet_id: outlet.id,
        state: on,
        source,
    });
    Ok(())
}

// =============================================================================
// SCENE EVALUATION
// =============================================================================

/// Evaluate a scene and, unless `dry_run`, switch the outlets it decided.
pub async fn evaluate_scene(
    state: &AppState,
    scene_id: SceneId,
    dry_run: bool,
) -> Result<EvaluationReport, ExecError> {
    let now = state.now();
    let (plan, targets) = {
        let home = state.home().await;
        let plan = home.plan_scene(scene_id, now, state.stale_after_secs)?;
        let mut targets = BTreeMap::new();
        for decision in plan.switches() {
            let outlet = home.outlet(decision.outlet_id)?.clone();
            let device = home.device(outlet.device)?.clone();
            targets.insert(outlet.id, (device, outlet));
        }
        (plan, targets)
    };

    let mut outcomes: BTreeMap<OutletId, SwitchOutcome> = BTreeMap::new();
    if !dry_run {
        for decision in plan.switches() {
            let (Some(to), Some((device, outlet))) = (
                decision.decision.desired_state(),
                targets.get(&decision.outlet_id),
            ) else {
                continue;
            };
            let outcome = match state.driver.switch(device, outlet, to).await {
                Ok(()) => SwitchOutcome::Applied,
                Err(e) => {
                    warn!(
                        scene_id = scene_id.0,
                        outlet_id = outlet.id.0,
                        error = %e,
                        "automatic switch failed"
                    );
                    SwitchOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.insert(outlet.id, outcome);
        }
    }

    let report = EvaluationReport::from_plan(plan, dry_run, |d| {
        outcomes
            .remove(&d.outlet_id)
            .unwrap_or(SwitchOutcome::Skipped)
    });

    if !dry_run {
        let mut home = state.home().await;
        for outlet_report in &report.outlets {
            if outlet_report.outcome != SwitchOutcome::Applied {
                continue;
            }
            let Some(to) = outlet_report.decision.decision.desired_state() else {
                continue;
            };
            if let Some((device, outlet)) = targets.get(&outlet_report.decision.outlet_id) {
                record_switch(
                    state,
                    &mut home,
                    device.id,
                    outlet,
                    to,
                    SwitchSource::Automation,
                    now,
                )?;
            }
        }
        let running = home
            .running_session(report.zone)
            .filter(|s| s.scene == scene_id)
            .map(|s| s.id);
        if let Some(session) = running {
            home.note_session_evaluation(session, now)?;
        }
        state.persist(&home)?;
    }

    info!(
        scene_id = scene_id.0,
        zone_id = report.zone.0,
        dry_run,
        switched = report.switched_count(),
        failed = report.failed_count(),
        "scene evaluated"
    );
    state.events.publish(HomeEvent::SceneEvaluated {
        zone_id: report.zone,
        scene_id,
        dry_run,
        switched: report.switched_count(),
        failed: report.failed_count(),
    });
    Ok(report)
}

// =============================================================================
// MANUAL SWITCHING
// =============================================================================

/// Switch one outlet by hand.
///
/// With `override_minutes`, automation leaves the outlet alone for that long
/// (0 holds it until the override is cleared).
pub async fn switch_outlet(
    state: &AppState,
    device_id: DeviceId,
    outlet_id: OutletId,
    on: bool,
    override_minutes: Option<u32>,
) -> Result<Outlet, ExecError> {
    let (device, outlet) = {
        let home = state.home().await;
        if home.kill_switch().active {
            return Err(SerraError::KillSwitchActive.into());
        }
        let outlet = home.device_outlet(device_id, outlet_id)?.clone();
        if !outlet.enabled {
            return Err(SerraError::Validation(format!("{outlet_id} is disabled")).into());
        }
        (home.device(device_id)?.clone(), outlet)
    };

    state.driver.switch(&device, &outlet, on).await?;

    let now = state.now();
    let mut home = state.home().await;
    record_switch(state, &mut home, device.id, &outlet, on, SwitchSource::Manual, now)?;
    if let Some(minutes) = override_minutes {
        let until = (minutes > 0).then(|| now.plus_secs(u64::from(minutes) * 60));
        home.set_manual_override(outlet_id, until)?;
    }
    state.persist(&home)?;
    info!(outlet_id = outlet_id.0, state = on, "outlet switched manually");
    Ok(home.outlet(outlet_id)?.clone())
}

/// Switch every enabled outlet of a device.
pub async fn switch_device(
    state: &AppState,
    device_id: DeviceId,
    on: bool,
) -> Result<Vec<SwitchResult>, ExecError> {
    let targets = {
        let home = state.home().await;
        let device = home.device(device_id)?.clone();
        home.outlets_of_device(device_id)
            .into_iter()
            .map(|o| (device.clone(), o.clone()))
            .collect()
    };
    switch_batch(state, targets, on).await
}

/// Switch every enabled outlet of every device in a zone.
pub async fn switch_zone(
    state: &AppState,
    zone_id: ZoneId,
    on: bool,
) -> Result<Vec<SwitchResult>, ExecError> {
    let targets = {
        let home = state.home().await;
        home.zone(zone_id)?;
        let mut targets = Vec::new();
        for outlet in home.outlets_in_zone(zone_id) {
            targets.push((home.device(outlet.device)?.clone(), outlet.clone()));
        }
        targets
    };
    switch_batch(state, targets, on).await
}

async fn switch_batch(
    state: &AppState,
    targets: Vec<(Device, Outlet)>,
    on: bool,
) -> Result<Vec<SwitchResult>, ExecError> {
    if state.home().await.kill_switch().active {
        return Err(SerraError::KillSwitchActive.into());
    }

    let mut results = Vec::with_capacity(targets.len());
    for (device, outlet) in &targets {
        let outcome = if !outlet.enabled {
            SwitchOutcome::Skipped
        } else {
            match state.driver.switch(device, outlet, on).await {
                Ok(()) => SwitchOutcome::Applied,
                Err(e) => {
                    warn!(outlet_id = outlet.id.0, error = %e, "switch failed");
                    SwitchOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            }
        };
        results.push(SwitchResult {
            outlet_id: outlet.id,
            outlet_name: outlet.display_name().to_string(),
            state: on,
            outcome,
        });
    }

    let now = state.now();
    let mut home = state.home().await;
    for ((device, outlet), result) in targets.iter().zip(&results) {
        if result.outcome == SwitchOutcome::Applied {
            record_switch(state, &mut home, device.id, outlet, on, SwitchSource::Manual, now)?;
        }
    }
    state.persist(&home)?;
    Ok(results)
}
