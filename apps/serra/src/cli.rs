//! # CLI Commands
//!
//! Offline commands working directly on the state file, plus `serve`.
//!
//! Every command takes the database path and the backend name
//! (`file` or `redb`).

use crate::api;
use crate::clock::unix_now;
use crate::config::ServerConfig;
use crate::driver::OutletDriver;
use crate::scheduler;
use crate::state::AppState;
use crate::store::{load_state, open_backend};
use serde_json::json;
use serra_core::formats::{decode_snapshot, encode_snapshot};
use serra_core::storage::StateBackend;
use serra_core::{HomeState, SceneId, ZoneId};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

// =============================================================================
// STATE HELPERS
// =============================================================================

/// Load the state at `db_path`, or an empty one if nothing is stored yet.
pub fn load_or_create_state(db_path: &Path, backend: &str) -> CliResult<HomeState> {
    let store = open_backend(db_path, backend)?;
    Ok(load_state(&*store)?)
}

/// Save `state` to `db_path`.
pub fn save_state(state: &HomeState, db_path: &Path, backend: &str) -> CliResult {
    open_backend(db_path, backend)?.save(state)?;
    Ok(())
}

/// A zone given by slug or numeric id.
fn resolve_zone(home: &HomeState, zone: &str) -> CliResult<ZoneId> {
    if let Some(z) = home.zone_by_slug(zone) {
        return Ok(z.id);
    }
    let id = zone
        .parse::<u64>()
        .map(ZoneId)
        .map_err(|_| format!("unknown zone '{zone}'"))?;
    home.zone(id)?;
    Ok(id)
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Create a database holding the default greenhouse and terrarium.
pub fn cmd_init(db_path: &Path, backend: &str, force: bool) -> CliResult {
    if db_path.exists() {
        if !force {
            return Err(format!(
                "{} already exists (use --force to overwrite)",
                db_path.display()
            )
            .into());
        }
        std::fs::remove_file(db_path)?;
    }
    let mut home = HomeState::new();
    home.seed_default()?;
    save_state(&home, db_path, backend)?;
    println!("Initialized {} ({backend})", db_path.display());
    Ok(())
}

pub fn cmd_status(db_path: &Path, backend: &str, json: bool) -> CliResult {
    let home = load_or_create_state(db_path, backend)?;
    let counts = home.counts();
    let kill = home.kill_switch();

    if json {
        let zones: Vec<_> = home
            .zones()
            .map(|z| {
                let active_scene = home
                    .scenes_in_zone(z.id)
                    .into_iter()
                    .find(|s| s.active)
                    .map(|s| s.name.clone());
                json!({
                    "id": z.id,
                    "slug": z.slug,
                    "name": z.name,
                    "mode": z.mode,
                    "active_scene": active_scene,
                })
            })
            .collect();
        let out = json!({
            "counts": counts,
            "kill_switch_active": kill.active,
            "zones": zones,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Zones:    {}", counts.zones);
    println!("Devices:  {} ({} outlets)", counts.devices, counts.outlets);
    println!("Sensors:  {} ({} readings)", counts.sensors, counts.readings);
    println!("Scenes:   {} ({} rules)", counts.scenes, counts.rules);
    println!("Sessions: {}", counts.sessions);
    println!(
        "Kill switch: {}",
        if kill.active { "ACTIVE" } else { "inactive" }
    );
    for zone in home.zones() {
        let active = home
            .scenes_in_zone(zone.id)
            .into_iter()
            .find(|s| s.active)
            .map_or("-".to_string(), |s| s.name.clone());
        println!("  [{}] {} ({}) scene: {active}", zone.slug, zone.name, zone.mode);
    }
    Ok(())
}

/// Record a reading for a zone, as the gateway would.
pub fn cmd_ingest(
    db_path: &Path,
    backend: &str,
    zone: &str,
    temperature: Option<f64>,
    humidity: Option<f64>,
) -> CliResult {
    let mut home = load_or_create_state(db_path, backend)?;
    let zone_id = resolve_zone(&home, zone)?;
    let now = unix_now();
    let sensor = home.ingest_reading(zone_id, temperature, humidity, now, now)?;
    save_state(&home, db_path, backend)?;
    println!("Recorded reading for {zone_id} via {sensor}");
    Ok(())
}

/// Show what a scene would do right now, without switching anything.
pub fn cmd_evaluate(
    db_path: &Path,
    backend: &str,
    scene: u64,
    json: bool,
    stale_after_secs: u64,
) -> CliResult {
    let home = load_or_create_state(db_path, backend)?;
    let plan = home.plan_scene(SceneId(scene), unix_now(), stale_after_secs)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Scene '{}' ({})", plan.scene_name, plan.zone);
    for check in &plan.range_checks {
        println!(
            "  {} {}{} is {:?} target {}..{}",
            check.metric,
            check.observed,
            check.metric.unit(),
            check.position,
            check.range.min,
            check.range.max
        );
    }
    for unknown in &plan.unknowns {
        println!("  unknown: {unknown}");
    }
    for decision in &plan.decisions {
        println!("  {:<22} {}", decision.outlet_name, decision.explanation);
    }
    Ok(())
}

/// Write the state to `output` as a binary snapshot or as JSON.
pub fn cmd_export(db_path: &Path, backend: &str, output: &Path, format: &str) -> CliResult {
    let home = load_or_create_state(db_path, backend)?;
    let bytes = match format {
        "canonical" => encode_snapshot(&home)?,
        "json" => serde_json::to_vec_pretty(&home)?,
        other => {
            return Err(format!("unknown export format '{other}', expected canonical or json").into());
        }
    };
    std::fs::write(output, &bytes)?;
    println!("Exported {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

/// Replace the stored state with a binary snapshot.
pub fn cmd_import(db_path: &Path, backend: &str, input: &Path) -> CliResult {
    let bytes = std::fs::read(input)?;
    let home = decode_snapshot(&bytes)?;
    save_state(&home, db_path, backend)?;
    println!(
        "Imported {} zones from {}",
        home.counts().zones,
        input.display()
    );
    Ok(())
}

// =============================================================================
// SERVE
// =============================================================================

/// Run the HTTP server and the rule scheduler until Ctrl+C.
pub async fn cmd_serve(db_path: &Path, backend: &str, config: ServerConfig) -> CliResult {
    config.validate()?;

    let store: Arc<dyn StateBackend> = Arc::from(open_backend(db_path, backend)?);
    let mut home = load_state(&*store)?;
    if home.seed_default()? {
        info!("empty database, seeded default zones");
        store.save(&home)?;
    }
    if home.kill_switch().active {
        warn!("kill switch is active, automation is disabled until it is released");
    }

    let driver = OutletDriver::from_bridge_url(config.bridge_url.as_deref())?;
    info!(
        backend = store.kind(),
        driver = driver.kind(),
        db = %db_path.display(),
        "starting serra"
    );

    let state = AppState::new(home, store, driver, &config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = scheduler::spawn(
        state.clone(),
        Duration::from_secs(config.rule_tick_seconds),
        shutdown_rx,
    );

    let app = api::router(state, &config.cors_origin_list());
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
