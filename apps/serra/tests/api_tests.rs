//! Integration tests for the Serra HTTP API.
//!
//! Each test runs the full router (middleware included) against a seeded
//! home, a snapshot file in a temp dir and the simulated driver.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use base64::Engine as _;
use serde_json::{Value, json};
use serra::api::router;
use serra::clock::unix_now;
use serra::config::ServerConfig;
use serra::driver::OutletDriver;
use serra::executor::switch_outlet;
use serra::scheduler::run_tick;
use serra::state::AppState;
use serra::store::FileStore;
use serra_core::{
    Condition, DeviceId, HomeState, Metric, Operator, OutletId, RuleAction, SceneSettings,
    SessionStatus, Timestamp, ZoneId,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// Seeded ids: zone 1 = serra (device 1, outlets 1..=5), zone 2 = terrario
// (device 2, outlets 6..=10). Outlet 3 is the greenhouse fan.
const FAN: u64 = 3;

// =============================================================================
// HELPERS
// =============================================================================

struct Harness {
    server: TestServer,
    state: AppState,
    _dir: TempDir,
}

fn harness_with(config: ServerConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path().join("home.db")));
    let mut home = HomeState::new();
    home.seed_default().unwrap();
    let state = AppState::new(home, store, OutletDriver::simulated(), &config);
    let server = TestServer::new(router(state.clone(), &[])).unwrap();
    Harness {
        server,
        state,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(ServerConfig {
        rate_limit: 0,
        ..ServerConfig::default()
    })
}

/// Active greenhouse scene with one rule: fan on at 28°C or more.
async fn cooling_scene(h: &Harness) -> u64 {
    let scene: Value = h
        .server
        .post("/api/v1/scenes/zone/1")
        .json(&json!({
            "name": "Estate",
            "slug": "estate",
            "active": true,
            "settings": {
                "temperature_range": { "min": 20.0, "max": 27.0 },
                "plants_animals": ["basilico"]
            }
        }))
        .await
        .json();
    let scene_id = scene["id"].as_u64().unwrap();

    h.server
        .post(&format!("/api/v1/scenes/{scene_id}/rules"))
        .json(&json!({
            "name": "cool down",
            "condition": { "condition": "temperature", "operator": ">=", "value": 28.0 },
            "action": { "on": { "3": true } },
            "priority": 10
        }))
        .await
        .assert_status(StatusCode::CREATED);
    scene_id
}

async fn ingest(h: &Harness, zone: u64, temperature: f64) {
    h.server
        .post("/api/v1/sensors/ingest")
        .json(&json!({ "zone_id": zone, "temperature": temperature, "humidity": 55.0 }))
        .await
        .assert_status(StatusCode::CREATED);
}

async fn outlet(h: &Harness, device: u64, outlet: u64) -> Value {
    let outlets: Value = h
        .server
        .get(&format!("/api/v1/devices/{device}/outlets"))
        .await
        .json();
    outlets
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["id"] == outlet)
        .cloned()
        .unwrap()
}

// =============================================================================
// HEALTH & ZONES
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness();
    let body: Value = h.server.get("/healthz").await.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["driver"], "simulated");
    assert_eq!(body["backend"], "file");

    h.server.get("/api/v1/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_list_and_get_zones() {
    let h = harness();
    let zones: Value = h.server.get("/api/v1/zones").await.json();
    assert_eq!(zones.as_array().unwrap().len(), 2);
    assert_eq!(zones[0]["slug"], "serra");
    assert_eq!(zones[0]["mode"], "manual");

    let zone: Value = h.server.get("/api/v1/zones/2").await.json();
    assert_eq!(zone["slug"], "terrario");
    assert_eq!(zone["devices"].as_array().unwrap().len(), 1);
    assert_eq!(zone["sensors"][0]["name"], "Sensore Terrario");
}

#[tokio::test]
async fn test_unknown_zone_returns_error_body() {
    let h = harness();
    let response = h.server.get("/api/v1/zones/99").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["status"], 404);
    assert_eq!(body["error"]["message"], "zone 99 not found");
}

#[tokio::test]
async fn test_failed_save_leaves_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    // The parent directory does not exist, so every save fails.
    let store = Arc::new(FileStore::new(dir.path().join("missing").join("home.db")));
    let mut home = HomeState::new();
    home.seed_default().unwrap();
    let config = ServerConfig {
        rate_limit: 0,
        ..ServerConfig::default()
    };
    let state = AppState::new(home, store, OutletDriver::simulated(), &config);
    let server = TestServer::new(router(state, &[])).unwrap();

    server
        .post("/api/v1/zones")
        .json(&json!({ "slug": "balcone", "name": "Balcone" }))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let zones: Value = server.get("/api/v1/zones").await.json();
    assert_eq!(zones.as_array().unwrap().len(), 2);

    server
        .post("/api/v1/kill")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let kill: Value = server.get("/api/v1/kill").await.json();
    assert_eq!(kill["active"], false);
}

#[tokio::test]
async fn test_create_zone_and_conflict() {
    let h = harness();
    h.server
        .post("/api/v1/zones")
        .json(&json!({ "slug": "balcone", "name": "Balcone" }))
        .await
        .assert_status(StatusCode::CREATED);
    h.server
        .post("/api/v1/zones")
        .json(&json!({ "slug": "balcone", "name": "Again" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

// =============================================================================
// SENSORS
// =============================================================================

#[tokio::test]
async fn test_ingest_and_latest() {
    let h = harness();
    ingest(&h, 1, 24.5).await;
    let latest: Value = h.server.get("/api/v1/sensors/zone/1/latest").await.json();
    assert_eq!(latest["temperature"]["value"], 24.5);
    assert_eq!(latest["humidity"]["value"], 55.0);

    let sensors: Value = h.server.get("/api/v1/sensors/zone/1").await.json();
    assert_eq!(sensors[0]["name"], "Sensore Serra");
    assert_eq!(sensors[0]["latest"]["temperature"]["value"], 24.5);
}

#[tokio::test]
async fn test_ingest_without_values_is_rejected() {
    let h = harness();
    h.server
        .post("/api/v1/sensors/ingest")
        .json(&json!({ "zone_id": 1 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_dated_ahead_is_rejected() {
    let h = harness();
    // A client clock in milliseconds lands far in the future.
    let ahead = h.state.now().0 * 1000;
    h.server
        .post("/api/v1/sensors/ingest")
        .json(&json!({ "zone_id": 1, "temperature": 35.0, "observed_at": ahead }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    ingest(&h, 1, 20.0).await;
    let latest: Value = h.server.get("/api/v1/sensors/zone/1/latest").await.json();
    assert_eq!(latest["temperature"]["value"], 20.0);
}

// =============================================================================
// SCENES & EVALUATION
// =============================================================================

#[tokio::test]
async fn test_scene_detail_lists_rules() {
    let h = harness();
    let scene = cooling_scene(&h).await;

    let detail: Value = h.server.get(&format!("/api/v1/scenes/{scene}")).await.json();
    assert_eq!(detail["active"], true);
    assert_eq!(detail["rules"][0]["condition"]["operator"], ">=");

    let list: Value = h.server.get("/api/v1/scenes/zone/1").await.json();
    assert_eq!(list[0]["rule_count"], 1);
}

#[tokio::test]
async fn test_scene_body_round_trips_through_update() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    let mut body: Value = h.server.get(&format!("/api/v1/scenes/{scene}")).await.json();
    body["active"] = json!(false);
    body["name"] = json!("Estate calda");

    let updated: Value = h
        .server
        .put(&format!("/api/v1/scenes/{scene}"))
        .json(&body)
        .await
        .json();
    assert_eq!(updated["active"], false);
    assert_eq!(updated["name"], "Estate calda");
    assert_eq!(updated["settings"], body["settings"]);

    // Older clients still send `is_active`.
    let legacy: Value = h
        .server
        .put(&format!("/api/v1/scenes/{scene}"))
        .json(&json!({ "name": "Estate", "slug": "estate", "is_active": true }))
        .await
        .json();
    assert_eq!(legacy["active"], true);
}

#[tokio::test]
async fn test_rule_targeting_other_zone_is_rejected() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    h.server
        .post(&format!("/api/v1/scenes/{scene}/rules"))
        .json(&json!({
            "name": "wrong zone",
            "condition": { "condition": "humidity", "operator": "<", "value": 40.0 },
            "action": { "on": { "7": true } }
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dry_run_explains_without_switching() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    ingest(&h, 1, 30.0).await;

    let report: Value = h
        .server
        .post(&format!("/api/v1/scenes/{scene}/evaluate"))
        .add_query_param("dry_run", "true")
        .await
        .json();
    assert_eq!(report["dry_run"], true);
    let outlets = report["outlets"].as_array().unwrap();
    assert_eq!(outlets.len(), 5);

    let fan = outlets.iter().find(|o| o["outlet_id"] == FAN).unwrap();
    assert_eq!(fan["decision"]["kind"], "switch");
    assert_eq!(fan["decision"]["to"], true);
    assert_eq!(fan["outcome"]["status"], "skipped");
    assert!(fan["explanation"].as_str().unwrap().contains("cool down"));

    assert_eq!(report["range_checks"][0]["position"], "above");
    assert_eq!(outlet(&h, 1, FAN).await["last_state"], false);
    assert!(h.state.driver.simulated_log().is_empty());
}

#[tokio::test]
async fn test_evaluate_switches_and_audits() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    ingest(&h, 1, 30.0).await;

    let report: Value = h
        .server
        .post(&format!("/api/v1/scenes/{scene}/evaluate"))
        .await
        .json();
    let fan = report["outlets"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["outlet_id"] == FAN)
        .cloned()
        .unwrap();
    assert_eq!(fan["outcome"]["status"], "applied");
    assert_eq!(outlet(&h, 1, FAN).await["last_state"], true);
    assert_eq!(h.state.driver.simulated_log().len(), 1);

    let audit: Value = h.server.get("/api/v1/audit").await.json();
    assert_eq!(audit[0]["action"], "outlet_switched");
    assert_eq!(audit[0]["details"]["source"], "automation");

    // A second pass finds the fan already on.
    let again: Value = h
        .server
        .post(&format!("/api/v1/scenes/{scene}/evaluate"))
        .await
        .json();
    let fan = again["outlets"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["outlet_id"] == FAN)
        .cloned()
        .unwrap();
    assert_eq!(fan["decision"]["kind"], "unchanged");
    assert_eq!(h.state.driver.simulated_log().len(), 1);
}

#[tokio::test]
async fn test_evaluate_inactive_scene_conflicts() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    ingest(&h, 1, 30.0).await;
    h.server
        .post(&format!("/api/v1/scenes/{scene}/deactivate"))
        .await
        .assert_status_ok();
    h.server
        .post(&format!("/api/v1/scenes/{scene}/evaluate"))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_evaluate_without_readings_conflicts() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    let response = h
        .server
        .post(&format!("/api/v1/scenes/{scene}/evaluate"))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no sensor data")
    );
}

#[tokio::test]
async fn test_delete_scene_removes_rules() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    h.server
        .delete(&format!("/api/v1/scenes/{scene}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    h.server
        .get(&format!("/api/v1/scenes/{scene}/rules"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// =============================================================================
// MANUAL SWITCHING
// =============================================================================

#[tokio::test]
async fn test_manual_switch_with_override() {
    let h = harness();
    let body: Value = h
        .server
        .post("/api/v1/devices/1/outlets/1/switch")
        .json(&json!({ "state": true, "override_minutes": 30 }))
        .await
        .json();
    assert_eq!(body["last_state"], true);
    assert_eq!(body["manual_override"], true);

    let cleared: Value = h
        .server
        .delete("/api/v1/devices/1/outlets/1/override")
        .await
        .json();
    assert_eq!(cleared["manual_override"], false);
}

#[tokio::test]
async fn test_switch_outlet_of_other_device_is_not_found() {
    let h = harness();
    h.server
        .post("/api/v1/devices/1/outlets/6/switch")
        .json(&json!({ "state": true }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disabled_outlet_is_never_switched() {
    let h = harness();
    let updated: Value = h
        .server
        .put("/api/v1/devices/1/outlets/2/config")
        .json(&json!({ "enabled": false, "custom_name": "Luce" }))
        .await
        .json();
    assert_eq!(updated["enabled"], false);
    assert_eq!(updated["custom_name"], "Luce");

    h.server
        .post("/api/v1/devices/1/outlets/2/switch")
        .json(&json!({ "state": true }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let results: Value = h
        .server
        .post("/api/v1/devices/1/switch-all")
        .json(&json!({ "state": true }))
        .await
        .json();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 5);
    let skipped = results.iter().find(|r| r["outlet_id"] == 2).unwrap();
    assert_eq!(skipped["outcome"]["status"], "skipped");
    assert_eq!(h.state.driver.simulated_log().len(), 4);
}

#[tokio::test]
async fn test_switch_zone() {
    let h = harness();
    let results: Value = h
        .server
        .post("/api/v1/devices/zone/2/switch-all")
        .json(&json!({ "state": true }))
        .await
        .json();
    assert!(
        results
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["outcome"]["status"] == "applied")
    );
    assert_eq!(outlet(&h, 2, 8).await["last_state"], true);
}

// =============================================================================
// KILL SWITCH
// =============================================================================

#[tokio::test]
async fn test_kill_switch_blocks_mutations() {
    let h = harness();
    let kill: Value = h
        .server
        .post("/api/v1/kill")
        .json(&json!({ "reason": "water leak" }))
        .await
        .json();
    assert_eq!(kill["active"], true);
    assert_eq!(kill["reason"], "water leak");

    h.server
        .post("/api/v1/kill")
        .await
        .assert_status(StatusCode::CONFLICT);

    let blocked = h
        .server
        .post("/api/v1/devices/1/outlets/1/switch")
        .json(&json!({ "state": true }))
        .await;
    blocked.assert_status(StatusCode::LOCKED);
    let body: Value = blocked.json();
    assert_eq!(body["error"]["status"], 423);

    // Reads still work.
    h.server.get("/api/v1/zones").await.assert_status_ok();

    h.server.delete("/api/v1/kill").await.assert_status_ok();
    h.server
        .post("/api/v1/devices/1/outlets/1/switch")
        .json(&json!({ "state": true }))
        .await
        .assert_status_ok();

    let audit: Value = h.server.get("/api/v1/audit").await.json();
    let actions: Vec<&str> = audit
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"kill_switch_activated"));
    assert!(actions.contains(&"kill_switch_deactivated"));
}

#[tokio::test]
async fn test_deactivate_inactive_kill_switch_conflicts() {
    let h = harness();
    h.server
        .delete("/api/v1/kill")
        .await
        .assert_status(StatusCode::CONFLICT);
}

// =============================================================================
// AUTOMATION SESSIONS
// =============================================================================

#[tokio::test]
async fn test_session_lifecycle() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    ingest(&h, 1, 30.0).await;

    let session: Value = h
        .server
        .post("/api/v1/automation/zone/1/start")
        .json(&json!({ "scene_id": scene, "duration_minutes": 20 }))
        .await
        .json();
    assert_eq!(session["is_active"], true);
    assert_eq!(session["scene_name"], "Estate");
    assert!(session["last_evaluation_at"].is_u64());
    // The first evaluation already switched the fan on.
    assert_eq!(outlet(&h, 1, FAN).await["last_state"], true);

    let status: Value = h.server.get("/api/v1/automation/zone/1/status").await.json();
    assert_eq!(status["mode"], "automatic");
    assert_eq!(status["session"]["duration_minutes"], 20);

    let stopped: Value = h.server.post("/api/v1/automation/zone/1/stop").await.json();
    assert_eq!(stopped["status"], "stopped");
    h.server
        .post("/api/v1/automation/zone/1/stop")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let history: Value = h
        .server
        .get("/api/v1/automation/zone/1/history")
        .add_query_param("limit", 5)
        .await
        .json();
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_start_notes_failed_first_evaluation() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    let session: Value = h
        .server
        .post("/api/v1/automation/zone/1/start")
        .json(&json!({ "scene_id": scene }))
        .await
        .json();
    assert_eq!(session["is_active"], true);
    assert_eq!(session["status"], "running");
    assert_eq!(session["duration_minutes"], 15);
    assert!(
        session["notes"]
            .as_str()
            .unwrap()
            .starts_with("initial evaluation error")
    );
}

#[tokio::test]
async fn test_session_scene_must_match_zone() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    h.server
        .post("/api/v1/automation/zone/2/start")
        .json(&json!({ "scene_id": scene }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_scheduler_tick_drives_automatic_zones() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    ingest(&h, 1, 25.0).await;
    h.server
        .post("/api/v1/automation/zone/1/start")
        .json(&json!({ "scene_id": scene }))
        .await
        .assert_status_ok();
    assert_eq!(outlet(&h, 1, FAN).await["last_state"], false);

    ingest(&h, 1, 31.0).await;
    run_tick(&h.state).await;
    assert_eq!(outlet(&h, 1, FAN).await["last_state"], true);
}

#[tokio::test]
async fn test_scheduler_evaluates_activated_scene() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    h.server
        .post(&format!("/api/v1/scenes/{scene}/deactivate"))
        .await
        .assert_status_ok();
    h.server
        .post(&format!("/api/v1/scenes/{scene}/activate"))
        .await
        .assert_status_ok();
    ingest(&h, 1, 31.0).await;

    run_tick(&h.state).await;
    assert_eq!(outlet(&h, 1, FAN).await["last_state"], true);
    assert_eq!(h.state.driver.simulated_log().len(), 1);
}

#[tokio::test]
async fn test_scheduler_idle_for_inactive_scenes_and_kill_switch() {
    let h = harness();
    let scene = cooling_scene(&h).await;
    ingest(&h, 1, 31.0).await;
    h.server
        .post(&format!("/api/v1/scenes/{scene}/deactivate"))
        .await
        .assert_status_ok();
    run_tick(&h.state).await;
    assert!(h.state.driver.simulated_log().is_empty());

    h.server
        .post(&format!("/api/v1/scenes/{scene}/activate"))
        .await
        .assert_status_ok();
    h.server.post("/api/v1/kill").await.assert_status_ok();
    run_tick(&h.state).await;
    assert!(h.state.driver.simulated_log().is_empty());
}

#[tokio::test]
async fn test_scheduler_tick_survives_failed_saves() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path().join("missing").join("home.db")));
    let mut home = HomeState::new();
    home.seed_default().unwrap();
    let zone = ZoneId(1);
    let scene = home
        .create_scene(zone, "Estate", "estate", SceneSettings::default(), true)
        .unwrap();
    home.add_rule(
        scene,
        "cool down",
        Condition::new(Metric::Temperature, Operator::GreaterOrEqual, 28.0),
        RuleAction::switching(&[OutletId(FAN)], &[]),
        10,
    )
    .unwrap();
    // A one-minute session started long ago expires on the first tick.
    let session = home.start_session(zone, scene, 1, Timestamp(0)).unwrap();
    let now = unix_now();
    home.ingest_reading(zone, Some(31.0), None, now, now).unwrap();

    let config = ServerConfig {
        rate_limit: 0,
        ..ServerConfig::default()
    };
    let state = AppState::new(home, store, OutletDriver::simulated(), &config);
    run_tick(&state).await;

    assert_eq!(state.driver.simulated_log().len(), 1);
    let home = state.home().await;
    assert_eq!(home.session(session).unwrap().status, SessionStatus::Completed);
    assert!(home.outlet(OutletId(FAN)).unwrap().last_state);
}

#[tokio::test]
async fn test_scheduler_skips_zones_without_readings() {
    let h = harness();
    cooling_scene(&h).await;
    run_tick(&h.state).await;
    assert!(h.state.driver.simulated_log().is_empty());
    assert_eq!(outlet(&h, 1, FAN).await["last_state"], false);
}

// =============================================================================
// EVENT STREAM
// =============================================================================

#[tokio::test]
async fn test_event_stream_reports_switches() {
    let h = harness();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(h.state.clone(), &[]);
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let mut response = reqwest::get(format!("http://{addr}/api/v1/events/sse"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    switch_outlet(&h.state, DeviceId(1), OutletId(FAN), true, None)
        .await
        .unwrap();

    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = response.chunk().await.unwrap() {
            received.push_str(&String::from_utf8_lossy(&chunk));
            if received.contains("outlet_switched") && received.ends_with("\n\n") {
                break;
            }
        }
    })
    .await;
    assert!(read.is_ok(), "no event frame within 5s: {received:?}");
    assert!(received.contains("event: outlet_switched"));
    assert!(received.contains("\"outlet_id\":3"));
    assert!(received.contains("\"source\":\"manual\""));
}

// =============================================================================
// SECURITY MIDDLEWARE
// =============================================================================

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let h = harness_with(ServerConfig {
        api_key: Some("s3cret".into()),
        rate_limit: 0,
        ..ServerConfig::default()
    });

    h.server
        .get("/api/v1/zones")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    h.server
        .get("/api/v1/zones")
        .add_header("X-API-Key", "wrong")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    h.server
        .get("/api/v1/zones")
        .add_header("X-API-Key", "s3cret")
        .await
        .assert_status_ok();
    h.server
        .get("/api/v1/zones")
        .add_header("Authorization", "Bearer s3cret")
        .await
        .assert_status_ok();
    h.server.get("/healthz").await.assert_status_ok();
}

#[tokio::test]
async fn test_rate_limit_rejects_bursts() {
    let h = harness_with(ServerConfig {
        rate_limit: 1,
        ..ServerConfig::default()
    });
    h.server.get("/api/v1/zones").await.assert_status_ok();
    h.server
        .get("/api/v1/zones")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

// =============================================================================
// SNAPSHOT
// =============================================================================

#[tokio::test]
async fn test_snapshot_decodes_to_state() {
    let h = harness();
    cooling_scene(&h).await;
    let body: Value = h.server.get("/api/v1/snapshot").await.json();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(body["size_bytes"], bytes.len());
    let home = serra_core::formats::decode_snapshot(&bytes).unwrap();
    assert_eq!(home.counts().scenes, 1);
}
