//! Integration tests for Serra CLI commands.
//!
//! Uses tempfile for testing file-based operations.

#![allow(clippy::unwrap_used, clippy::panic)]

use serra::cli::{
    cmd_evaluate, cmd_export, cmd_import, cmd_ingest, cmd_init, cmd_status, load_or_create_state,
    save_state,
};
use serra::clock::unix_now;
use serra_core::{Condition, HomeState, Metric, Operator, RuleAction, SceneSettings};
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Seeded state with an active greenhouse scene that cools above 28°C.
fn state_with_scene() -> (HomeState, u64) {
    let mut home = HomeState::new();
    home.seed_default().unwrap();
    let zone = home.zone_by_slug("serra").unwrap().id;
    let fan = home.outlets_in_zone(zone)[2].id;
    let scene = home
        .create_scene(zone, "Estate", "estate", SceneSettings::default(), true)
        .unwrap();
    home.add_rule(
        scene,
        "cool down",
        Condition::new(Metric::Temperature, Operator::GreaterOrEqual, 28.0),
        RuleAction::switching(&[fan], &[]),
        10,
    )
    .unwrap();
    (home, scene.0)
}

// =============================================================================
// INIT COMMAND TESTS
// =============================================================================

#[test]
fn test_init_creates_file_database() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");

    assert!(cmd_init(&db_path, "file", false).is_ok());
    assert!(db_path.exists());

    let home = load_or_create_state(&db_path, "file").unwrap();
    assert_eq!(home.counts().zones, 2);
    assert_eq!(home.counts().outlets, 10);
}

#[test]
fn test_init_creates_redb_database() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.redb");

    assert!(cmd_init(&db_path, "redb", false).is_ok());
    assert!(db_path.exists());

    let home = load_or_create_state(&db_path, "redb").unwrap();
    assert!(home.zone_by_slug("terrario").is_some());
}

#[test]
fn test_init_fails_if_exists_without_force() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");

    cmd_init(&db_path, "file", false).unwrap();
    assert!(cmd_init(&db_path, "file", false).is_err());
}

#[test]
fn test_init_succeeds_with_force() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");

    cmd_init(&db_path, "file", false).unwrap();
    cmd_ingest(&db_path, "file", "serra", Some(20.0), None).unwrap();

    assert!(cmd_init(&db_path, "file", true).is_ok());
    let home = load_or_create_state(&db_path, "file").unwrap();
    assert_eq!(home.counts().readings, 0);
}

#[test]
fn test_init_unknown_backend() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    assert!(cmd_init(&db_path, "sqlite", false).is_err());
}

// =============================================================================
// LOAD/SAVE STATE TESTS
// =============================================================================

#[test]
fn test_load_nonexistent_creates_new() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("nonexistent.db");

    let home = load_or_create_state(&db_path, "file").unwrap();
    assert!(home.is_empty());
}

#[test]
fn test_save_and_load_state() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let (home, _) = state_with_scene();

    save_state(&home, &db_path, "file").unwrap();
    let loaded = load_or_create_state(&db_path, "file").unwrap();
    assert_eq!(loaded, home);
}

// =============================================================================
// STATUS & INGEST TESTS
// =============================================================================

#[test]
fn test_status_text_and_json() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    cmd_init(&db_path, "file", false).unwrap();

    assert!(cmd_status(&db_path, "file", false).is_ok());
    assert!(cmd_status(&db_path, "file", true).is_ok());
}

#[test]
fn test_ingest_by_slug_and_id() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    cmd_init(&db_path, "file", false).unwrap();

    cmd_ingest(&db_path, "file", "serra", Some(24.5), Some(60.0)).unwrap();
    cmd_ingest(&db_path, "file", "2", Some(30.0), None).unwrap();

    let home = load_or_create_state(&db_path, "file").unwrap();
    assert_eq!(home.counts().readings, 3);
    let serra = home.zone_by_slug("serra").unwrap().id;
    assert_eq!(
        home.latest_snapshot(serra).temperature.map(|r| r.value),
        Some(24.5)
    );
}

#[test]
fn test_ingest_unknown_zone() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    cmd_init(&db_path, "file", false).unwrap();

    assert!(cmd_ingest(&db_path, "file", "balcone", Some(20.0), None).is_err());
    assert!(cmd_ingest(&db_path, "file", "99", Some(20.0), None).is_err());
}

#[test]
fn test_ingest_requires_a_value() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    cmd_init(&db_path, "file", false).unwrap();

    assert!(cmd_ingest(&db_path, "file", "serra", None, None).is_err());
}

// =============================================================================
// EVALUATE COMMAND TESTS
// =============================================================================

#[test]
fn test_evaluate_dry_run_does_not_switch() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let (mut home, scene) = state_with_scene();
    let zone = home.zone_by_slug("serra").unwrap().id;
    let now = unix_now();
    home.ingest_reading(zone, Some(30.0), None, now, now).unwrap();
    save_state(&home, &db_path, "file").unwrap();

    assert!(cmd_evaluate(&db_path, "file", scene, false, 600).is_ok());
    assert!(cmd_evaluate(&db_path, "file", scene, true, 600).is_ok());

    let after = load_or_create_state(&db_path, "file").unwrap();
    assert!(after.outlets_in_zone(zone).iter().all(|o| !o.last_state));
}

#[test]
fn test_evaluate_without_readings_fails() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let (home, scene) = state_with_scene();
    save_state(&home, &db_path, "file").unwrap();

    assert!(cmd_evaluate(&db_path, "file", scene, false, 600).is_err());
}

#[test]
fn test_evaluate_unknown_scene() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    cmd_init(&db_path, "file", false).unwrap();

    assert!(cmd_evaluate(&db_path, "file", 42, false, 600).is_err());
}

// =============================================================================
// EXPORT / IMPORT TESTS
// =============================================================================

#[test]
fn test_export_canonical_format() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let output_path = temp.path().join("export.bin");
    cmd_init(&db_path, "file", false).unwrap();

    assert!(cmd_export(&db_path, "file", &output_path, "canonical").is_ok());
    let bytes = std::fs::read(&output_path).unwrap();
    assert!(serra_core::formats::is_snapshot(&bytes));
}

#[test]
fn test_export_json_format() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let output_path = temp.path().join("export.json");
    cmd_init(&db_path, "file", false).unwrap();

    assert!(cmd_export(&db_path, "file", &output_path, "json").is_ok());
    let content = std::fs::read_to_string(&output_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(value.get("zones").is_some());
}

#[test]
fn test_export_unknown_format() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let output_path = temp.path().join("export.bin");
    cmd_init(&db_path, "file", false).unwrap();

    assert!(cmd_export(&db_path, "file", &output_path, "yaml").is_err());
}

#[test]
fn test_import_into_redb() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let export_path = temp.path().join("export.bin");
    let redb_path = temp.path().join("imported.redb");

    let (home, _) = state_with_scene();
    save_state(&home, &db_path, "file").unwrap();
    cmd_export(&db_path, "file", &export_path, "canonical").unwrap();

    assert!(cmd_import(&redb_path, "redb", &export_path).is_ok());
    let imported = load_or_create_state(&redb_path, "redb").unwrap();
    assert_eq!(imported, home);
}

#[test]
fn test_import_rejects_json_export() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let export_path = temp.path().join("export.json");
    cmd_init(&db_path, "file", false).unwrap();
    cmd_export(&db_path, "file", &export_path, "json").unwrap();

    let target = temp.path().join("other.db");
    assert!(cmd_import(&target, "file", &export_path).is_err());
}

#[test]
fn test_deterministic_export() {
    let temp = create_temp_dir();
    let db_path = temp.path().join("test.db");
    let export1_path = temp.path().join("export1.bin");
    let export2_path = temp.path().join("export2.bin");

    let (home, _) = state_with_scene();
    save_state(&home, &db_path, "file").unwrap();

    cmd_export(&db_path, "file", &export1_path, "canonical").unwrap();
    cmd_export(&db_path, "file", &export2_path, "canonical").unwrap();

    let data1 = std::fs::read(&export1_path).unwrap();
    let data2 = std::fs::read(&export2_path).unwrap();
    assert_eq!(data1, data2, "Canonical export should be deterministic");
}
