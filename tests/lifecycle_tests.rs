use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chunkvault::{ChunkEngine, EngineConfig, NullObserver, OpenError, VaultError};
use serde_json::json;
use tempfile::tempdir;

fn test_config(base: &std::path::Path) -> EngineConfig {
    EngineConfig {
        base_dir: base.to_path_buf(),
        debounce_delay: Duration::from_millis(150),
    }
}

#[test]
fn test_attach_creates_layout_and_lock() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    assert!(engine.is_active());
    let root = dir.path().join("p1");
    assert!(root.join("chunks").is_dir());
    assert!(root.join("chunks_bak").is_dir());
    assert!(root.join("checkpoints").is_dir());

    let lock = fs::read_to_string(root.join(".lock")).unwrap();
    assert_eq!(lock, format!("PID: {}", std::process::id()));

    let version: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("version.json")).unwrap()).unwrap();
    assert_eq!(version["project_id"], "p1");
    assert_eq!(version["engine_version"], chunkvault::ENGINE_VERSION);
    assert!(version["attached_at"].is_string());
}

#[test]
fn test_second_engine_denied_while_lock_held() {
    let dir = tempdir().unwrap();
    let first =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert!(first.is_active());

    // Direct attach leaves the second engine constructed but inactive.
    let second =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert!(!second.is_active());

    // The factory surfaces the same condition as a result.
    match ChunkEngine::open("p1", test_config(dir.path()), Arc::new(NullObserver)) {
        Err(OpenError::AlreadyOpen) => {}
        other => panic!("expected AlreadyOpen, got {:?}", other.map(|e| e.is_active())),
    }

    // The first engine still holds the lock.
    assert!(first.is_active());
    let lock = fs::read_to_string(dir.path().join("p1/.lock")).unwrap();
    assert_eq!(lock, format!("PID: {}", std::process::id()));
}

#[test]
fn test_stale_lock_reclaimed() {
    let dir = tempdir().unwrap();
    {
        let engine =
            ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
        engine.detach();
    }

    // Simulate a crashed predecessor.
    fs::write(dir.path().join("p1/.lock"), "PID: 999999999").unwrap();

    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert!(engine.is_active());
    let lock = fs::read_to_string(dir.path().join("p1/.lock")).unwrap();
    assert_eq!(lock, format!("PID: {}", std::process::id()));
}

#[test]
fn test_unparseable_lock_treated_as_stale() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("p1")).unwrap();
    fs::write(dir.path().join("p1/.lock"), "garbage contents").unwrap();

    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert!(engine.is_active());
}

#[test]
fn test_detach_releases_lock_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    engine.detach();
    assert!(!engine.is_active());
    assert!(!dir.path().join("p1/.lock").exists());

    // Second detach is a no-op.
    engine.detach();

    // Guarded operations now report the inactive state.
    match engine.stage_update("profile", json!({"a": 1})) {
        Err(VaultError::Inactive(_)) => {}
        other => panic!("expected Inactive, got {:?}", other),
    }

    // A fresh engine can re-attach.
    let next =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert!(next.is_active());
}

#[test]
fn test_detach_flushes_pending_updates() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    engine.stage_update("profile", json!({"name": "Ada"})).unwrap();
    engine.detach();

    let body = fs::read_to_string(dir.path().join("p1/chunks/profile.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value, json!({"name": "Ada"}));
}

#[test]
fn test_open_missing_project() {
    let dir = tempdir().unwrap();
    match ChunkEngine::open("nope", test_config(dir.path()), Arc::new(NullObserver)) {
        Err(OpenError::NotFound) => {}
        _ => panic!("expected NotFound"),
    }
}

#[test]
fn test_create_suffixes_on_collision() {
    let dir = tempdir().unwrap();
    let first =
        ChunkEngine::create("draft", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert_eq!(first.project_id(), "draft");

    let second =
        ChunkEngine::create("draft", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert_eq!(second.project_id(), "draft_1");

    let third =
        ChunkEngine::create("draft", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert_eq!(third.project_id(), "draft_2");
}

#[test]
fn test_attach_sweeps_stale_temps() {
    let dir = tempdir().unwrap();
    {
        let engine =
            ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
        engine.detach();
    }

    let ghost = dir.path().join("p1/chunks/ghost.tmp");
    fs::write(&ghost, "{\"half\": ").unwrap();

    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    assert!(engine.is_active());
    assert!(!ghost.exists());
}

#[test]
fn test_delete_project_requires_confirmation() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    assert!(!engine.delete_project(false).unwrap());
    assert!(dir.path().join("p1").exists());

    assert!(engine.delete_project(true).unwrap());
    assert!(!dir.path().join("p1").exists());
    assert!(!engine.is_active());
}

#[test]
fn test_list_projects_filters_non_projects() {
    let dir = tempdir().unwrap();
    let _a = ChunkEngine::create("alpha", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    let _b = ChunkEngine::create("beta", test_config(dir.path()), Arc::new(NullObserver)).unwrap();
    // A bare directory without a chunks/ subdirectory is not a project.
    fs::create_dir_all(dir.path().join("scratch")).unwrap();
    fs::write(dir.path().join("readme.txt"), "hi").unwrap();

    assert_eq!(
        ChunkEngine::list_projects(dir.path()),
        vec!["alpha".to_string(), "beta".to_string()]
    );
}

#[test]
fn test_health_report_counts() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    engine.stage_update("a", json!({"v": 1})).unwrap();
    engine.stage_update("b", json!({"v": 2})).unwrap();

    let report = engine.health_report();
    assert!(report.active);
    assert_eq!(report.project, "p1");
    assert_eq!(report.pending_syncs, 2);
    assert_eq!(report.shards_count, 0);

    engine.force_sync().unwrap();
    engine.create_checkpoint("baseline", "", 10).unwrap();

    let report = engine.health_report();
    assert_eq!(report.pending_syncs, 0);
    assert_eq!(report.shards_count, 2);
    assert_eq!(report.checkpoints_count, 1);
}
