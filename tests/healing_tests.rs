use std::fs;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chunkvault::{ChunkEngine, EngineConfig, EngineObserver, NullObserver};
use serde_json::json;
use tempfile::tempdir;

const DEBOUNCE: Duration = Duration::from_millis(150);

fn test_config(base: &std::path::Path) -> EngineConfig {
    EngineConfig {
        base_dir: base.to_path_buf(),
        debounce_delay: DEBOUNCE,
    }
}

/// Records fault messages for assertions
#[derive(Default)]
struct FaultRecorder {
    faults: Mutex<Vec<String>>,
}

impl EngineObserver for FaultRecorder {
    fn on_fault(&self, message: &str) {
        self.faults.lock().unwrap().push(message.to_string());
    }
}

#[test]
fn test_corrupt_primary_heals_from_backup() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    // Two commits of the same value put it in both primary and backup.
    engine.stage_update("notes", json!({"text": "world"})).unwrap();
    engine.force_sync().unwrap();
    engine.stage_update("notes", json!({"text": "world"})).unwrap();
    engine.force_sync().unwrap();

    // Truncate the primary to simulate corruption.
    let primary = dir.path().join("p1/chunks/notes.json");
    fs::write(&primary, "").unwrap();

    // The read falls back to the backup and schedules a repair.
    assert_eq!(engine.fetch_chunk("notes").unwrap(), json!({"text": "world"}));
    assert_eq!(engine.health_report().pending_syncs, 1);

    // After the debounce window the primary is valid again.
    thread::sleep(DEBOUNCE * 4);
    let restored: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&primary).unwrap()).unwrap();
    assert_eq!(restored, json!({"text": "world"}));
}

#[test]
fn test_missing_primary_reads_backup() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    engine.stage_update("notes", json!({"text": "hello"})).unwrap();
    engine.force_sync().unwrap();
    engine.stage_update("notes", json!({"text": "world"})).unwrap();
    engine.force_sync().unwrap();

    fs::remove_file(dir.path().join("p1/chunks/notes.json")).unwrap();

    // The backup holds the previous commit; that is what comes back.
    assert_eq!(engine.fetch_chunk("notes").unwrap(), json!({"text": "hello"}));
    assert_eq!(engine.health_report().pending_syncs, 1);
}

#[test]
fn test_total_loss_returns_empty_and_faults() {
    let dir = tempdir().unwrap();
    let observer = Arc::new(FaultRecorder::default());
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), observer.clone()).unwrap();

    engine.stage_update("notes", json!({"text": "hello"})).unwrap();
    engine.force_sync().unwrap();
    engine.stage_update("notes", json!({"text": "world"})).unwrap();
    engine.force_sync().unwrap();

    fs::write(dir.path().join("p1/chunks/notes.json"), "{broken").unwrap();
    fs::write(dir.path().join("p1/chunks_bak/notes.bak"), "also broken").unwrap();

    assert_eq!(engine.fetch_chunk("notes").unwrap(), json!({}));

    let faults = observer.faults.lock().unwrap();
    assert!(faults.iter().any(|f| f.contains("total data loss")));
}

#[test]
fn test_missing_chunk_returns_empty_object() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    assert_eq!(engine.fetch_chunk("never_written").unwrap(), json!({}));
}

#[test]
fn test_staged_value_shadows_corrupt_disk() {
    let dir = tempdir().unwrap();
    let observer = Arc::new(FaultRecorder::default());
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), observer.clone()).unwrap();

    engine.stage_update("notes", json!({"text": "old"})).unwrap();
    engine.force_sync().unwrap();
    fs::write(dir.path().join("p1/chunks/notes.json"), "{broken").unwrap();

    // A staged value short-circuits before any disk access.
    engine.stage_update("notes", json!({"text": "new"})).unwrap();
    assert_eq!(engine.fetch_chunk("notes").unwrap(), json!({"text": "new"}));
    assert!(observer.faults.lock().unwrap().is_empty());
}

#[test]
fn test_heal_then_backup_rotation_continues() {
    let dir = tempdir().unwrap();
    let engine =
        ChunkEngine::attach("p1", test_config(dir.path()), Arc::new(NullObserver)).unwrap();

    engine.stage_update("doc", json!({"rev": 1})).unwrap();
    engine.force_sync().unwrap();
    engine.stage_update("doc", json!({"rev": 2})).unwrap();
    engine.force_sync().unwrap();

    // Lose the primary, heal from backup, then keep committing.
    fs::remove_file(dir.path().join("p1/chunks/doc.json")).unwrap();
    assert_eq!(engine.fetch_chunk("doc").unwrap(), json!({"rev": 1}));
    engine.force_sync().unwrap();

    engine.stage_update("doc", json!({"rev": 3})).unwrap();
    engine.force_sync().unwrap();

    let primary: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("p1/chunks/doc.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(primary, json!({"rev": 3}));
}
