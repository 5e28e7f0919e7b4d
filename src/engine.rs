//! Engine façade: project lifecycle, staged writes, self-healing reads,
//! checkpoints
//!
//! One [`ChunkEngine`] instance owns one project directory. Construction
//! builds the directory tree, sweeps crash artifacts and tries to claim
//! the PID lock; a denied lock leaves the engine constructed but
//! *inactive*, in which state every guarded operation logs the attempt
//! and returns [`VaultError::Inactive`] without touching anything.
//!
//! Dropping the engine detaches it (final flush, lock release) and joins
//! the flush scheduler thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::info;
use serde::Serialize;
use serde_json::{json, Value};

use crate::checkpoint::{self, CheckpointInfo};
use crate::error::{OpenError, Result, VaultError};
use crate::flush;
use crate::lock::{self, LockOutcome};
use crate::observer::EngineObserver;
use crate::paths::{self, ProjectLayout};
use crate::state::EngineShared;

/// Engine version stamped into `version.json` and checkpoint metadata
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Construction-time configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory holding every project
    pub base_dir: PathBuf,
    /// How long to wait after the last `stage_update` before flushing
    pub debounce_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("user_projects"),
            debounce_delay: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Shorter debounce window for latency-sensitive hosts
    pub fn low_latency() -> Self {
        Self {
            debounce_delay: Duration::from_millis(250),
            ..Default::default()
        }
    }
}

/// Contents of `version.json`, refreshed on every successful attach
#[derive(Serialize)]
struct VersionStamp<'a> {
    engine_version: &'a str,
    attached_at: String,
    project_id: &'a str,
}

/// Diagnostic summary of the project state
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub active: bool,
    pub project: String,
    pub root_path: PathBuf,
    pub shards_count: usize,
    pub checkpoints_count: usize,
    pub pending_syncs: usize,
}

/// Fault-tolerant persistence engine for one project directory
pub struct ChunkEngine {
    project_id: String,
    base_dir: PathBuf,
    debounce_delay: Duration,
    shared: Arc<EngineShared>,
    scheduler: Option<JoinHandle<()>>,
}

impl ChunkEngine {
    /// Construct an engine for `project_id` and try to claim its lock.
    ///
    /// The directory tree is created if missing (failure is fatal) and
    /// stray `.tmp` files from crashed commits are swept. A lock held by
    /// a live process leaves the engine inactive rather than failing.
    pub fn attach(
        project_id: &str,
        config: EngineConfig,
        observer: Arc<dyn EngineObserver>,
    ) -> Result<Self> {
        paths::validate_name(project_id)?;

        let layout = ProjectLayout::new(&config.base_dir, project_id);
        layout.ensure_dirs()?;
        let swept = layout.sweep_stale_temps();
        if swept > 0 {
            info!("swept {} stale temp file(s) from '{}'", swept, project_id);
        }

        let shared = Arc::new(EngineShared::new(
            layout,
            project_id.to_string(),
            observer,
        ));
        let scheduler_shared = Arc::clone(&shared);
        let scheduler = thread::spawn(move || flush::scheduler_loop(scheduler_shared));

        let engine = Self {
            project_id: project_id.to_string(),
            base_dir: config.base_dir,
            debounce_delay: config.debounce_delay,
            shared,
            scheduler: Some(scheduler),
        };
        engine.claim_lock();
        Ok(engine)
    }

    /// Open an existing project.
    pub fn open(
        project_id: &str,
        config: EngineConfig,
        observer: Arc<dyn EngineObserver>,
    ) -> std::result::Result<Self, OpenError> {
        if !config.base_dir.join(project_id).is_dir() {
            return Err(OpenError::NotFound);
        }
        let engine = Self::attach(project_id, config, observer)?;
        if !engine.is_active() {
            return Err(OpenError::AlreadyOpen);
        }
        Ok(engine)
    }

    /// Create a brand-new project, suffixing `_1`, `_2`, ... until an
    /// unused directory name is found. The effective id is available via
    /// [`project_id`](Self::project_id).
    pub fn create(
        project_id: &str,
        config: EngineConfig,
        observer: Arc<dyn EngineObserver>,
    ) -> std::result::Result<Self, OpenError> {
        paths::validate_name(project_id).map_err(OpenError::Failed)?;
        fs::create_dir_all(&config.base_dir)
            .map_err(|e| OpenError::Failed(e.into()))?;

        let mut target = project_id.to_string();
        let mut counter = 1;
        while config.base_dir.join(&target).exists() {
            target = format!("{}_{}", project_id, counter);
            counter += 1;
        }

        let engine = Self::attach(&target, config, observer)?;
        if !engine.is_active() {
            // Only possible if another process raced us into the fresh
            // directory.
            return Err(OpenError::AlreadyOpen);
        }
        Ok(engine)
    }

    /// Project directories under `base_dir`: anything containing a
    /// `chunks/` subdirectory.
    pub fn list_projects(base_dir: &Path) -> Vec<String> {
        let mut projects = Vec::new();
        if let Ok(entries) = fs::read_dir(base_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() && path.join("chunks").is_dir() {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        projects.push(name.to_string());
                    }
                }
            }
        }
        projects.sort();
        projects
    }

    /// Whether this engine holds the project lock.
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// The effective project id (may carry a `_N` suffix after
    /// [`create`](Self::create)).
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Stage `value` under `name` and (re)arm the debounce timer.
    ///
    /// Takes the value by move: once staged, only the engine owns it, so
    /// a caller can never mutate a value out from under a pending commit.
    /// [`fetch_chunk`](Self::fetch_chunk) hands back owned clones.
    pub fn stage_update(&self, name: &str, value: Value) -> Result<()> {
        self.ensure_active("stage_update")?;
        paths::validate_name(name)?;

        let mut state = self.shared.lock();
        state.staged.insert(name.to_string(), value);
        state.deadline = Some(Instant::now() + self.debounce_delay);
        drop(state);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    /// Best current value for `name`, in strict precedence: staging
    /// buffer, then primary, then backup.
    ///
    /// A parseable backup behind a corrupt or missing primary is
    /// re-staged under the same name, so the next flush rewrites the
    /// primary through the normal commit path; reads never modify files
    /// directly. A chunk missing everywhere yields the empty object.
    pub fn fetch_chunk(&self, name: &str) -> Result<Value> {
        self.ensure_active("fetch_chunk")?;
        paths::validate_name(name)?;

        {
            let state = self.shared.lock();
            if let Some(value) = state.staged.get(name) {
                return Ok(value.clone());
            }
        }

        let primary = self.shared.layout.chunk_primary(name);
        if primary.exists() {
            match read_document(&primary) {
                Ok(value) => return Ok(value),
                Err(e) => self.shared.status(&format!(
                    "primary shard '{}' corrupt ({}), trying backup",
                    name, e
                )),
            }
        }

        let backup = self.shared.layout.chunk_backup(name);
        if backup.exists() {
            match read_document(&backup) {
                Ok(value) => {
                    self.stage_update(name, value.clone())?;
                    return Ok(value);
                }
                Err(e) => self
                    .shared
                    .fault(&format!("total data loss for chunk '{}': {}", name, e)),
            }
        }

        Ok(json!({}))
    }

    /// Flush every staged chunk on the caller's thread, now. Cancels the
    /// pending debounce.
    pub fn force_sync(&self) -> Result<()> {
        self.ensure_active("force_sync")?;

        let mut state = self.shared.lock();
        let outcome = flush::flush_locked(&self.shared, &mut state);
        drop(state);
        self.shared.report_flush(&outcome);
        Ok(())
    }

    /// Final sync, release the lock, go inactive. Idempotent. I/O
    /// problems are logged and reported but never block the state
    /// transition.
    pub fn detach(&self) {
        if !self.shared.is_active() {
            return;
        }

        self.shared.status("detaching engine, performing final sync");
        let outcome = {
            let mut state = self.shared.lock();
            flush::flush_locked(&self.shared, &mut state)
        };
        self.shared.report_flush(&outcome);

        lock::release(&self.shared.layout.lock_file);
        self.shared.set_active(false);
        self.shared.status("engine detached, lock released");
    }

    /// Archive the current committed state. Returns the archive filename.
    ///
    /// Pending staged chunks are flushed first so the archive captures
    /// the latest values; staging stays blocked for the whole archive
    /// write.
    pub fn create_checkpoint(
        &self,
        label: &str,
        notes: &str,
        retention: usize,
    ) -> Result<String> {
        self.ensure_active("create_checkpoint")?;

        let mut state = self.shared.lock();
        let outcome = flush::flush_locked(&self.shared, &mut state);
        let result = checkpoint::create(
            &self.shared.layout,
            label,
            notes,
            retention,
            ENGINE_VERSION,
        );
        drop(state);
        self.shared.report_flush(&outcome);

        match result {
            Ok(zip_name) => {
                self.shared
                    .status(&format!("checkpoint '{}' created", zip_name));
                Ok(zip_name)
            }
            Err(e) => {
                self.shared.fault(&format!("checkpoint failed: {}", e));
                Err(e)
            }
        }
    }

    /// Discard every pending edit and restore the project from an
    /// archive. A missing archive is a plain result, not a fault, and
    /// leaves the staging buffer untouched.
    pub fn restore_checkpoint(&self, zip_name: &str) -> Result<()> {
        self.ensure_active("restore_checkpoint")?;

        // Probe before touching any state: a missing archive must leave
        // pending edits intact.
        if !self.shared.layout.checkpoint_dir.join(zip_name).exists() {
            return Err(VaultError::MissingCheckpoint(zip_name.to_string()));
        }

        let mut state = self.shared.lock();
        state.deadline = None;
        state.staged.clear();
        let result = checkpoint::restore(&self.shared.layout, zip_name);
        drop(state);

        match result {
            Ok(()) => {
                self.shared
                    .status(&format!("project restored from {}", zip_name));
                Ok(())
            }
            Err(e) => {
                self.shared.fault(&format!("restore failed: {}", e));
                Err(e)
            }
        }
    }

    /// Metadata for every readable checkpoint archive, newest first.
    pub fn list_checkpoints(&self) -> Vec<CheckpointInfo> {
        checkpoint::list(&self.shared.layout)
    }

    /// Remove the entire project directory. Requires explicit
    /// confirmation; detaches first so the lock is released. Available on
    /// an inactive engine.
    pub fn delete_project(&self, confirmed: bool) -> Result<bool> {
        if !confirmed {
            self.shared
                .status("delete_project rejected: missing confirmation");
            return Ok(false);
        }

        self.detach();
        let project_dir = &self.shared.layout.project_dir;
        if project_dir.exists() {
            if let Err(e) = fs::remove_dir_all(project_dir) {
                self.shared.fault(&format!(
                    "failed to delete project '{}': {}",
                    self.project_id, e
                ));
                return Err(e.into());
            }
        }
        self.shared
            .status(&format!("project '{}' deleted", self.project_id));
        Ok(true)
    }

    /// Diagnostic summary of the project state.
    pub fn health_report(&self) -> HealthReport {
        let pending = self.shared.lock().staged.len();
        HealthReport {
            active: self.shared.is_active(),
            project: self.project_id.clone(),
            root_path: self.base_dir.clone(),
            shards_count: self.shared.layout.primary_files().len(),
            checkpoints_count: self.shared.layout.checkpoint_files().len(),
            pending_syncs: pending,
        }
    }

    /// The most recent status lines (bounded history), oldest first.
    pub fn recent_status(&self) -> Vec<String> {
        self.shared.recent_status()
    }

    /// Guard for operations that require the project lock.
    fn ensure_active(&self, op: &'static str) -> Result<()> {
        if self.shared.is_active() {
            return Ok(());
        }
        self.shared
            .status(&format!("blocked: '{}' called on inactive engine", op));
        Err(VaultError::Inactive(op))
    }

    fn claim_lock(&self) {
        match lock::try_acquire(&self.shared.layout.lock_file) {
            LockOutcome::Acquired => {
                if let Err(e) = self.write_version_stamp() {
                    lock::release(&self.shared.layout.lock_file);
                    self.shared.set_active(false);
                    self.shared
                        .fault(&format!("critical lock failure: {}", e));
                    return;
                }
                self.shared.set_active(true);
                self.shared
                    .status(&format!("engine attached to '{}'", self.project_id));
            }
            LockOutcome::HeldByLive(pid) => {
                self.shared.set_active(false);
                self.shared.status(&format!(
                    "attach denied: project '{}' is already open (pid {})",
                    self.project_id, pid
                ));
            }
            LockOutcome::Failed(e) => {
                self.shared.set_active(false);
                self.shared
                    .fault(&format!("critical lock failure: {}", e));
            }
        }
    }

    fn write_version_stamp(&self) -> Result<()> {
        let stamp = VersionStamp {
            engine_version: ENGINE_VERSION,
            attached_at: Utc::now().to_rfc3339(),
            project_id: &self.project_id,
        };
        fs::write(
            &self.shared.layout.version_file,
            serde_json::to_string_pretty(&stamp)?,
        )?;
        Ok(())
    }
}

impl Drop for ChunkEngine {
    fn drop(&mut self) {
        self.detach();

        {
            let mut state = self.shared.lock();
            state.shutdown = true;
        }
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.scheduler.take() {
            let _ = handle.join();
        }
    }
}

fn read_document(path: &Path) -> Result<Value> {
    let body = fs::read_to_string(path)?;
    crate::commit::decode_document(&body)
}
