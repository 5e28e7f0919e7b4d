//! Shared state between the engine façade and the flush scheduler
//!
//! One mutex — the engine mutex — guards the staging buffer and the flush
//! deadline. It is the only lock in the system: staging, buffer reads and
//! whole commit batches all serialize on it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Local;
use serde_json::Value;

use crate::flush::FlushOutcome;
use crate::observer::EngineObserver;
use crate::paths::ProjectLayout;

/// Most recent status lines kept for host UIs
const STATUS_HISTORY_LIMIT: usize = 50;

/// Mutable engine state guarded by the engine mutex
pub(crate) struct EngineState {
    /// Write-ahead buffer: chunk name -> pending value
    pub staged: HashMap<String, Value>,
    /// When the debounced flush fires; `None` means nothing is scheduled
    pub deadline: Option<Instant>,
    /// Tells the scheduler thread to exit
    pub shutdown: bool,
}

/// State shared between the façade and the scheduler thread
pub(crate) struct EngineShared {
    pub layout: ProjectLayout,
    pub project_id: String,
    pub observer: Arc<dyn EngineObserver>,
    pub state: Mutex<EngineState>,
    pub wakeup: Condvar,
    active: AtomicBool,
    history: Mutex<VecDeque<String>>,
}

impl EngineShared {
    pub fn new(
        layout: ProjectLayout,
        project_id: String,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        Self {
            layout,
            project_id,
            observer,
            state: Mutex::new(EngineState {
                staged: HashMap::new(),
                deadline: None,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
            active: AtomicBool::new(false),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Log, remember and notify the host. Callers must not hold the
    /// engine mutex: the observer may call back into the engine.
    pub fn status(&self, message: &str) {
        log::info!("[{}] {}", self.project_id, message);
        self.remember(message);
        self.observer.on_status(message);
    }

    /// Like [`status`](Self::status), for faults.
    pub fn fault(&self, message: &str) {
        log::error!("[{}] {}", self.project_id, message);
        self.remember(&format!("CRITICAL FAULT: {}", message));
        self.observer.on_fault(message);
    }

    /// Report a finished flush to the host. `on_sync` fires only for a
    /// batch that committed without a single fault.
    pub fn report_flush(&self, outcome: &FlushOutcome) {
        match outcome {
            FlushOutcome::Idle => {}
            FlushOutcome::Committed(count) => {
                log::debug!("[{}] flushed {} chunk(s)", self.project_id, count);
                self.observer.on_sync();
            }
            FlushOutcome::Faulted {
                committed,
                first_fault,
            } => {
                log::debug!(
                    "[{}] flush committed {} chunk(s) before faulting",
                    self.project_id,
                    committed
                );
                self.fault(first_fault);
            }
        }
    }

    /// The most recent status lines, oldest first.
    pub fn recent_status(&self) -> Vec<String> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    fn remember(&self, message: &str) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        let mut history = self.history.lock().unwrap();
        history.push_back(line);
        if history.len() > STATUS_HISTORY_LIMIT {
            history.pop_front();
        }
    }
}
