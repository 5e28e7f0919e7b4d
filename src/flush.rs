//! Debounced flush scheduling
//!
//! Staged updates are not written immediately: each `stage_update` re-arms
//! a deadline, and a single scheduler thread commits the whole buffer once
//! the deadline expires with no further staging. Interactive edit bursts
//! therefore collapse into one durable write per debounce window without
//! ever losing the latest value.
//!
//! The scheduler holds the engine mutex for the entire commit batch, so
//! staging and flushing are mutually exclusive. In-flight commits are not
//! interruptible: a late-but-consistent durable state beats a canceled
//! one.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::commit;
use crate::state::{EngineShared, EngineState};

/// What one flush did, reported to the observer after the mutex drops
pub(crate) enum FlushOutcome {
    /// Nothing staged, or the engine was inactive
    Idle,
    /// Every staged chunk committed
    Committed(usize),
    /// At least one chunk failed; the rest were still attempted
    Faulted {
        committed: usize,
        first_fault: String,
    },
}

/// Drain the staging buffer and commit every chunk in it. The caller must
/// hold the engine mutex; per-chunk faults never abort the rest of the
/// batch.
pub(crate) fn flush_locked(shared: &EngineShared, state: &mut EngineState) -> FlushOutcome {
    state.deadline = None;
    if !shared.is_active() || state.staged.is_empty() {
        return FlushOutcome::Idle;
    }

    let batch: Vec<(String, Value)> = state.staged.drain().collect();
    let mut committed = 0;
    let mut first_fault: Option<String> = None;

    for (name, value) in &batch {
        match commit::commit_chunk(&shared.layout, name, value) {
            Ok(()) => committed += 1,
            Err(e) => {
                log::error!("[{}] commit failed for chunk '{}': {}", shared.project_id, name, e);
                if first_fault.is_none() {
                    first_fault = Some(format!("commit failed for chunk '{}': {}", name, e));
                }
            }
        }
    }

    match first_fault {
        None => FlushOutcome::Committed(committed),
        Some(first_fault) => FlushOutcome::Faulted {
            committed,
            first_fault,
        },
    }
}

/// Scheduler loop: park on the condvar until a deadline is armed, flush
/// when it comes due. Runs until the shutdown flag is set.
pub(crate) fn scheduler_loop(shared: Arc<EngineShared>) {
    log::debug!("flush scheduler started for '{}'", shared.project_id);

    let mut state = shared.lock();
    loop {
        if state.shutdown {
            break;
        }
        match state.deadline {
            None => {
                state = shared.wakeup.wait(state).unwrap();
            }
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    // Re-staging pushes the deadline forward; the wait is
                    // re-checked on every wakeup.
                    let (guard, _) = shared.wakeup.wait_timeout(state, deadline - now).unwrap();
                    state = guard;
                } else {
                    let outcome = flush_locked(&shared, &mut state);
                    drop(state);
                    shared.report_flush(&outcome);
                    state = shared.lock();
                }
            }
        }
    }

    log::debug!("flush scheduler stopped for '{}'", shared.project_id);
}
