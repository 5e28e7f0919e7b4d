//! PID-file process lock
//!
//! Ownership of a project is advisory: whichever process is named in the
//! `.lock` file owns it, and every other engine must stay inactive. A lock
//! naming a dead PID is stale and gets reclaimed on the next attach, which
//! is what makes crashed predecessors recoverable. Cross-host shared
//! storage is unsupported.

use std::fs;
use std::path::Path;
use std::process;

use log::{info, warn};

/// What [`try_acquire`] found at the lock path
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LockOutcome {
    /// The lock file now names this process
    Acquired,
    /// A live process holds the lock
    HeldByLive(u32),
    /// Writing our own lock failed
    Failed(String),
}

/// Parse the `PID: <n>` payload. Anything unparseable yields `None`.
pub(crate) fn parse_lock_pid(contents: &str) -> Option<u32> {
    contents.trim().strip_prefix("PID:")?.trim().parse().ok()
}

/// Whether a process with this PID exists on the local host.
#[cfg(unix)]
pub(crate) fn pid_is_alive(pid: u32) -> bool {
    // Signal 0 probes liveness without delivering anything. EPERM means
    // the process exists but belongs to another user.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub(crate) fn pid_is_alive(_pid: u32) -> bool {
    // No portable probe here; report the owner as gone so a crashed
    // predecessor never bricks the project.
    false
}

/// Try to become the sole owner of the project.
///
/// An existing lock is honored only while its PID is alive; stale and
/// unparseable locks are removed before claiming.
pub(crate) fn try_acquire(lock_file: &Path) -> LockOutcome {
    if lock_file.exists() {
        match fs::read_to_string(lock_file) {
            Ok(contents) => match parse_lock_pid(&contents) {
                Some(pid) if pid_is_alive(pid) => return LockOutcome::HeldByLive(pid),
                Some(pid) => {
                    info!("removing stale lock left by dead pid {}", pid);
                    let _ = fs::remove_file(lock_file);
                }
                None => {
                    warn!("lock file {:?} is unparseable, treating as stale", lock_file);
                    let _ = fs::remove_file(lock_file);
                }
            },
            Err(e) => {
                warn!("could not read lock file {:?}: {}", lock_file, e);
                let _ = fs::remove_file(lock_file);
            }
        }
    }

    match fs::write(lock_file, format!("PID: {}", process::id())) {
        Ok(()) => LockOutcome::Acquired,
        Err(e) => LockOutcome::Failed(e.to_string()),
    }
}

/// Release the lock. Unlink failures are logged, never propagated: detach
/// must always complete its state transition.
pub(crate) fn release(lock_file: &Path) {
    if lock_file.exists() {
        if let Err(e) = fs::remove_file(lock_file) {
            warn!("failed to remove lock file {:?}: {}", lock_file, e);
        }
    }
}
