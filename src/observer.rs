//! Host observer interface
//!
//! The engine reports progress and faults through a single injected
//! observer instead of mutable callback fields. Every method has a no-op
//! default body, so a host implements only the events it cares about.
//!
//! Callbacks are invoked with the engine mutex released; an observer may
//! call back into the engine without deadlocking.

/// Events the engine raises towards its host
pub trait EngineObserver: Send + Sync {
    /// Informational progress line, suitable for a status bar
    fn on_status(&self, _message: &str) {}

    /// A commit batch completed with every chunk durably written
    fn on_sync(&self) {}

    /// A recoverable or unrecoverable fault, stringified
    fn on_fault(&self, _message: &str) {}
}

/// Observer that ignores every event
pub struct NullObserver;

impl EngineObserver for NullObserver {}
