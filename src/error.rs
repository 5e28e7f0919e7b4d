//! Error types for chunkvault
//!
//! Defines a unified error type grouped by fault kind rather than by call
//! site. Lock contention and missing projects are not faults: they surface
//! through [`OpenError`] so hosts can branch on them directly.

use std::fmt;
use std::io;

/// Unified error type for engine operations
#[derive(Debug)]
pub enum VaultError {
    /// I/O error (create, write, rename, unlink, copy)
    Io(io::Error),
    /// A value could not be encoded as a JSON document
    Serialization(String),
    /// An on-disk document failed to parse (read-back verify or corrupt shard)
    Integrity(String),
    /// Checkpoint archive error (create, read, extract)
    Checkpoint(String),
    /// The requested checkpoint archive does not exist
    MissingCheckpoint(String),
    /// Operation invoked on an engine that does not hold the project lock
    Inactive(&'static str),
    /// Name cannot be used as a single path component
    InvalidName(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::Io(e) => write!(f, "{}", e),
            VaultError::Serialization(msg) => write!(f, "{}", msg),
            VaultError::Integrity(msg) => write!(f, "{}", msg),
            VaultError::Checkpoint(msg) => write!(f, "{}", msg),
            VaultError::MissingCheckpoint(name) => {
                write!(f, "checkpoint '{}' does not exist", name)
            }
            VaultError::Inactive(op) => {
                write!(f, "engine is not active ('{}' blocked)", op)
            }
            VaultError::InvalidName(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<io::Error> for VaultError {
    fn from(e: io::Error) -> Self {
        VaultError::Io(e)
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Outcome of the [`open`](crate::ChunkEngine::open) and
/// [`create`](crate::ChunkEngine::create) factories.
#[derive(Debug)]
pub enum OpenError {
    /// No project directory with that id exists under the root
    NotFound,
    /// Another live process holds the project lock
    AlreadyOpen,
    /// The engine could not be constructed
    Failed(VaultError),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::NotFound => write!(f, "project not found"),
            OpenError::AlreadyOpen => {
                write!(f, "project is already open in another process")
            }
            OpenError::Failed(e) => write!(f, "open failed: {}", e),
        }
    }
}

impl std::error::Error for OpenError {}

impl From<VaultError> for OpenError {
    fn from(e: VaultError) -> Self {
        OpenError::Failed(e)
    }
}
