//! chunkvault - embedded crash-safe storage for named JSON documents
//!
//! One engine instance owns one project directory and mediates every
//! read, write, snapshot and restore to it:
//!
//! - Writes are staged in an in-memory buffer and flushed by a debounced
//!   background scheduler, one atomic temp-write + fsync + rename per
//!   chunk, with a one-generation backup rotated in on each commit.
//! - Reads heal themselves: buffer first, then the primary document, then
//!   the backup - which is re-staged so the next flush repairs the
//!   primary.
//! - A PID lock file keeps each project single-writer across processes;
//!   stale locks left by crashed owners are reclaimed on attach.
//! - Checkpoints are ZIP archives of every primary plus metadata, with
//!   oldest-first retention and full (destructive) restore.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chunkvault::{ChunkEngine, EngineConfig, NullObserver};
//! use serde_json::json;
//!
//! let engine = ChunkEngine::create("demo", EngineConfig::default(), Arc::new(NullObserver))?;
//! engine.stage_update("profile", json!({"name": "Ada"}))?;
//! engine.force_sync()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod observer;

mod commit;
mod flush;
mod lock;
mod paths;
mod state;

pub use checkpoint::{CheckpointInfo, CheckpointMeta, DEFAULT_RETENTION};
pub use engine::{ChunkEngine, EngineConfig, HealthReport, ENGINE_VERSION};
pub use error::{OpenError, Result, VaultError};
pub use observer::{EngineObserver, NullObserver};
