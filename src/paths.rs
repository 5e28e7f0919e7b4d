//! On-disk layout of a project directory
//!
//! ```text
//! <root>/<project_id>/
//! ├── .lock                      # "PID: <n>"
//! ├── version.json               # engine version + attach stamp
//! ├── chunks/
//! │   ├── <name>.json            # primary documents
//! │   └── <name>.tmp             # in-progress writes, swept on attach
//! ├── chunks_bak/
//! │   └── <name>.bak             # previous committed values
//! └── checkpoints/
//!     └── cp_<label>_<YYYYMMDD_HHMMSS>.zip
//! ```
//!
//! Every path is derived mechanically from the root directory and the
//! project id; nothing here touches file contents.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};

/// Resolved paths for one project directory
#[derive(Debug, Clone)]
pub(crate) struct ProjectLayout {
    pub project_dir: PathBuf,
    pub chunks_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub lock_file: PathBuf,
    pub version_file: PathBuf,
}

impl ProjectLayout {
    pub fn new(base_dir: &Path, project_id: &str) -> Self {
        let project_dir = base_dir.join(project_id);
        Self {
            chunks_dir: project_dir.join("chunks"),
            backup_dir: project_dir.join("chunks_bak"),
            checkpoint_dir: project_dir.join("checkpoints"),
            lock_file: project_dir.join(".lock"),
            version_file: project_dir.join("version.json"),
            project_dir,
        }
    }

    /// Create the directory tree. Failure here is fatal for construction.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.chunks_dir, &self.backup_dir, &self.checkpoint_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn chunk_primary(&self, name: &str) -> PathBuf {
        self.chunks_dir.join(format!("{}.json", name))
    }

    pub fn chunk_backup(&self, name: &str) -> PathBuf {
        self.backup_dir.join(format!("{}.bak", name))
    }

    pub fn chunk_temp(&self, name: &str) -> PathBuf {
        self.chunks_dir.join(format!("{}.tmp", name))
    }

    /// Remove temp files left behind by a crashed commit. Returns how many
    /// were swept.
    pub fn sweep_stale_temps(&self) -> usize {
        let mut swept = 0;
        for path in list_by_extension(&self.chunks_dir, "tmp") {
            match fs::remove_file(&path) {
                Ok(()) => swept += 1,
                Err(e) => log::warn!("could not remove stale temp {:?}: {}", path, e),
            }
        }
        swept
    }

    /// All committed primary documents
    pub fn primary_files(&self) -> Vec<PathBuf> {
        list_by_extension(&self.chunks_dir, "json")
    }

    /// All checkpoint archives
    pub fn checkpoint_files(&self) -> Vec<PathBuf> {
        list_by_extension(&self.checkpoint_dir, "zip")
    }
}

/// Reject names that cannot form a single path component. Accepted names
/// are used as-is; the engine never mangles them.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidName("name cannot be empty".into()));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(VaultError::InvalidName(format!(
            "invalid name '{}': contains forbidden characters",
            name
        )));
    }
    if name.len() > 255 {
        return Err(VaultError::InvalidName("name too long".into()));
    }
    Ok(())
}

fn list_by_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |e| e == ext) {
                files.push(path);
            }
        }
    }
    files
}
