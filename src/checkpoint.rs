//! Point-in-time checkpoint archives
//!
//! A checkpoint is a ZIP archive of every primary chunk document plus a
//! `checkpoint_meta.json` member describing it. Archives live under the
//! project's `checkpoints/` directory as
//! `cp_<label>_<YYYYMMDD_HHMMSS>.zip`; retention keeps the newest N and
//! unlinks the rest oldest-first. Restore is destructive: it wipes the
//! live chunk directories and unpacks the archive in their place.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use serde::{Deserialize, Serialize};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, VaultError};
use crate::paths::ProjectLayout;

/// How many archives a project keeps unless the caller overrides it
pub const DEFAULT_RETENTION: usize = 10;

/// Longest label fragment embedded in an archive filename
const LABEL_MAX_LEN: usize = 30;

/// Metadata member embedded in each archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub timestamp: String,
    pub label: String,
    pub notes: String,
    pub engine_ver: String,
}

/// Listing entry for one readable archive
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointInfo {
    pub filename: String,
    pub label: String,
    pub date: String,
    pub notes: String,
}

/// Keep word characters, hyphens and underscores; everything else becomes
/// `_`. Truncated to 30 characters.
pub(crate) fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(LABEL_MAX_LEN)
        .collect()
}

/// Archive every primary under `chunks/` plus a metadata member, then
/// apply retention. Returns the archive filename. The caller is expected
/// to have flushed the staging buffer first so the archive captures a
/// committed state.
pub(crate) fn create(
    layout: &ProjectLayout,
    label: &str,
    notes: &str,
    retention: usize,
    engine_ver: &str,
) -> Result<String> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let zip_name = format!("cp_{}_{}.zip", sanitize_label(label), timestamp);
    let zip_path = layout.checkpoint_dir.join(&zip_name);

    let file = File::create(&zip_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in layout.primary_files() {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        writer
            .start_file(format!("chunks/{}", file_name), options)
            .map_err(|e| VaultError::Checkpoint(e.to_string()))?;
        let mut src = File::open(&path)?;
        io::copy(&mut src, &mut writer)?;
    }

    let meta = CheckpointMeta {
        timestamp,
        label: label.to_string(),
        notes: notes.to_string(),
        engine_ver: engine_ver.to_string(),
    };
    writer
        .start_file("checkpoint_meta.json", options)
        .map_err(|e| VaultError::Checkpoint(e.to_string()))?;
    writer.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;
    writer
        .finish()
        .map_err(|e| VaultError::Checkpoint(e.to_string()))?;

    prune(layout, retention);
    Ok(zip_name)
}

/// Unlink the oldest archives until at most `retention` remain. Ordered by
/// modification time; ties fall back to the filename, whose embedded
/// timestamp keeps the order chronological. Best-effort: a failed unlink
/// never fails the checkpoint that triggered it.
fn prune(layout: &ProjectLayout, retention: usize) {
    let mut archives: Vec<(SystemTime, PathBuf)> = layout
        .checkpoint_files()
        .into_iter()
        .map(|path| {
            let mtime = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (mtime, path)
        })
        .collect();
    archives.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    while archives.len() > retention {
        let (_, oldest) = archives.remove(0);
        match fs::remove_file(&oldest) {
            Ok(()) => log::info!("retention: removed old checkpoint {:?}", oldest),
            Err(e) => log::warn!("retention: could not remove {:?}: {}", oldest, e),
        }
    }
}

/// Restore the project from an archive. The caller must hold the engine
/// mutex with the staging buffer already cleared, and must have checked
/// that the archive exists; every live chunk and backup file is deleted
/// before extraction, so the primaries afterwards are exactly the
/// archive's `chunks/` members. Backups repopulate on the next commit.
pub(crate) fn restore(layout: &ProjectLayout, zip_name: &str) -> Result<()> {
    let zip_path = layout.checkpoint_dir.join(zip_name);
    let file = File::open(&zip_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| VaultError::Checkpoint(e.to_string()))?;

    // Wipe live state only once the archive has opened cleanly.
    clear_dir_files(&layout.chunks_dir)?;
    clear_dir_files(&layout.backup_dir)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| VaultError::Checkpoint(e.to_string()))?;
        let rel = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                log::warn!("skipping archive member with unsafe path: {}", entry.name());
                continue;
            }
        };
        let dest = layout.project_dir.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Metadata for every readable archive, newest first. Archives whose
/// metadata cannot be read are silently skipped.
pub(crate) fn list(layout: &ProjectLayout) -> Vec<CheckpointInfo> {
    let mut entries = Vec::new();
    for path in layout.checkpoint_files() {
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        match read_meta(&path) {
            Ok(meta) => entries.push(CheckpointInfo {
                filename,
                label: meta.label,
                date: meta.timestamp,
                notes: meta.notes,
            }),
            Err(e) => log::debug!("skipping unreadable checkpoint {:?}: {}", path, e),
        }
    }
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    entries
}

fn read_meta(path: &Path) -> Result<CheckpointMeta> {
    let file = File::open(path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| VaultError::Checkpoint(e.to_string()))?;
    let mut member = archive
        .by_name("checkpoint_meta.json")
        .map_err(|e| VaultError::Checkpoint(e.to_string()))?;
    let mut body = String::new();
    member.read_to_string(&mut body)?;
    serde_json::from_str(&body).map_err(|e| VaultError::Checkpoint(e.to_string()))
}

fn clear_dir_files(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
