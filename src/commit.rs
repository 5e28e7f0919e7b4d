//! Atomic chunk commit
//!
//! One chunk, one durable swap:
//!
//! 1. Serialize the value to a pretty-printed JSON document.
//! 2. Write it to `chunks/<name>.tmp`, flush, fsync.
//! 3. Read the temp file back and re-parse it (integrity check).
//! 4. Copy the current primary, if any, to `chunks_bak/<name>.bak`.
//! 5. Rename the temp over the primary (atomic on POSIX).
//!
//! A crash at any point leaves a valid primary behind: before step 5 the
//! old value is untouched, and the stray `.tmp` is swept on the next
//! attach. There is no multi-chunk transaction; each chunk commits
//! independently, so a crash mid-batch can leave one chunk ahead of
//! another.

use std::fs::{self, File};
use std::io::Write;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};

use crate::error::{Result, VaultError};
use crate::paths::ProjectLayout;

/// Encode a chunk document the way readers expect it back: UTF-8 JSON
/// with 4-space indentation.
pub(crate) fn encode_document(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| VaultError::Serialization(format!("could not encode document: {}", e)))?;
    String::from_utf8(buf).map_err(|e| VaultError::Serialization(e.to_string()))
}

/// Parse a document previously produced by [`encode_document`].
pub(crate) fn decode_document(text: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| VaultError::Integrity(format!("document does not parse: {}", e)))
}

/// Commit one chunk. The primary is replaced only by the final rename;
/// every earlier failure leaves it untouched.
pub(crate) fn commit_chunk(layout: &ProjectLayout, name: &str, value: &Value) -> Result<()> {
    let document = encode_document(value)?;

    let temp = layout.chunk_temp(name);
    let primary = layout.chunk_primary(name);

    // Temp write, pushed through to hardware before anything moves.
    let mut file = File::create(&temp)?;
    file.write_all(document.as_bytes())?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    // Read-back verify. On failure the temp stays behind for diagnostics;
    // the next attach sweeps it.
    let written = fs::read_to_string(&temp)?;
    if let Err(e) = serde_json::from_str::<Value>(&written) {
        return Err(VaultError::Integrity(format!(
            "chunk '{}' failed read-back verification: {}",
            name, e
        )));
    }

    // Rotate the previous primary into the backup slot.
    if primary.exists() {
        fs::copy(&primary, layout.chunk_backup(name))?;
    }

    // Same-directory rename: atomic replace on POSIX, MoveFileEx-backed
    // on Windows.
    fs::rename(&temp, &primary)?;
    Ok(())
}
