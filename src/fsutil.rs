//! Compare-before-write persistence for generated build inputs.
//!
//! Control descriptions and extension headers feed incremental build
//! tooling that keys on timestamps, so they are only replaced when their
//! content actually changes, and the replacement is a rename so a reader
//! never sees a half-written file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{IoContext, Result};

/// Write `content` to `path` unless the file already holds exactly that.
///
/// Returns `true` when the file was (re)written.
pub fn save_file_on_change(path: &Path, content: &[u8]) -> Result<bool> {
    if let Ok(existing) = fs::read(path) {
        if existing == content {
            log::debug!("{} unchanged, not rewriting", path.display());
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    let tmp = staging_path(path);
    fs::write(&tmp, content).at(&tmp)?;
    if let Err(e) = atomic_rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(true)
}

/// Sibling path used to stage a write to `path`. Same directory, so the
/// final rename never crosses a filesystem.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("staged");
    path.with_file_name(format!(".{}", tmp_name(name)))
}

fn tmp_name(prefix: &str) -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{n}-{seq}", std::process::id())
}

pub(crate) fn atomic_rename(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    fs::rename(src, dst).at(dst)
}
