//! Startup reconciliation: changes made while the daemon was down.
//!
//! Every regular file under the watch root goes into the batch (the
//! orchestrator skips those whose hash still matches), plus every ledger
//! record whose original no longer exists, so offline deletions are retired.

use std::path::{Path, PathBuf};

use crate::ledger::MetadataLedger;
use crate::{ChangeBatch, SyncError, SyncResult};

pub fn reconcile(
    watch_root: &Path,
    ledger: &MetadataLedger,
    excluded: &[PathBuf],
) -> SyncResult<ChangeBatch> {
    let mut batch = ChangeBatch::new();
    let entries = std::fs::read_dir(watch_root).map_err(|source| SyncError::Read {
        path: watch_root.to_path_buf(),
        source,
    })?;
    collect_files(entries, excluded, &mut batch);

    let mut missing = 0usize;
    for record in ledger.records() {
        let original = watch_root.join(&record.original_path);
        if !original.is_file() && batch.insert(original) {
            missing += 1;
        }
    }

    tracing::info!(
        root = %watch_root.display(),
        files = batch.len() - missing,
        missing,
        "startup scan complete"
    );
    Ok(batch)
}

/// Every regular file below `dir`, skipping `excluded` prefixes.
///
/// An unreadable `dir` yields nothing and is logged.
pub fn files_under(dir: &Path, excluded: &[PathBuf]) -> Vec<PathBuf> {
    let mut batch = ChangeBatch::new();
    match std::fs::read_dir(dir) {
        Ok(entries) => collect_files(entries, excluded, &mut batch),
        Err(e) => tracing::warn!(path = %dir.display(), error = %e, "skipping unreadable directory"),
    }
    batch.into_paths()
}

fn collect_files(entries: std::fs::ReadDir, excluded: &[PathBuf], batch: &mut ChangeBatch) {
    for entry in entries.flatten() {
        let path = entry.path();
        if excluded.iter().any(|prefix| path.starts_with(prefix)) {
            continue;
        }
        // file_type() does not follow symlinks, so linked directories
        // cannot send the walk in circles
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            match std::fs::read_dir(&path) {
                Ok(children) => collect_files(children, excluded, batch),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable directory")
                }
            }
        } else if file_type.is_file() {
            batch.insert(path);
        }
    }
}
