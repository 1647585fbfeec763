//! Rebuild the plaintext tree from the encrypted repository.

use gitvault_crypto::{decrypt_file_content, EncryptionKey};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

use crate::layout::RepoLayout;
use crate::ledger::{FileMetadataRecord, MetadataLedger};
use crate::{SyncError, SyncResult};

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    /// `(original_path, reason)` for every record that could not be restored
    pub failed: Vec<(String, String)>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Decrypt every ledger record into `dest`, verifying both hashes.
///
/// A bad record is reported and skipped; only failing to create `dest`
/// aborts the restore.
pub fn restore_all(
    layout: &RepoLayout,
    key: &EncryptionKey,
    ledger: &MetadataLedger,
    dest: &Path,
) -> SyncResult<RestoreReport> {
    std::fs::create_dir_all(dest).map_err(|source| SyncError::Write {
        path: dest.to_path_buf(),
        source,
    })?;

    let mut report = RestoreReport::default();
    for record in ledger.records() {
        match restore_one(layout, key, record, dest) {
            Ok(target) => {
                info!(path = %target.display(), "restored");
                report.restored += 1;
            }
            Err(reason) => {
                warn!(path = %record.original_path, %reason, "restore failed");
                report.failed.push((record.original_path.clone(), reason));
            }
        }
    }
    Ok(report)
}

fn restore_one(
    layout: &RepoLayout,
    key: &EncryptionKey,
    record: &FileMetadataRecord,
    dest: &Path,
) -> Result<PathBuf, String> {
    let target = safe_join(dest, &record.original_path)
        .ok_or_else(|| format!("refusing unsafe path {:?}", record.original_path))?;

    let blob_path = layout.blob_path(&record.encrypted_name);
    let blob = std::fs::read(&blob_path).map_err(|e| format!("reading blob: {e}"))?;
    if blake3::hash(&blob).to_hex().as_str() != record.encrypted_hash {
        return Err("ciphertext hash mismatch".into());
    }

    let plaintext = decrypt_file_content(key, &blob).map_err(|e| e.to_string())?;
    if blake3::hash(&plaintext).to_hex().as_str() != record.original_hash {
        return Err("plaintext hash mismatch".into());
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("creating {}: {e}", parent.display()))?;
    }
    std::fs::write(&target, &plaintext).map_err(|e| format!("writing: {e}"))?;
    Ok(target)
}

/// Join a `/`-separated ledger path onto `dest`, rejecting anything that
/// could escape it.
fn safe_join(dest: &Path, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    if rel.as_os_str().is_empty() {
        return None;
    }
    rel.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| dest.join(rel))
}
