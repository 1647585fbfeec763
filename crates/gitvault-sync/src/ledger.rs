//! Encrypted metadata ledger: opaque on-disk name → original file metadata.
//!
//! The whole table is serialized to JSON and encrypted as a single blob with
//! a fresh nonce on every save, so two saves of identical content never
//! produce identical bytes. Nonces are not stored per record: every blob
//! carries its own nonce prefix.

use gitvault_crypto::{decrypt_buffer, encrypt_buffer, EncryptionKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::layout::write_atomic;
use crate::{SyncError, SyncResult};

/// Ledger format version
pub const LEDGER_VERSION: u32 = 1;

/// Metadata for one tracked original file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadataRecord {
    /// Opaque filename of the ciphertext blob under `.encrypted/`
    pub encrypted_name: String,
    /// Path relative to the watch root, `/`-separated
    pub original_path: String,
    /// BLAKE3 of the plaintext (hex)
    pub original_hash: String,
    /// BLAKE3 of the ciphertext blob (hex)
    pub encrypted_hash: String,
    /// Unix timestamp of the encryption that produced this record
    pub last_modified: u64,
    /// Plaintext size in bytes
    pub file_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataLedger {
    #[serde(default)]
    version: u32,
    /// encrypted_name → record
    records: BTreeMap<String, FileMetadataRecord>,
}

impl MetadataLedger {
    pub fn new() -> Self {
        Self {
            version: LEDGER_VERSION,
            records: BTreeMap::new(),
        }
    }

    /// Load and decrypt the ledger at `path`.
    ///
    /// A missing file yields an empty ledger (first run). A file that fails
    /// authentication or parsing is reported as [`SyncError::LedgerCorruption`];
    /// nothing is ever discarded silently.
    pub fn load(path: &Path, key: &EncryptionKey) -> SyncResult<Self> {
        let blob = match std::fs::read(path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no ledger yet, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(SyncError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let plaintext = decrypt_buffer(key, &blob).map_err(|e| SyncError::LedgerCorruption {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let ledger: MetadataLedger =
            serde_json::from_slice(&plaintext).map_err(|e| SyncError::LedgerCorruption {
                path: path.to_path_buf(),
                reason: format!("malformed ledger: {e}"),
            })?;

        tracing::debug!(path = %path.display(), records = ledger.len(), "ledger loaded");
        Ok(ledger)
    }

    /// Serialize, encrypt with a fresh nonce, and atomically replace `path`.
    pub fn save(&self, path: &Path, key: &EncryptionKey) -> SyncResult<()> {
        let json = serde_json::to_vec(self)?;
        let blob = encrypt_buffer(key, &json).map_err(|source| SyncError::Encryption {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, &blob).map_err(|source| SyncError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Insert or replace a record by its encrypted name.
    ///
    /// Callers must first retire any record sharing the same original path
    /// (see [`MetadataLedger::remove_by_original_path`]).
    pub fn put(&mut self, record: FileMetadataRecord) -> Option<FileMetadataRecord> {
        self.records.insert(record.encrypted_name.clone(), record)
    }

    /// Remove the record tracking `relative_path`, if any.
    pub fn remove_by_original_path(&mut self, relative_path: &str) -> Option<FileMetadataRecord> {
        let name = self
            .records
            .iter()
            .find(|(_, r)| r.original_path == relative_path)
            .map(|(name, _)| name.clone())?;
        self.records.remove(&name)
    }

    /// Remove every record at or below `relative_path` (a file or a directory).
    pub fn remove_under(&mut self, relative_path: &str) -> Vec<FileMetadataRecord> {
        let prefix = format!("{relative_path}/");
        let names: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.original_path == relative_path || r.original_path.starts_with(&prefix))
            .map(|(name, _)| name.clone())
            .collect();
        names
            .iter()
            .filter_map(|name| self.records.remove(name))
            .collect()
    }

    pub fn find_by_original_path(&self, relative_path: &str) -> Option<&FileMetadataRecord> {
        self.records
            .values()
            .find(|r| r.original_path == relative_path)
    }

    pub fn get(&self, encrypted_name: &str) -> Option<&FileMetadataRecord> {
        self.records.get(encrypted_name)
    }

    pub fn records(&self) -> impl Iterator<Item = &FileMetadataRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
