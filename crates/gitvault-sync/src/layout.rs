//! On-disk layout of an encrypted repository
//!
//! ```text
//! <repo>/.salt           plaintext, 16 bytes
//! <repo>/.metadata.enc   encrypted ledger blob
//! <repo>/.encrypted/     one encrypted blob per tracked file, flat
//! <repo>/.status.json    plaintext status snapshot (not committed)
//! ```

use gitvault_crypto::{derive_key, load_or_create_salt, EncryptionKey};
use secrecy::SecretString;
use std::path::{Path, PathBuf};

use crate::{SyncError, SyncResult};

pub const SALT_FILE: &str = ".salt";
pub const LEDGER_FILE: &str = ".metadata.enc";
pub const ENCRYPTED_DIR: &str = ".encrypted";
pub const STATUS_FILE: &str = ".status.json";

/// Entries written to `<repo>/.gitignore` on init
pub const GITIGNORE: &str = ".status.json\n*.tmp\n";

#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn salt_path(&self) -> PathBuf {
        self.root.join(SALT_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn encrypted_dir(&self) -> PathBuf {
        self.root.join(ENCRYPTED_DIR)
    }

    /// Location of the ciphertext blob for an opaque name.
    pub fn blob_path(&self, encrypted_name: &str) -> PathBuf {
        self.encrypted_dir().join(encrypted_name)
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    pub fn gitignore_path(&self) -> PathBuf {
        self.root.join(".gitignore")
    }

    /// Derive the repository key from `passphrase` and the repository salt,
    /// creating the salt on first use.
    ///
    /// Blocks for the duration of the KDF; call from a blocking context.
    pub fn unlock(&self, passphrase: &SecretString) -> SyncResult<EncryptionKey> {
        let salt = load_or_create_salt(&self.salt_path()).map_err(SyncError::Salt)?;
        derive_key(passphrase, &salt).map_err(SyncError::KeyDerivation)
    }
}

/// Atomic write: write to a sibling temp file, then rename over `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)
}

/// Remove a file, treating "already absent" as success.
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
