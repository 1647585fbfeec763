use std::path::PathBuf;

use gitvault_crypto::CryptoError;
use thiserror::Error;

use crate::vcs::VcsError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("salt error: {0}")]
    Salt(#[source] CryptoError),

    #[error("key derivation failed: {0}")]
    KeyDerivation(#[source] CryptoError),

    #[error("ledger {path} is corrupt or was written under a different passphrase: {reason}")]
    LedgerCorruption { path: PathBuf, reason: String },

    #[error("cannot watch {path}: {source}")]
    WatchSetup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encrypting {path}: {source}")]
    Encryption {
        path: PathBuf,
        #[source]
        source: CryptoError,
    },

    #[error("serializing ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("commit failed: {0}")]
    Commit(#[source] VcsError),

    #[error("push to {remote} failed: {source}")]
    Push {
        remote: String,
        #[source]
        source: VcsError,
    },
}

impl SyncError {
    /// Errors that should stop the daemon before it starts watching.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            SyncError::Salt(_)
                | SyncError::KeyDerivation(_)
                | SyncError::LedgerCorruption { .. }
                | SyncError::WatchSetup { .. }
        )
    }
}
