//! Plaintext status snapshot for external inspection (`.status.json`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::layout::write_atomic;
use crate::{SyncError, SyncResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub watcher_running: bool,
    pub files_pending: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_hash: Option<String>,
    /// Unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_time: Option<u64>,
    pub last_push_successful: bool,
    /// Unix timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_push_time: Option<u64>,
}

impl SyncStatus {
    pub fn load(path: &Path) -> SyncResult<Self> {
        let content = std::fs::read(path).map_err(|source| SyncError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}

/// Owns the live [`SyncStatus`] and rewrites the snapshot after every change.
///
/// Write failures are logged, never propagated: the snapshot is informational.
#[derive(Debug)]
pub struct StatusReporter {
    path: PathBuf,
    state: Mutex<SyncStatus>,
}

impl StatusReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(SyncStatus::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.lock().clone()
    }

    /// Apply `f` to the live status and persist the result.
    pub fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut state = self.lock();
        f(&mut state);
        if let Err(e) = self.persist(&state) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write status file");
        }
    }

    fn persist(&self, status: &SyncStatus) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(status)?;
        write_atomic(&self.path, &json).map_err(|source| SyncError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncStatus> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Current time as Unix seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
