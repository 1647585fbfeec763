//! Shared fixtures for gitvault-sync integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gitvault_crypto::{EncryptionKey, KEY_SIZE};
use gitvault_sync::{
    MetadataLedger, RepoLayout, StatusReporter, SyncOptions, SyncOrchestrator, VcsError,
    VersionControl,
};

/// In-memory [`VersionControl`] that records every call.
///
/// Commits snapshot the repository tree (minus `.status.json`), so staging
/// an unchanged tree reports `NothingToCommit` like git does.
#[derive(Clone, Default)]
pub struct RecordingVcs {
    inner: Arc<Mutex<VcsState>>,
}

#[derive(Default)]
struct VcsState {
    commits: Vec<String>,
    pushes: Vec<(String, String)>,
    last_tree: Option<BTreeMap<String, Vec<u8>>>,
    fail_commit: bool,
    fail_push: bool,
}

impl RecordingVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> Vec<String> {
        self.state().commits.clone()
    }

    pub fn pushes(&self) -> Vec<(String, String)> {
        self.state().pushes.clone()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.state().fail_commit = fail;
    }

    pub fn fail_pushes(&self, fail: bool) {
        self.state().fail_push = fail;
    }

    fn state(&self) -> std::sync::MutexGuard<'_, VcsState> {
        self.inner.lock().unwrap()
    }
}

impl VersionControl for RecordingVcs {
    fn stage_and_commit(&self, repo: &Path, message: &str) -> Result<(), VcsError> {
        let mut state = self.state();
        if state.fail_commit {
            return Err(VcsError::Backend {
                command: "commit".into(),
                message: "simulated commit failure".into(),
            });
        }
        let tree = snapshot_tree(repo);
        if state.last_tree.as_ref() == Some(&tree) {
            return Err(VcsError::NothingToCommit);
        }
        state.last_tree = Some(tree);
        state.commits.push(message.to_string());
        Ok(())
    }

    fn push(&self, _repo: &Path, remote: &str, branch: &str) -> Result<(), VcsError> {
        let mut state = self.state();
        if state.fail_push {
            return Err(VcsError::Backend {
                command: "push".into(),
                message: "simulated network failure".into(),
            });
        }
        state.pushes.push((remote.to_string(), branch.to_string()));
        Ok(())
    }

    fn last_revision_id(&self, _repo: &Path) -> Result<String, VcsError> {
        Ok(format!("rev-{}", self.state().commits.len()))
    }
}

fn snapshot_tree(repo: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else if path.file_name().is_some_and(|n| n != ".status.json") {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                out.insert(rel, std::fs::read(&path).unwrap_or_default());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(repo, repo, &mut out);
    out
}

pub fn test_key() -> Arc<EncryptionKey> {
    Arc::new(EncryptionKey::from_bytes([7u8; KEY_SIZE]))
}

/// A watch directory and a separate repository directory in one tempdir.
pub struct Fixture {
    pub tmp: tempfile::TempDir,
    pub watch: PathBuf,
    pub layout: RepoLayout,
    pub key: Arc<EncryptionKey>,
    pub vcs: RecordingVcs,
    pub status: Arc<StatusReporter>,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let watch = tmp.path().join("watch");
        let repo = tmp.path().join("repo");
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::create_dir_all(&repo).unwrap();
        let layout = RepoLayout::new(&repo);
        let status = Arc::new(StatusReporter::new(layout.status_path()));
        Self {
            tmp,
            watch,
            layout,
            key: test_key(),
            vcs: RecordingVcs::new(),
            status,
        }
    }

    pub fn options(&self) -> SyncOptions {
        SyncOptions::new(&self.watch)
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        self.orchestrator_with(self.options())
    }

    pub fn orchestrator_with(&self, options: SyncOptions) -> SyncOrchestrator {
        let ledger = MetadataLedger::load(&self.layout.ledger_path(), &self.key).unwrap();
        SyncOrchestrator::new(
            self.layout.clone(),
            options,
            self.key.clone(),
            ledger,
            Box::new(self.vcs.clone()),
            self.status.clone(),
        )
    }

    /// Write `content` to `rel` under the watch root, creating parents.
    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.watch.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// File names currently under `.encrypted/`.
    pub fn blobs(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.layout.encrypted_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn ledger_on_disk(&self) -> MetadataLedger {
        MetadataLedger::load(&self.layout.ledger_path(), &self.key).unwrap()
    }
}
