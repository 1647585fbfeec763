//! Sync orchestrator: turns a [`ChangeBatch`] into one encrypted commit.
//!
//! Per path, the current disk state decides what happens:
//!   - absent (or stat fails): retire the ledger record(s) and their blobs
//!   - regular file: encrypt name + content, write the blob, replace any
//!     older record for the same original path
//!   - directory: walked, every regular file below it is handled as above
//!     (a renamed or moved-in directory reports only its own path)
//!
//! Per-file failures are logged and skipped; they never abort the batch.
//! After the loop the ledger is saved, then the repository is committed
//! (and pushed when a remote is configured), so every revision holds a
//! ledger that matches its ciphertext.

use gitvault_core::config::GitvaultConfig;
use gitvault_crypto::{encrypt_file_content, encrypt_name, CryptoError, EncryptionKey};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::layout::{remove_if_exists, write_atomic, RepoLayout};
use crate::ledger::{FileMetadataRecord, MetadataLedger};
use crate::scan::files_under;
use crate::status::{now_unix, StatusReporter};
use crate::vcs::{VcsError, VersionControl};
use crate::{ChangeBatch, SyncError, SyncResult};

/// Commit message used when none is configured
pub const DEFAULT_COMMIT_MESSAGE: &str = "Automated encrypted backup";

#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub name: String,
    pub url: String,
    pub branch: String,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Root of the plaintext tree; ledger paths are relative to it
    pub watch_root: PathBuf,
    pub commit_message: String,
    /// Push after each commit when set
    pub remote: Option<RemoteTarget>,
    /// Prefixes never walked when a directory is expanded (the repository)
    pub excluded: Vec<PathBuf>,
}

impl SyncOptions {
    pub fn new(watch_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_root: watch_root.into(),
            commit_message: DEFAULT_COMMIT_MESSAGE.into(),
            remote: None,
            excluded: Vec::new(),
        }
    }

    pub fn from_config(config: &GitvaultConfig) -> Self {
        Self {
            watch_root: config.repo.watch_path.clone(),
            commit_message: config.daemon.commit_message.clone(),
            remote: config.repo.remote_url.as_ref().map(|url| RemoteTarget {
                name: config.repo.remote_name.clone(),
                url: url.clone(),
                branch: config.repo.branch.clone(),
            }),
            excluded: vec![config.repo.path.clone()],
        }
    }
}

/// What one batch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub encrypted: usize,
    pub unchanged: usize,
    /// Ledger records retired because their original disappeared
    pub removed: usize,
    /// Directories, untracked deletions, non-regular files
    pub ignored: usize,
    pub failed: usize,
    /// Revision id of the commit, if one was made
    pub revision: Option<String>,
    pub pushed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Encrypted,
    Unchanged,
    Removed(usize),
    Ignored,
    Failed,
}

pub struct SyncOrchestrator {
    layout: RepoLayout,
    options: SyncOptions,
    key: Arc<EncryptionKey>,
    ledger: Mutex<MetadataLedger>,
    /// Set when the in-memory ledger differs from `.metadata.enc`
    dirty: AtomicBool,
    vcs: Box<dyn VersionControl>,
    status: Arc<StatusReporter>,
    span: tracing::Span,
}

impl SyncOrchestrator {
    pub fn new(
        layout: RepoLayout,
        options: SyncOptions,
        key: Arc<EncryptionKey>,
        ledger: MetadataLedger,
        vcs: Box<dyn VersionControl>,
        status: Arc<StatusReporter>,
    ) -> Self {
        let span = tracing::info_span!(
            "sync",
            repo = %layout.root().display(),
            watch = %options.watch_root.display()
        );
        Self {
            layout,
            options,
            key,
            ledger: Mutex::new(ledger),
            dirty: AtomicBool::new(false),
            vcs,
            status,
            span,
        }
    }

    /// Log every batch inside `span` instead of the default `sync` span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    /// Read access to the in-memory ledger.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&MetadataLedger) -> R) -> R {
        f(&self.lock_ledger())
    }

    /// Process one batch end to end: per-file work, ledger save, commit, push.
    ///
    /// Per-file failures are counted in the report. Ledger-save, commit and
    /// push failures are returned; the caller keeps running either way.
    pub fn process_batch(&self, batch: ChangeBatch) -> SyncResult<BatchReport> {
        let _entered = self.span.enter();
        let paths = self.expand_directories(batch.into_paths());
        let total = paths.len();
        info!(files = total, "processing changes");
        self.status.update(|s| s.files_pending = total);

        let outcomes: Vec<FileOutcome> = paths
            .par_iter()
            .map(|path| {
                let outcome = self.span.in_scope(|| self.process_path(path));
                self.status
                    .update(|s| s.files_pending = s.files_pending.saturating_sub(1));
                outcome
            })
            .collect();

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Encrypted => report.encrypted += 1,
                FileOutcome::Unchanged => report.unchanged += 1,
                FileOutcome::Removed(n) => report.removed += n,
                FileOutcome::Ignored => report.ignored += 1,
                FileOutcome::Failed => report.failed += 1,
            }
        }

        if let Err(e) = self.save_ledger() {
            error!(error = %e, "failed to save ledger, skipping commit");
            self.status.update(|s| s.files_pending = 0);
            return Err(e);
        }

        self.commit(&mut report)?;

        info!(
            encrypted = report.encrypted,
            unchanged = report.unchanged,
            removed = report.removed,
            failed = report.failed,
            revision = report.revision.as_deref().unwrap_or("-"),
            "batch complete"
        );
        Ok(report)
    }

    /// Add every regular file below each directory in `paths`.
    ///
    /// A renamed or moved-in directory only reports its own path, so its
    /// contents are walked here; files already tracked with the same hash
    /// come out as unchanged.
    fn expand_directories(&self, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut expanded = BTreeSet::new();
        for path in paths {
            let is_dir = std::fs::symlink_metadata(&path)
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if is_dir {
                let files = files_under(&path, &self.options.excluded);
                debug!(dir = %path.display(), files = files.len(), "expanding directory");
                expanded.extend(files);
            }
            expanded.insert(path);
        }
        expanded.into_iter().collect()
    }

    fn process_path(&self, path: &Path) -> FileOutcome {
        if path.to_str().is_none() {
            error!(path = %path.display(), "path is not valid UTF-8, cannot track it");
            return FileOutcome::Failed;
        }
        let Some(rel) = relative_key(&self.options.watch_root, path) else {
            debug!(path = %path.display(), "not below the watch root, ignoring");
            return FileOutcome::Ignored;
        };

        match std::fs::metadata(path) {
            Err(_) => match self.remove_tracked(&rel) {
                Ok(0) => {
                    debug!(path = %rel, "deleted path was never tracked");
                    FileOutcome::Ignored
                }
                Ok(n) => FileOutcome::Removed(n),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to remove encrypted copy");
                    FileOutcome::Failed
                }
            },
            Ok(meta) if meta.is_file() => match self.encrypt_file(path, &rel) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to encrypt file");
                    FileOutcome::Failed
                }
            },
            Ok(_) => FileOutcome::Ignored,
        }
    }

    /// Retire every record at or below `rel` and delete their blobs.
    ///
    /// A blob that cannot be deleted keeps its record so the ledger never
    /// forgets a ciphertext that is still on disk.
    fn remove_tracked(&self, rel: &str) -> SyncResult<usize> {
        let removed = self.lock_ledger().remove_under(rel);
        if removed.is_empty() {
            return Ok(0);
        }
        self.dirty.store(true, Ordering::SeqCst);

        let mut retired = 0;
        let mut first_err = None;
        for record in removed {
            let blob_path = self.layout.blob_path(&record.encrypted_name);
            match remove_if_exists(&blob_path) {
                Ok(()) => {
                    info!(path = %record.original_path, "removed encrypted copy");
                    retired += 1;
                }
                Err(source) => {
                    self.lock_ledger().put(record);
                    first_err.get_or_insert(SyncError::Write {
                        path: blob_path,
                        source,
                    });
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(retired),
        }
    }

    fn encrypt_file(&self, path: &Path, rel: &str) -> SyncResult<FileOutcome> {
        let content = std::fs::read(path).map_err(|source| SyncError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let original_hash = blake3::hash(&content).to_hex().to_string();

        let current = self
            .lock_ledger()
            .find_by_original_path(rel)
            .filter(|r| r.original_hash == original_hash)
            .map(|r| r.encrypted_name.clone());
        if let Some(name) = current {
            if self.layout.blob_path(&name).exists() {
                debug!(path = %rel, "content unchanged, skipping");
                return Ok(FileOutcome::Unchanged);
            }
        }

        let encryption_err = |source: CryptoError| SyncError::Encryption {
            path: path.to_path_buf(),
            source,
        };
        let (encrypted_name, _nonce) = encrypt_name(&self.key, rel).map_err(encryption_err)?;
        let blob = encrypt_file_content(&self.key, &content).map_err(encryption_err)?;
        let encrypted_hash = blake3::hash(&blob).to_hex().to_string();

        let encrypted_dir = self.layout.encrypted_dir();
        std::fs::create_dir_all(&encrypted_dir).map_err(|source| SyncError::Write {
            path: encrypted_dir.clone(),
            source,
        })?;
        let blob_path = self.layout.blob_path(&encrypted_name);
        write_atomic(&blob_path, &blob).map_err(|source| SyncError::Write {
            path: blob_path.clone(),
            source,
        })?;

        let record = FileMetadataRecord {
            encrypted_name,
            original_path: rel.to_string(),
            original_hash,
            encrypted_hash,
            last_modified: now_unix(),
            file_size: content.len() as u64,
        };

        let superseded = {
            let mut ledger = self.lock_ledger();
            let superseded = ledger.remove_by_original_path(rel);
            ledger.put(record);
            superseded
        };
        self.dirty.store(true, Ordering::SeqCst);

        if let Some(old) = superseded {
            let old_blob = self.layout.blob_path(&old.encrypted_name);
            if let Err(e) = remove_if_exists(&old_blob) {
                warn!(path = %old_blob.display(), error = %e, "failed to remove superseded blob");
            }
        }

        info!(path = %rel, bytes = content.len(), "file encrypted");
        Ok(FileOutcome::Encrypted)
    }

    fn save_ledger(&self) -> SyncResult<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let ledger = self.lock_ledger();
        if let Err(e) = ledger.save(&self.layout.ledger_path(), &self.key) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        debug!(records = ledger.len(), "ledger saved");
        Ok(())
    }

    fn commit(&self, report: &mut BatchReport) -> SyncResult<()> {
        let repo = self.layout.root();

        match self.vcs.stage_and_commit(repo, &self.options.commit_message) {
            Ok(()) => {}
            Err(VcsError::NothingToCommit) => {
                debug!("nothing to commit");
                self.status.update(|s| s.files_pending = 0);
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "commit failed");
                self.status.update(|s| s.files_pending = 0);
                return Err(SyncError::Commit(e));
            }
        }

        match self.vcs.last_revision_id(repo) {
            Ok(id) => {
                let now = now_unix();
                self.status.update(|s| {
                    s.last_commit_hash = Some(id.clone());
                    s.last_commit_time = Some(now);
                    s.files_pending = 0;
                });
                report.revision = Some(id);
            }
            Err(e) => {
                warn!(error = %e, "committed, but the revision id could not be read");
                self.status.update(|s| s.files_pending = 0);
            }
        }

        let Some(remote) = &self.options.remote else {
            return Ok(());
        };
        match self.vcs.push(repo, &remote.name, &remote.branch) {
            Ok(()) => {
                let now = now_unix();
                self.status.update(|s| {
                    s.last_push_successful = true;
                    s.last_push_time = Some(now);
                });
                report.pushed = true;
                info!(remote = %remote.url, "changes pushed to remote");
                Ok(())
            }
            Err(e) => {
                self.status.update(|s| s.last_push_successful = false);
                error!(remote = %remote.url, error = %e, "failed to push to remote");
                Err(SyncError::Push {
                    remote: remote.name.clone(),
                    source: e,
                })
            }
        }
    }

    fn lock_ledger(&self) -> MutexGuard<'_, MetadataLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `/`-separated path of `path` relative to `root`, or `None` when `path`
/// is not strictly below `root` or is not valid UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
