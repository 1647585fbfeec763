//! Change collector: filesystem events → debounced, deduplicated batches.
//!
//! State per watched root: `Idle → Accumulating → (quiescence elapsed) →
//! Draining → Idle`. Every qualifying event inserts its paths into the
//! pending set and pushes the deadline out by one quiescence interval. Only
//! the collector task touches the deadline, so re-arming cannot race with
//! expiry. When the deadline passes untouched, the pending set is swapped
//! out in one lock acquisition and sent on as a [`ChangeBatch`].

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{SyncError, SyncResult};

/// Default quiet period before a batch is released
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_secs(2);

/// Capacity of the notify → collector channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Deduplicated set of changed absolute paths from one quiescence window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    paths: BTreeSet<PathBuf>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths.into_iter().collect()
    }
}

impl FromIterator<PathBuf> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// Pending-path set shared between the collector and status readers.
///
/// The lock is held only for the insert or swap itself.
#[derive(Debug, Clone, Default)]
pub struct PendingPaths {
    inner: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl PendingPaths {
    pub fn insert(&self, path: PathBuf) -> bool {
        self.lock().insert(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Detach everything pending, leaving a fresh empty set behind.
    pub fn take(&self) -> ChangeBatch {
        ChangeBatch {
            paths: std::mem::take(&mut *self.lock()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        // A panic while holding this lock cannot leave the set half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct ChangeCollector {
    pending: PendingPaths,
    quiescence: Duration,
    excluded: Vec<PathBuf>,
}

impl ChangeCollector {
    pub fn new(quiescence: Duration) -> Self {
        Self {
            pending: PendingPaths::default(),
            quiescence,
            excluded: Vec::new(),
        }
    }

    /// Drop events for anything under `prefix` (e.g. the repository itself
    /// when it lives inside the watched tree).
    pub fn exclude(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.excluded.push(prefix.into());
        self
    }

    pub fn pending(&self) -> PendingPaths {
        self.pending.clone()
    }

    /// Record a filesystem event. Returns true if it should (re)arm the timer.
    pub fn record(&self, event: &Event) -> bool {
        if !is_qualifying(&event.kind) {
            return false;
        }
        let mut recorded = false;
        for path in &event.paths {
            if self.excluded.iter().any(|prefix| path.starts_with(prefix)) {
                continue;
            }
            self.pending.insert(path.clone());
            recorded = true;
        }
        recorded
    }

    /// Run until the event channel closes.
    ///
    /// Watcher errors are logged and collection continues. On channel
    /// closure any still-pending paths are flushed as a final batch.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<notify::Result<Event>>,
        batches: mpsc::Sender<ChangeBatch>,
    ) {
        let mut deadline: Option<Instant> = None;

        loop {
            let quiesced = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                received = events.recv() => match received {
                    Some(Ok(event)) => {
                        if self.record(&event) {
                            deadline = Some(Instant::now() + self.quiescence);
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "watcher error"),
                    None => {
                        info!("watcher channel closed, collector stopping");
                        let batch = self.pending.take();
                        if !batch.is_empty() {
                            let _ = batches.send(batch).await;
                        }
                        break;
                    }
                },
                _ = quiesced => {
                    deadline = None;
                    let batch = self.pending.take();
                    if batch.is_empty() {
                        continue;
                    }
                    debug!(paths = batch.len(), "quiescence elapsed, releasing batch");
                    if batches.send(batch).await.is_err() {
                        info!("batch receiver dropped, collector stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Writes, creates, removes and renames count; access and metadata-only
/// changes do not.
fn is_qualifying(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => false,
    }
}

/// Start a recursive watch on `root`, forwarding raw events into a channel.
///
/// The returned watcher must be kept alive for as long as events are wanted.
pub fn watch(
    root: &Path,
) -> SyncResult<(RecommendedWatcher, mpsc::Receiver<notify::Result<Event>>)> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        },
        Config::default(),
    )
    .map_err(|source| SyncError::WatchSetup {
        path: root.to_path_buf(),
        source,
    })?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|source| SyncError::WatchSetup {
            path: root.to_path_buf(),
            source,
        })?;

    info!(root = %root.display(), "watching for changes");
    Ok((watcher, rx))
}
