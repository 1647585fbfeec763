//! Daemon lifecycle: unlock, reconcile, watch, shut down cleanly

use anyhow::{Context, Result};
use gitvault_core::config::GitvaultConfig;
use gitvault_sync::collector::watch;
use gitvault_sync::scan::reconcile;
use gitvault_sync::{
    ChangeBatch, ChangeCollector, GitBackend, MetadataLedger, RepoLayout, StatusReporter,
    SyncOptions, SyncOrchestrator, SyncResult, SyncStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Batches released by the collector but not yet processed
const BATCH_CHANNEL_CAPACITY: usize = 16;

/// How long shutdown waits for the final flush
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub async fn run(config: GitvaultConfig) -> Result<()> {
    config.validate()?;
    let passphrase = gitvault_core::passphrase::obtain(&config, "gitvault passphrase: ")?;

    // ── Repository ───────────────────────────────────────────────────────
    std::fs::create_dir_all(&config.repo.path)
        .with_context(|| format!("creating repository {}", config.repo.path.display()))?;
    let repo_root = config.repo.path.canonicalize()?;
    let layout = RepoLayout::new(&repo_root);

    let git = GitBackend::new();
    git.init_repo(&repo_root, &config.repo.branch)
        .context("initializing repository")?;
    if let Some(url) = &config.repo.remote_url {
        git.ensure_remote(&repo_root, &config.repo.remote_name, url)
            .context("configuring remote")?;
    }

    // ── Key + ledger ─────────────────────────────────────────────────────
    let unlock_layout = layout.clone();
    let key = tokio::task::spawn_blocking(move || unlock_layout.unlock(&passphrase))
        .await
        .context("key derivation task")??;
    let key = Arc::new(key);
    info!("encryption key derived");

    let ledger = MetadataLedger::load(&layout.ledger_path(), &key)
        .context("loading ledger (check the passphrase)")?;
    info!(records = ledger.len(), "ledger loaded");

    // ── Watcher ──────────────────────────────────────────────────────────
    let watch_root = config
        .repo
        .watch_path
        .canonicalize()
        .with_context(|| format!("watch path {}", config.repo.watch_path.display()))?;
    let (watcher, events) = watch(&watch_root)?;

    let status = Arc::new(StatusReporter::new(layout.status_path()));
    let previous = SyncStatus::load(&layout.status_path()).unwrap_or_default();
    status.update(|s| {
        *s = previous;
        s.watcher_running = true;
        s.files_pending = 0;
    });

    let options = SyncOptions {
        watch_root: watch_root.clone(),
        excluded: vec![repo_root.clone()],
        ..SyncOptions::from_config(&config)
    };
    let span = tracing::info_span!(
        "sync",
        repo = %repo_root.display(),
        remote = options.remote.as_ref().map(|r| r.name.as_str()).unwrap_or("-"),
    );
    let orchestrator = Arc::new(
        SyncOrchestrator::new(layout, options, key, ledger, Box::new(git), status.clone())
            .with_span(span),
    );

    let (batch_tx, mut batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
    let collector = ChangeCollector::new(Duration::from_millis(config.daemon.quiescence_ms))
        .exclude(repo_root.clone());
    let collector_task = tokio::spawn(collector.run(events, batch_tx.clone()));

    if config.daemon.scan_on_start {
        match startup_scan(&orchestrator).await? {
            Ok(batch) => {
                if !batch.is_empty() && batch_tx.send(batch).await.is_err() {
                    warn!("collector stopped before the startup scan was queued");
                }
            }
            Err(e) if e.is_fatal_at_startup() => {
                return Err(e).context("startup scan");
            }
            Err(e) => warn!(error = %e, "startup scan failed, relying on live events"),
        }
    }
    drop(batch_tx);

    // ── Main loop ────────────────────────────────────────────────────────
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    info!(
        watch = %watch_root.display(),
        repo = %repo_root.display(),
        "gitvaultd ready"
    );

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
                break;
            }
            batch = batch_rx.recv() => match batch {
                Some(batch) => process(&orchestrator, batch).await,
                None => {
                    warn!("change collector stopped");
                    break;
                }
            },
        }
    }

    // Dropping the watcher closes the event channel; the collector then
    // flushes what is pending and exits, closing the batch channel.
    drop(watcher);
    let drain = async {
        while let Some(batch) = batch_rx.recv().await {
            process(&orchestrator, batch).await;
        }
        let _ = collector_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("shutdown grace period elapsed, pending changes left for the next start");
    }

    status.update(|s| {
        s.watcher_running = false;
        s.files_pending = 0;
    });
    info!("gitvaultd stopped");
    Ok(())
}

/// Walk the watch root off the runtime, against a snapshot of the ledger so
/// the lock is not held for the walk.
async fn startup_scan(orchestrator: &Arc<SyncOrchestrator>) -> Result<SyncResult<ChangeBatch>> {
    let orchestrator = orchestrator.clone();
    tokio::task::spawn_blocking(move || {
        let ledger = orchestrator.with_ledger(MetadataLedger::clone);
        let options = orchestrator.options();
        reconcile(&options.watch_root, &ledger, &options.excluded)
    })
    .await
    .context("startup scan task")
}

async fn process(orchestrator: &Arc<SyncOrchestrator>, batch: ChangeBatch) {
    let orchestrator = orchestrator.clone();
    match tokio::task::spawn_blocking(move || orchestrator.process_batch(batch)).await {
        Ok(Ok(report)) => debug!(?report, "batch processed"),
        Ok(Err(e)) => warn!(error = %e, "batch did not complete"),
        Err(e) => error!(error = %e, "batch worker panicked"),
    }
}
