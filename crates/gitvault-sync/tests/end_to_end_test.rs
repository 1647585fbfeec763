//! Batch processing against a recording VCS: encryption, ledger upkeep,
//! commit/push sequencing and status reporting.

mod common;

use common::Fixture;
use gitvault_crypto::{decrypt_file_content, decrypt_name};
use gitvault_sync::restore::restore_all;
use gitvault_sync::scan::reconcile;
use gitvault_sync::{ChangeBatch, RemoteTarget, SyncError, SyncStatus};
use tokio_test::assert_ok;

fn hex_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[test]
fn new_file_is_encrypted_committed_and_removed() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let notes = fx.write("notes.txt", b"hello");

    let report = assert_ok!(orchestrator.process_batch(ChangeBatch::from_iter([notes.clone()])));
    assert_eq!(report.encrypted, 1);
    assert_eq!(report.revision.as_deref(), Some("rev-1"));

    let blobs = fx.blobs();
    assert_eq!(blobs.len(), 1);
    assert!(!blobs[0].contains("notes"), "name leaks plaintext: {}", blobs[0]);
    assert_eq!(decrypt_name(&fx.key, &blobs[0]).unwrap(), "notes.txt");

    let blob = std::fs::read(fx.layout.blob_path(&blobs[0])).unwrap();
    assert_eq!(decrypt_file_content(&fx.key, &blob).unwrap(), b"hello");

    let ledger = fx.ledger_on_disk();
    let record = ledger.find_by_original_path("notes.txt").unwrap();
    assert_eq!(record.encrypted_name, blobs[0]);
    assert_eq!(record.original_hash, hex_hash(b"hello"));
    assert_eq!(record.encrypted_hash, hex_hash(&blob));
    assert_eq!(record.file_size, 5);

    std::fs::remove_file(&notes).unwrap();
    let report = assert_ok!(orchestrator.process_batch(ChangeBatch::from_iter([notes])));
    assert_eq!(report.removed, 1);
    assert!(fx.blobs().is_empty());
    assert!(fx.ledger_on_disk().is_empty());
    assert_eq!(fx.vcs.commits().len(), 2);
}

#[test]
fn modified_file_replaces_its_record() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let path = fx.write("draft.md", b"v1");

    orchestrator.process_batch(ChangeBatch::from_iter([path.clone()])).unwrap();
    let first = fx.blobs();

    fx.write("draft.md", b"v2 with more words");
    orchestrator.process_batch(ChangeBatch::from_iter([path])).unwrap();

    let blobs = fx.blobs();
    assert_eq!(blobs.len(), 1, "superseded blob must be deleted");
    assert_ne!(blobs, first);

    let ledger = fx.ledger_on_disk();
    assert_eq!(ledger.len(), 1);
    let record = ledger.find_by_original_path("draft.md").unwrap();
    assert_eq!(record.original_hash, hex_hash(b"v2 with more words"));

    let blob = std::fs::read(fx.layout.blob_path(&blobs[0])).unwrap();
    assert_eq!(decrypt_file_content(&fx.key, &blob).unwrap(), b"v2 with more words");
}

#[test]
fn unchanged_file_makes_no_commit() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let path = fx.write("same.txt", b"steady");

    orchestrator.process_batch(ChangeBatch::from_iter([path.clone()])).unwrap();
    let ledger_bytes = std::fs::read(fx.layout.ledger_path()).unwrap();

    let report = orchestrator.process_batch(ChangeBatch::from_iter([path])).unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.revision, None);
    assert_eq!(fx.vcs.commits().len(), 1);
    assert_eq!(std::fs::read(fx.layout.ledger_path()).unwrap(), ledger_bytes);
}

#[test]
fn deleting_untracked_path_is_a_no_op() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();

    let report = orchestrator
        .process_batch(ChangeBatch::from_iter([fx.watch.join("never-seen.txt")]))
        .unwrap();
    assert_eq!(report.ignored, 1);
    assert_eq!(report.removed, 0);
    assert!(fx.vcs.commits().is_empty());
    assert!(!fx.layout.ledger_path().exists());
}

#[test]
fn deleted_directory_retires_its_files() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let a = fx.write("sub/a.txt", b"a");
    let b = fx.write("sub/deeper/b.txt", b"b");
    let sub = fx.watch.join("sub");

    let report = orchestrator
        .process_batch(ChangeBatch::from_iter([sub.clone(), a, b]))
        .unwrap();
    assert_eq!(report.encrypted, 2);
    assert_eq!(report.ignored, 1);

    std::fs::remove_dir_all(&sub).unwrap();
    let report = orchestrator.process_batch(ChangeBatch::from_iter([sub])).unwrap();
    assert_eq!(report.removed, 2);
    assert!(fx.blobs().is_empty());
    assert!(fx.ledger_on_disk().is_empty());
}

#[test]
fn renamed_directory_keeps_its_files_backed_up() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let batch = ChangeBatch::from_iter([fx.write("docs/a.md", b"alpha"), fx.write("docs/b.md", b"beta")]);
    orchestrator.process_batch(batch).unwrap();

    // A directory rename reports only the two directory paths
    let docs = fx.watch.join("docs");
    let archive = fx.watch.join("archive");
    std::fs::rename(&docs, &archive).unwrap();
    let report = orchestrator
        .process_batch(ChangeBatch::from_iter([docs, archive]))
        .unwrap();
    assert_eq!(report.removed, 2);
    assert_eq!(report.encrypted, 2);

    let ledger = fx.ledger_on_disk();
    let mut paths: Vec<&str> = ledger.records().map(|r| r.original_path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["archive/a.md", "archive/b.md"]);
    assert_eq!(fx.blobs().len(), 2);

    let dest = fx.tmp.path().join("restored");
    let restored = restore_all(&fx.layout, &fx.key, &ledger, &dest).unwrap();
    assert!(restored.is_complete());
    assert_eq!(std::fs::read(dest.join("archive/b.md")).unwrap(), b"beta");
}

#[test]
fn moved_in_directory_is_encrypted() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let outside = fx.tmp.path().join("outside");
    std::fs::create_dir_all(outside.join("nested")).unwrap();
    std::fs::write(outside.join("top.txt"), b"1").unwrap();
    std::fs::write(outside.join("nested/deep.txt"), b"2").unwrap();

    let incoming = fx.watch.join("incoming");
    std::fs::rename(&outside, &incoming).unwrap();
    let report = orchestrator
        .process_batch(ChangeBatch::from_iter([incoming]))
        .unwrap();
    assert_eq!(report.encrypted, 2);
    assert!(fx.ledger_on_disk().find_by_original_path("incoming/nested/deep.txt").is_some());
}

#[test]
fn directory_event_for_tracked_files_is_unchanged() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let a = fx.write("keep/a.txt", b"a");
    orchestrator.process_batch(ChangeBatch::from_iter([a])).unwrap();

    let report = orchestrator
        .process_batch(ChangeBatch::from_iter([fx.watch.join("keep")]))
        .unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.revision, None);
}

#[cfg(unix)]
#[test]
fn non_utf8_names_fail_instead_of_colliding() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let first = fx.watch.join(OsStr::from_bytes(b"f\xff.txt"));
    let second = fx.watch.join(OsStr::from_bytes(b"f\xfe.txt"));
    std::fs::write(&first, b"one").unwrap();
    std::fs::write(&second, b"two").unwrap();
    let ok = fx.write("fine.txt", b"three");

    let report = orchestrator
        .process_batch(ChangeBatch::from_iter([first, second, ok]))
        .unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.encrypted, 1);

    let ledger = fx.ledger_on_disk();
    assert_eq!(ledger.len(), 1);
    assert!(ledger.find_by_original_path("fine.txt").is_some());
    assert_eq!(fx.blobs().len(), 1);
}

#[test]
fn files_in_one_batch_are_all_processed() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let batch: ChangeBatch = (0..25)
        .map(|i| fx.write(&format!("bulk/file-{i}.txt"), format!("content {i}").as_bytes()))
        .collect();

    let report = orchestrator.process_batch(batch).unwrap();
    assert_eq!(report.encrypted, 25);
    assert_eq!(fx.blobs().len(), 25);
    assert_eq!(fx.ledger_on_disk().len(), 25);
    assert_eq!(fx.vcs.commits().len(), 1, "one commit per batch");
}

#[test]
fn per_file_failure_does_not_abort_batch() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    // A regular file where the blob directory should be makes every write fail
    std::fs::write(fx.layout.encrypted_dir(), b"in the way").unwrap();
    let a = fx.write("a.txt", b"a");
    let b = fx.write("b.txt", b"b");

    let report = orchestrator.process_batch(ChangeBatch::from_iter([a, b])).unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.encrypted, 0);
    assert!(fx.ledger_on_disk().is_empty());
}

#[test]
fn commit_failure_is_surfaced() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    fx.vcs.fail_commits(true);
    let path = fx.write("notes.txt", b"hello");

    let err = orchestrator.process_batch(ChangeBatch::from_iter([path])).unwrap_err();
    assert!(matches!(err, SyncError::Commit(_)));

    // Encrypted state is on disk and will be picked up by the next commit
    assert_eq!(fx.blobs().len(), 1);
    assert_eq!(fx.ledger_on_disk().len(), 1);
    let status = fx.status.snapshot();
    assert_eq!(status.files_pending, 0);
    assert_eq!(status.last_commit_hash, None);

    fx.vcs.fail_commits(false);
    let other = fx.write("other.txt", b"x");
    let report = orchestrator.process_batch(ChangeBatch::from_iter([other])).unwrap();
    assert!(report.revision.is_some());
}

#[test]
fn push_failure_keeps_commit() {
    let fx = Fixture::new();
    let mut options = fx.options();
    options.remote = Some(RemoteTarget {
        name: "origin".into(),
        url: "git@example.invalid:vault.git".into(),
        branch: "main".into(),
    });
    let orchestrator = fx.orchestrator_with(options);
    fx.vcs.fail_pushes(true);
    let path = fx.write("notes.txt", b"hello");

    let err = orchestrator.process_batch(ChangeBatch::from_iter([path])).unwrap_err();
    assert!(matches!(err, SyncError::Push { .. }));
    assert_eq!(fx.vcs.commits().len(), 1);

    let status = fx.status.snapshot();
    assert_eq!(status.last_commit_hash.as_deref(), Some("rev-1"));
    assert!(!status.last_push_successful);
    assert_eq!(status.last_push_time, None);

    fx.vcs.fail_pushes(false);
    let next = fx.write("next.txt", b"again");
    let report = orchestrator.process_batch(ChangeBatch::from_iter([next])).unwrap();
    assert!(report.pushed);
    assert_eq!(fx.vcs.pushes(), vec![("origin".to_string(), "main".to_string())]);

    let status = fx.status.snapshot();
    assert!(status.last_push_successful);
    assert!(status.last_push_time.is_some());
}

#[test]
fn status_file_tracks_last_commit() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let path = fx.write("notes.txt", b"hello");

    let report = orchestrator.process_batch(ChangeBatch::from_iter([path])).unwrap();

    let on_disk = SyncStatus::load(&fx.layout.status_path()).unwrap();
    assert_eq!(on_disk.last_commit_hash, report.revision);
    assert!(on_disk.last_commit_time.is_some());
    assert_eq!(on_disk.files_pending, 0);
    assert!(!on_disk.last_push_successful, "no remote configured");
}

#[test]
fn restore_recreates_tree() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let files: &[(&str, &[u8])] = &[
        ("notes.txt", b"hello"),
        ("docs/plan.md", b"# plan\n- step one\n"),
        ("docs/img/empty.bin", b""),
    ];
    let batch: ChangeBatch = files.iter().map(|(rel, data)| fx.write(rel, data)).collect();
    orchestrator.process_batch(batch).unwrap();

    let dest = fx.tmp.path().join("restored");
    let report = restore_all(&fx.layout, &fx.key, &fx.ledger_on_disk(), &dest).unwrap();
    assert!(report.is_complete(), "failures: {:?}", report.failed);
    assert_eq!(report.restored, 3);
    for (rel, data) in files {
        assert_eq!(std::fs::read(dest.join(rel)).unwrap(), *data, "{rel}");
    }
}

#[test]
fn restore_reports_tampered_blob() {
    let fx = Fixture::new();
    let orchestrator = fx.orchestrator();
    let batch = ChangeBatch::from_iter([fx.write("good.txt", b"good"), fx.write("bad.txt", b"bad")]);
    orchestrator.process_batch(batch).unwrap();

    let ledger = fx.ledger_on_disk();
    let bad = ledger.find_by_original_path("bad.txt").unwrap();
    let blob_path = fx.layout.blob_path(&bad.encrypted_name);
    let mut blob = std::fs::read(&blob_path).unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    std::fs::write(&blob_path, blob).unwrap();

    let dest = fx.tmp.path().join("restored");
    let report = restore_all(&fx.layout, &fx.key, &ledger, &dest).unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bad.txt");
    assert!(!dest.join("bad.txt").exists());
}

#[test]
fn startup_scan_catches_offline_changes() {
    let fx = Fixture::new();
    {
        let orchestrator = fx.orchestrator();
        let batch = ChangeBatch::from_iter([fx.write("kept.txt", b"1"), fx.write("doomed.txt", b"2")]);
        orchestrator.process_batch(batch).unwrap();
    }

    // Daemon is down: one file deleted, one edited, one created
    std::fs::remove_file(fx.watch.join("doomed.txt")).unwrap();
    fx.write("kept.txt", b"1 edited");
    fx.write("fresh/new.txt", b"3");

    let orchestrator = fx.orchestrator();
    let batch = orchestrator
        .with_ledger(|ledger| reconcile(&fx.watch, ledger, &[fx.layout.root().to_path_buf()]))
        .unwrap();
    assert_eq!(batch.len(), 3);

    let report = orchestrator.process_batch(batch).unwrap();
    assert_eq!(report.encrypted, 2);
    assert_eq!(report.removed, 1);

    let ledger = fx.ledger_on_disk();
    let mut paths: Vec<&str> = ledger.records().map(|r| r.original_path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec!["fresh/new.txt", "kept.txt"]);
    assert_eq!(fx.blobs().len(), 2);
}
