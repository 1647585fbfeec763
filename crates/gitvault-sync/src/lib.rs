//! gitvault-sync: the change-propagation pipeline
//!
//! ```text
//! notify events ─▶ ChangeCollector (debounced) ─▶ ChangeBatch
//!   ─▶ SyncOrchestrator { encrypt names + contents, MetadataLedger }
//!   ─▶ VersionControl commit / push ─▶ StatusReporter (.status.json)
//! ```

pub mod collector;
pub mod error;
pub mod layout;
pub mod ledger;
pub mod orchestrator;
pub mod restore;
pub mod scan;
pub mod status;
pub mod vcs;

pub use collector::{ChangeBatch, ChangeCollector, PendingPaths};
pub use error::{SyncError, SyncResult};
pub use layout::RepoLayout;
pub use ledger::{FileMetadataRecord, MetadataLedger};
pub use orchestrator::{BatchReport, RemoteTarget, SyncOptions, SyncOrchestrator};
pub use status::{StatusReporter, SyncStatus};
pub use vcs::{GitBackend, VcsError, VersionControl};
