//! Long-running propsync daemons: the mirror sync engine and the database
//! reconciliation loop.

pub mod diff;
pub mod engine;
mod error;
pub mod git;
pub mod history;
pub mod log_rotation;
pub mod pass;
pub mod paths;
pub mod reconcile;
mod runtime;
pub mod tables;

pub use diff::{diff, Change, StructuralDiff};
pub use engine::{format_reason, watch_trigger, EngineState, PassRunner, SyncEngine, SyncTrigger};
pub use error::{DaemonError, ErrorClass};
pub use git::{commit_and_push, CommitOutcome, GitMirror, PushStatus, VersionControl};
pub use history::CommitHistory;
pub use pass::{publish_summaries, MirrorPass, PassReport};
pub use reconcile::{ReconciliationLoop, TableOutcome, TickReport};
pub use runtime::{run_reconcile, run_sync, start_reconcile_blocking, start_sync_blocking};
pub use tables::{load_credentials, DatabaseCredentials, MySqlSource, ReferenceSource};
