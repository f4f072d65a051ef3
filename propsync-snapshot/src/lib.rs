//! # propsync-snapshot
//!
//! Local mirror of the configuration authority: indexing, rule resolution,
//! properties aggregation, stage summaries and mirror refresh.
//!
//! Call [`resolve`] to turn a [`propsync_core::Rule`] into an ordered
//! [`Bundle`], [`concatenate`] to write it out as one properties document,
//! and [`refresh_summaries`] to rebuild every stage summary in the mirror.

pub mod aggregate;
pub mod error;
pub mod index;
pub mod job;
pub mod properties;
pub mod refresh;
pub mod resolver;
pub mod summary;
pub mod writer;

pub use aggregate::{concatenate, render, split_sources, SourceSection};
pub use error::SnapshotError;
pub use index::{open_index, FlattenedIndex, HierarchicalIndex, SnapshotIndex};
pub use job::{load_mapping, prepare_job, JobReport, PreparedPlan};
pub use refresh::{refresh_mirror, RefreshReport};
pub use resolver::{resolve, resolve_from_remote, Bundle, BundleEntry, RemoteHit, RemoteOptions};
pub use summary::{
    generate_all_stages_summary, install_summaries, refresh_summaries, InstalledSummary,
    SummaryArtifact,
};
pub use writer::{atomic_write, WriteResult};
