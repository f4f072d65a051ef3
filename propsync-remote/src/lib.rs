//! # propsync-remote
//!
//! Network side of propsync: the Nacos HTTP client, long-poll watches on a
//! single entry, chat-bot alerts, and in-memory doubles of both seams.

pub mod client;
pub mod error;
pub mod memory;
pub mod notify;
pub mod watcher;

pub use client::NacosClient;
pub use error::NotifyError;
pub use memory::{InMemoryAuthority, Publication, RecordingNotifier};
pub use notify::{DingTalkNotifier, LogNotifier, Notifier};
pub use watcher::{content_md5, entry_md5, ConfigWatcher};
