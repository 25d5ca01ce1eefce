//! Incremental filesystem indexing by adaptive polling.
//!
//! This crate tracks a set of registered directory trees and detects created,
//! modified, and deleted files without OS change notifications. Each call to
//! [`FileIndexer::update_index`] performs one bounded scan iteration:
//!
//! - a generational scheduler selects which directories to re-scan, biased
//!   toward recently volatile directories while guaranteeing bounded progress
//!   for quiescent ones,
//! - the selected scope is enumerated and reconciled into an in-memory tree,
//! - detected changes are published as [`FileRecord`]s to a caller-owned sink,
//! - the next iteration's size is adjusted to keep wall-clock latency near a
//!   configured target.
//!
//! The index is purely in-memory and per process; there is no persistence,
//! content hashing, or OS-level watching.

pub mod cancel;
pub mod config;
pub mod error;
pub mod indexer;
pub mod observer;
pub mod record;
pub mod task;

mod tree;

// Re-export main types
pub use cancel::CancellationToken;
pub use config::{BalancerConfig, ObserverConfig};
pub use error::{IndexError, Result};
pub use indexer::FileIndexer;
pub use observer::FileSystemObserver;
pub use record::{FileRecord, FileState, RecordSink};
pub use task::{IndexTask, UpdateIndexTask};
