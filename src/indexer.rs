//! Public facade over the filesystem observer.

use std::path::Path;

use crate::cancel::CancellationToken;
use crate::config::ObserverConfig;
use crate::error::Result;
use crate::observer::FileSystemObserver;
use crate::record::RecordSink;

/// Caller-facing entry point for incremental filesystem indexing.
///
/// Holds no state of its own beyond the configured observer. Registration
/// calls may come from any thread; `update_index` calls must be serialized
/// by the caller (a concurrent second call is skipped with a warning).
pub struct FileIndexer {
    observer: FileSystemObserver,
}

impl FileIndexer {
    /// Creates an indexer. Fails fast on invalid balancer configuration.
    pub fn new(config: ObserverConfig) -> Result<Self> {
        Ok(Self {
            observer: FileSystemObserver::new(config)?,
        })
    }

    /// Registers a directory tree for scanning. No-op if already registered
    /// or missing on disk.
    pub fn add_scan_directory(&self, path: impl AsRef<Path>) {
        self.observer.add_root_directory(path.as_ref());
    }

    /// Deregisters a directory tree. No-op if not registered.
    ///
    /// Files under a deliberately removed root are not published as `Lost`;
    /// removal is a statement of disinterest, not a filesystem event.
    pub fn remove_scan_directory(&self, path: impl AsRef<Path>) {
        self.observer.remove_root_directory(path.as_ref());
    }

    /// Performs one bounded index update iteration, appending detected
    /// changes to `sink`. Never fails; filesystem errors degrade the
    /// affected entries and are logged.
    pub fn update_index(&self, cancel: &CancellationToken, sink: &dyn RecordSink) {
        self.observer.update_index(cancel, sink);
    }
}
