//! Unit-of-work interface for driving the indexer from a pooled runner.
//!
//! The worker pool itself is an external collaborator; only its contract
//! lives here. A runner repeatedly takes tasks, skips completed ones, and
//! may re-arm a task with [`IndexTask::reset`] to schedule another round.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::indexer::FileIndexer;
use crate::record::RecordSink;

/// A repeatable unit of work for a generic pooled task runner.
pub trait IndexTask: Send + Sync {
    /// Executes the task once. Implementations must not panic; a valid
    /// cancellation token is always supplied.
    fn run(&self, cancel: &CancellationToken);

    /// True once the task has run since its last reset. Runners skip
    /// completed tasks instead of executing them again.
    fn is_complete(&self) -> bool;

    /// Re-arms the task for another execution.
    fn reset(&self);
}

/// An [`IndexTask`] performing one index update iteration per run.
pub struct UpdateIndexTask {
    indexer: Arc<FileIndexer>,
    sink: Arc<dyn RecordSink>,
    complete: AtomicBool,
}

impl UpdateIndexTask {
    pub fn new(indexer: Arc<FileIndexer>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            indexer,
            sink,
            complete: AtomicBool::new(false),
        }
    }
}

impl IndexTask for UpdateIndexTask {
    fn run(&self, cancel: &CancellationToken) {
        if self.is_complete() {
            return;
        }
        self.indexer.update_index(cancel, self.sink.as_ref());
        self.complete.store(true, Ordering::Release);
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.complete.store(false, Ordering::Release);
    }
}
