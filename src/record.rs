//! Published change records and the caller-owned output sink.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use parking_lot::Mutex;

/// The detected state of a tracked file.
///
/// `Unchanged` is internal bookkeeping; published records only ever carry
/// `New`, `Changed`, or `Lost`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileState {
    /// No unpublished change pending.
    Unchanged,
    /// The file was discovered for the first time.
    New,
    /// The file's size or modification time changed since it was last seen.
    Changed,
    /// The file is confirmed no longer present on disk. Terminal.
    Lost,
}

/// A point-in-time snapshot of one file's indexed state.
///
/// Records are immutable copies published to consumers; they hold no link
/// back to the index tree.
#[derive(Clone, Debug)]
pub struct FileRecord {
    /// Full path of the file.
    pub path: PathBuf,
    /// Size in bytes at the time of the snapshot.
    pub size: u64,
    /// Last-write timestamp at the time of the snapshot.
    pub change_time: SystemTime,
    /// The detected change.
    pub state: FileState,
}

/// A thread-safe, append-only destination for published records.
///
/// The sink is owned by the caller; the observer only appends to it, up to
/// the point of cancellation or completion.
pub trait RecordSink: Send + Sync {
    fn push(&self, record: FileRecord);
}

impl RecordSink for Mutex<Vec<FileRecord>> {
    fn push(&self, record: FileRecord) {
        self.lock().push(record);
    }
}

impl RecordSink for Sender<FileRecord> {
    /// Sends the record to the channel. A disconnected receiver drops the
    /// record silently; the observer never fails on sink errors.
    fn push(&self, record: FileRecord) {
        let _ = self.send(record);
    }
}
