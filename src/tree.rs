//! The mutable in-memory index tree.
//!
//! Each registered root owns a tree of [`DirNode`]s. Nodes are held behind
//! `Arc<Mutex<_>>` handles because the generation queues of the scheduler
//! keep references to the same nodes the tree owns; parents are reachable
//! through non-owning `Weak` back-links, so every tree stays cycle-free.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::record::{FileRecord, FileState};

/// Shared handle to a directory node, held by the owning tree and by the
/// generation queues.
pub(crate) type DirHandle = Arc<Mutex<DirNode>>;

/// Non-owning back-link to a parent directory node.
pub(crate) type DirLink = Weak<Mutex<DirNode>>;

/// Promotion score at which a queued directory becomes eligible for the
/// current scan scope.
pub(crate) const MAX_RATE: u32 = 10;

/// Cap of the per-directory recency-of-change counter.
pub(crate) const MAX_ITERATION_CHANGES: u32 = 5;

/// Last known state of one tracked file, owned exclusively by its directory.
#[derive(Debug)]
pub(crate) struct FileNode {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// `Unchanged` means nothing is pending publication.
    pub state: FileState,
    /// Mark-and-sweep flag: set once per scan pass while the underlying file
    /// is still observed, consumed by the lost-file sweep.
    seen: bool,
}

impl FileNode {
    /// Creates a node for a newly discovered file, pending publication as
    /// `New`.
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            state: FileState::New,
            seen: true,
        }
    }

    pub fn mark_seen(&mut self) {
        self.seen = true;
    }

    /// Returns whether the file was observed this pass and resets the flag
    /// for the next one.
    pub fn take_seen(&mut self) -> bool {
        std::mem::replace(&mut self.seen, false)
    }

    /// Snapshots the node's current state for publication.
    pub fn to_record(&self) -> FileRecord {
        FileRecord {
            path: self.path.clone(),
            size: self.size,
            change_time: self.modified,
            state: self.state,
        }
    }

    /// Snapshots the node as `Lost`, regardless of its current state. Used
    /// when a whole directory subtree is reaped.
    pub fn lost_record(&self) -> FileRecord {
        FileRecord {
            state: FileState::Lost,
            ..self.to_record()
        }
    }
}

/// One node of an indexed directory tree.
#[derive(Debug)]
pub(crate) struct DirNode {
    /// Full path of the directory.
    pub path: PathBuf,
    /// Back-link to the parent; dangling for registered roots.
    pub parent: DirLink,
    /// Owned child directories, keyed by full path.
    pub children: HashMap<PathBuf, DirHandle>,
    /// Owned tracked files, keyed by full path.
    pub files: HashMap<PathBuf, FileNode>,
    /// Max last-write time observed among the directory's files. Drives
    /// generation classification.
    pub change_time: SystemTime,
    /// Set whenever any file under this directory changed state this pass.
    pub has_file_changes: bool,
    /// False once the directory is determined missing. Terminal: a dead
    /// directory is never rescanned and death propagates to descendants.
    pub is_alive: bool,
    /// Promotion score 0..=10 gating inclusion into the scan scope.
    pub rate: u32,
    /// Recency-of-change counter 0..=5 over the last scan passes.
    pub iteration_changes: u32,
    /// Files whose state changed in the current pass; reset every pass.
    pub file_change_count: u32,
}

impl DirNode {
    /// Creates a handle for a newly discovered directory.
    ///
    /// New nodes start alive with `has_file_changes` set, so an empty first
    /// reconciliation still clears cleanly, and with rate 0: discovery does
    /// not by itself promote the directory into future scopes.
    pub fn new_handle(path: PathBuf, change_time: SystemTime, parent: DirLink) -> DirHandle {
        Arc::new(Mutex::new(Self {
            path,
            parent,
            children: HashMap::new(),
            files: HashMap::new(),
            change_time,
            has_file_changes: true,
            is_alive: true,
            rate: 0,
            iteration_changes: 0,
            file_change_count: 0,
        }))
    }

    /// Records that one of this directory's files changed state this pass.
    pub fn note_file_change(&mut self) {
        self.has_file_changes = true;
        self.file_change_count += 1;
    }

    /// Raises `change_time` to the given timestamp if it is newer.
    pub fn raise_change_time(&mut self, time: SystemTime) {
        if self.change_time < time {
            self.change_time = time;
        }
    }

    /// Marks every file not seen this pass as `Lost` and resets all seen
    /// flags for the next pass.
    pub fn sweep_lost_files(&mut self) {
        let mut any_lost = false;
        for file in self.files.values_mut() {
            if !file.take_seen() {
                file.state = FileState::Lost;
                any_lost = true;
            }
        }
        if any_lost {
            self.has_file_changes = true;
        }
    }

    /// Updates the bounded recency counter after a scan pass: up (cap 5)
    /// when the pass found file changes, otherwise down toward 0.
    pub fn settle_recency(&mut self) {
        if self.has_file_changes {
            self.iteration_changes = (self.iteration_changes + 1).min(MAX_ITERATION_CHANGES);
        } else {
            self.iteration_changes = self.iteration_changes.saturating_sub(1);
        }
    }
}
