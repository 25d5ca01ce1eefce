//! The generational scan scheduler.
//!
//! [`FileSystemObserver`] owns the registered roots and three generation
//! queues of directory nodes. Each [`update_index`](FileSystemObserver::update_index)
//! call performs one bounded iteration in four phases:
//!
//! 1. **Scope selection**: pop directories from the generation queues under
//!    a per-generation budget, promoting entries by their rate score.
//! 2. **Scan**: enumerate every scoped directory once, updating the tree.
//!    Newly discovered subdirectories join the scope of the same iteration.
//! 3. **Reconciliation**: publish pending file changes to the sink, reap
//!    dead subtrees, and requeue live directories by age class.
//! 4. **Adaptive resize**: adjust the next iteration's size target toward
//!    the preferred iteration duration.
//!
//! Filesystem errors never escape an iteration: a vanished directory
//! degrades to not-alive, any other enumeration failure is logged and
//! skipped.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::cancel::CancellationToken;
use crate::config::ObserverConfig;
use crate::error::Result;
use crate::record::{FileState, RecordSink};
use crate::tree::{DirHandle, DirNode, FileNode, MAX_RATE};

/// Incremental filesystem index with an adaptive, age-based scan scheduler.
///
/// Root registration and removal may be called from a different thread than
/// the one running `update_index`. Concurrent `update_index` calls are not
/// supported; a second caller is turned away with a warning while an
/// iteration is in flight.
pub struct FileSystemObserver {
    config: ObserverConfig,
    /// Registered root directories, each owning one tree.
    roots: Mutex<HashMap<PathBuf, DirHandle>>,
    /// Generation queues, youngest first.
    generations: [Mutex<VecDeque<DirHandle>>; 3],
    /// Directory budget of the next iteration, adjusted after each pass.
    current_iteration_size: AtomicUsize,
    /// Serializes iterations; `update_index` refuses to run re-entrantly.
    iteration_guard: Mutex<()>,
}

impl FileSystemObserver {
    /// Creates an observer, validating the balancer configuration.
    pub fn new(config: ObserverConfig) -> Result<Self> {
        config.balancer.validate()?;
        let iteration_size = config.balancer.iteration_size;
        Ok(Self {
            config,
            roots: Mutex::new(HashMap::new()),
            generations: [
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
                Mutex::new(VecDeque::new()),
            ],
            current_iteration_size: AtomicUsize::new(iteration_size),
            iteration_guard: Mutex::new(()),
        })
    }

    /// Registers a root directory for indexing.
    ///
    /// No-op if the path is already registered or does not exist on disk.
    /// The new root's rate is preset to the promotion threshold so it is
    /// scanned on the very next iteration.
    pub fn add_root_directory(&self, path: &Path) {
        let Ok(metadata) = fs::metadata(path) else {
            return;
        };
        if !metadata.is_dir() {
            return;
        }

        let mut roots = self.roots.lock();
        if roots.contains_key(path) {
            return;
        }

        let change_time = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let handle = DirNode::new_handle(path.to_path_buf(), change_time, Weak::new());
        handle.lock().rate = MAX_RATE;
        roots.insert(path.to_path_buf(), Arc::clone(&handle));
        self.generations[0].lock().push_back(handle);

        debug!(path = %path.display(), "root directory registered");
    }

    /// Removes a registered root. No-op if the path is not registered.
    ///
    /// The whole subtree is marked dead synchronously; queued entries are
    /// forgotten when next dequeued. Deliberately removed roots do not
    /// publish `Lost` records for their files; only directories discovered
    /// missing during a scan do.
    pub fn remove_root_directory(&self, path: &Path) {
        let Some(root) = self.roots.lock().remove(path) else {
            return;
        };

        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let mut node = handle.lock();
            node.is_alive = false;
            stack.extend(node.children.values().cloned());
        }

        debug!(path = %path.display(), "root directory removed");
    }

    /// Performs one bounded index update iteration.
    ///
    /// Detected changes are appended to `sink` up to the point of
    /// cancellation or completion. No filesystem error escapes this call.
    pub fn update_index(&self, cancel: &CancellationToken, sink: &dyn RecordSink) {
        let Some(_guard) = self.iteration_guard.try_lock() else {
            warn!("update_index called while another iteration is running; skipping");
            return;
        };

        let started = Instant::now();
        let mut scope = self.prepare_scope();
        let files_examined = self.scan_scope(&mut scope, cancel);
        let scan_duration = started.elapsed();

        let published = self.reconcile_scope(&scope, sink);
        self.rebalance(scan_duration);

        debug!(
            duration_ms = scan_duration.as_millis() as u64,
            directories = scope.len(),
            files = files_examined,
            changes = published,
            "index update iteration complete"
        );
    }

    /// The directory budget the next iteration will use. Moves within
    /// `[min_iteration_size, iteration_size]` as the adaptive controller
    /// tracks the preferred iteration duration.
    pub fn current_iteration_size(&self) -> usize {
        self.current_iteration_size.load(Ordering::Relaxed)
    }

    /// Phase (a): selects the directories to scan this iteration.
    ///
    /// Unspent budget cascades into the next generation, so a quiet young
    /// generation enlarges the share of the older ones.
    fn prepare_scope(&self) -> Vec<DirHandle> {
        let iteration_size = self.current_iteration_size() as f64;
        let weight = self.config.balancer.generation_weight;
        let mut scope = Vec::new();

        let mut budget = iteration_size * weight[0];
        budget = self.drain_generation(0, budget, &mut scope);
        budget += iteration_size * weight[1];
        budget = self.drain_generation(1, budget, &mut scope);
        budget += iteration_size * weight[2];
        self.drain_generation(2, budget, &mut scope);

        scope
    }

    /// Pops one generation queue while budget remains.
    ///
    /// Dead entries are dropped silently. Entries at the promotion
    /// threshold consume one budget unit and join the scope; everything
    /// else gains rate and requeues into the same generation without
    /// consuming budget, so repeated passes guarantee eventual promotion.
    fn drain_generation(&self, generation: usize, mut budget: f64, scope: &mut Vec<DirHandle>) -> f64 {
        let now = SystemTime::now();

        loop {
            if budget <= 0.0 {
                break;
            }
            let Some(handle) = self.generations[generation].lock().pop_front() else {
                break;
            };

            let mut node = handle.lock();
            if !node.is_alive {
                trace!(path = %node.path.display(), "forgetting dead directory");
                continue;
            }

            if node.rate >= MAX_RATE {
                budget -= 1.0;
                drop(node);
                scope.push(handle);
            } else {
                let mut bump = i64::from(node.iteration_changes * 2 + 1);
                if generation == 1 {
                    // The middle generation also weighs how many files
                    // changed last pass and how close the directory is to
                    // aging into generation 2.
                    bump += i64::from(node.file_change_count.min(3));
                    bump += age_proximity_term(
                        now,
                        node.change_time,
                        self.config.balancer.first_generation_age,
                        self.config.balancer.second_generation_age,
                    );
                }
                node.rate = (i64::from(node.rate) + bump).clamp(0, i64::from(MAX_RATE)) as u32;
                drop(node);
                self.generations[generation].lock().push_back(handle);
            }
        }

        budget
    }

    /// Phase (b): scans every directory in scope, in order.
    ///
    /// The scope grows while it is being walked: subdirectories discovered
    /// mid-scan are appended and scanned within this same iteration.
    fn scan_scope(&self, scope: &mut Vec<DirHandle>, cancel: &CancellationToken) -> usize {
        let mut files_examined = 0;
        let mut index = 0;
        while index < scope.len() {
            if cancel.is_cancelled() {
                break;
            }
            let handle = Arc::clone(&scope[index]);
            index += 1;
            self.scan_directory(&handle, scope, cancel, &mut files_examined);
        }
        files_examined
    }

    /// Enumerates one directory and folds the results into its node.
    fn scan_directory(
        &self,
        handle: &DirHandle,
        scope: &mut Vec<DirHandle>,
        cancel: &CancellationToken,
        files_examined: &mut usize,
    ) {
        let mut node = handle.lock();
        node.file_change_count = 0;

        let entries = match fs::read_dir(&node.path) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %node.path.display(), "directory vanished, marking dead");
                node.is_alive = false;
                return;
            }
            Err(error) => {
                warn!(path = %node.path.display(), %error, "failed to enumerate directory");
                return;
            }
        };

        let mut cancelled = false;
        for entry in entries {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    trace!(path = %node.path.display(), %error, "skipping unreadable entry");
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(error) => {
                    trace!(path = %entry.path().display(), %error, "skipping entry without metadata");
                    continue;
                }
            };
            let path = entry.path();

            if metadata.is_dir() {
                if let Some(filter) = &self.config.directory_filter {
                    if !filter(&path, &metadata) {
                        continue;
                    }
                }
                if !node.children.contains_key(&path) {
                    let change_time = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    let child =
                        DirNode::new_handle(path.clone(), change_time, Arc::downgrade(handle));
                    node.children.insert(path, Arc::clone(&child));
                    // Scan the discovery within this iteration instead of
                    // waiting for a future generation cycle.
                    scope.push(child);
                }
            } else {
                *files_examined += 1;
                if let Some(filter) = &self.config.file_filter {
                    if !filter(&path, &metadata) {
                        continue;
                    }
                }
                observe_file(&mut node, path, &metadata);
            }
        }

        // The lost-file sweep is only valid after a complete enumeration;
        // a cancelled pass must not mistake unvisited files for deleted ones.
        if !cancelled {
            node.sweep_lost_files();
        }
        node.settle_recency();
    }

    /// Phase (c): publishes pending changes and requeues the scope.
    fn reconcile_scope(&self, scope: &[DirHandle], sink: &dyn RecordSink) -> usize {
        let balancer = &self.config.balancer;
        let now = SystemTime::now();
        let mut published = 0;

        for handle in scope {
            let mut node = handle.lock();
            if !node.is_alive {
                drop(node);
                published += self.reap_dead_directory(handle, sink);
                continue;
            }

            if node.has_file_changes {
                published += publish_changes(&mut node, sink);
            }
            node.has_file_changes = false;

            let generation = classify_generation(
                now,
                node.change_time,
                balancer.first_generation_age,
                balancer.second_generation_age,
            );
            drop(node);
            self.generations[generation].lock().push_back(Arc::clone(handle));
        }

        published
    }

    /// Publishes a `Lost` record for every file anywhere under a dead
    /// directory, marks all descendants dead, and unlinks the directory
    /// from its parent or the root registry. The subtree is then forgotten;
    /// stale queue entries are dropped on dequeue.
    fn reap_dead_directory(&self, handle: &DirHandle, sink: &dyn RecordSink) -> usize {
        let mut published = 0;

        let mut stack = vec![Arc::clone(handle)];
        while let Some(current) = stack.pop() {
            let mut node = current.lock();
            node.is_alive = false;
            stack.extend(node.children.values().cloned());
            for file in node.files.values() {
                sink.push(file.lost_record());
                published += 1;
            }
            // A parent and its descendant can land in the same scope when
            // both vanish at once; clearing after publication keeps every
            // Lost record unique.
            node.files.clear();
        }

        let (parent, path) = {
            let node = handle.lock();
            (node.parent.upgrade(), node.path.clone())
        };
        match parent {
            Some(parent) => {
                parent.lock().children.remove(&path);
            }
            None => {
                self.roots.lock().remove(&path);
            }
        }

        published
    }

    /// Phase (d): proportional controller on the iteration size.
    fn rebalance(&self, measured: Duration) {
        let balancer = &self.config.balancer;
        let current = self.current_iteration_size() as f64;
        let ratio = balancer.prefer_iteration_duration.as_secs_f64() / measured.as_secs_f64();
        // A near-instant iteration drives the ratio to infinity; the
        // saturating cast and clamp absorb it at the configured maximum.
        let next = (ratio * current) as usize;
        let next = next.clamp(balancer.min_iteration_size, balancer.iteration_size);
        self.current_iteration_size.store(next, Ordering::Relaxed);
    }
}

/// Folds one observed file into its directory node: tracks new files,
/// detects size/mtime changes, raises the directory change time, and marks
/// the file as seen for the lost-file sweep.
fn observe_file(node: &mut DirNode, path: PathBuf, metadata: &fs::Metadata) {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let size = metadata.len();
    node.raise_change_time(modified);

    if let Some(file) = node.files.get_mut(&path) {
        file.mark_seen();
        if file.size != size || file.modified != modified {
            file.size = size;
            file.modified = modified;
            file.state = FileState::Changed;
            node.note_file_change();
        }
    } else {
        node.files
            .insert(path.clone(), FileNode::new(path, size, modified));
        node.note_file_change();
    }
}

/// Publishes every pending file change of a live directory.
///
/// `Lost` files are removed after publication; everything else resets to
/// `Unchanged` so it is not re-published next pass.
fn publish_changes(node: &mut DirNode, sink: &dyn RecordSink) -> usize {
    let mut published = 0;
    let mut lost = Vec::new();

    for (path, file) in node.files.iter_mut() {
        if file.state == FileState::Unchanged {
            continue;
        }
        sink.push(file.to_record());
        published += 1;
        if file.state == FileState::Lost {
            lost.push(path.clone());
        } else {
            file.state = FileState::Unchanged;
        }
    }
    for path in &lost {
        node.files.remove(path);
    }

    published
}

/// Classifies a directory into generation 0, 1, or 2 by the age of its last
/// detected change.
fn classify_generation(
    now: SystemTime,
    change_time: SystemTime,
    first_generation_age: Duration,
    second_generation_age: Duration,
) -> usize {
    let age = now.duration_since(change_time).unwrap_or(Duration::ZERO);
    if age <= first_generation_age {
        0
    } else if age <= second_generation_age {
        1
    } else {
        2
    }
}

/// Age-proximity term of the generation-1 rate bump:
/// `1 + (age - first) / ((second - first) / 3)` in signed nanoseconds.
/// Directories closer to crossing into generation 2 age faster toward
/// inclusion; a directory younger than `first` contributes nothing extra.
fn age_proximity_term(
    now: SystemTime,
    change_time: SystemTime,
    first_generation_age: Duration,
    second_generation_age: Duration,
) -> i64 {
    let first = first_generation_age.as_nanos() as i128;
    let second = second_generation_age.as_nanos() as i128;
    let border = (second - first) / 3;
    if border <= 0 {
        return 1;
    }
    let age = now
        .duration_since(change_time)
        .map(|age| age.as_nanos() as i128)
        .unwrap_or(0);
    ((age - first) / border + 1).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
