//! End-to-end indexing scenarios against real temporary directory trees.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use filetime::FileTime;
use parking_lot::Mutex;
use tempfile::TempDir;

use fileindex::{
    BalancerConfig, CancellationToken, FileIndexer, FileRecord, FileState, FileSystemObserver,
    ObserverConfig,
};

fn indexer() -> FileIndexer {
    FileIndexer::new(ObserverConfig::default()).unwrap()
}

fn update(indexer: &FileIndexer) -> Vec<FileRecord> {
    let sink = Mutex::new(Vec::new());
    indexer.update_index(&CancellationToken::noop(), &sink);
    sink.into_inner()
}

fn write_file(path: &Path, contents: &[u8]) {
    let mut file = File::create(path).unwrap();
    file.write_all(contents).unwrap();
}

fn bump_mtime(path: &Path, seconds_forward: i64) {
    let metadata = fs::metadata(path).unwrap();
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(
        path,
        FileTime::from_unix_time(mtime.unix_seconds() + seconds_forward, 0),
    )
    .unwrap();
}

fn paths_with_state(records: &[FileRecord], state: FileState) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = records
        .iter()
        .filter(|record| record.state == state)
        .map(|record| record.path.clone())
        .collect();
    paths.sort();
    paths
}

#[test]
fn discovers_new_files_exactly_once() {
    let temp = TempDir::new().unwrap();
    write_file(&temp.path().join("a.txt"), b"alpha");
    write_file(&temp.path().join("b.txt"), b"beta");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());

    let records = update(&indexer);
    assert_eq!(
        paths_with_state(&records, FileState::New),
        vec![temp.path().join("a.txt"), temp.path().join("b.txt")]
    );
    assert_eq!(records.len(), 2);

    // A quiet pass publishes nothing.
    assert!(update(&indexer).is_empty());
}

#[test]
fn detects_content_growth_as_change() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.txt");
    write_file(&path, b"one");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());
    update(&indexer);

    write_file(&path, b"one and then some");
    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, path);
    assert_eq!(records[0].state, FileState::Changed);
    assert_eq!(records[0].size, 17);

    // At most one record per modification window.
    assert!(update(&indexer).is_empty());
}

#[test]
fn detects_mtime_only_change() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.txt");
    write_file(&path, b"stable contents");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());
    update(&indexer);

    bump_mtime(&path, 100);
    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, FileState::Changed);
}

#[test]
fn deleted_file_publishes_lost_once_then_is_forgotten() {
    let temp = TempDir::new().unwrap();
    let doomed = temp.path().join("doomed.txt");
    write_file(&temp.path().join("kept.txt"), b"kept");
    write_file(&doomed, b"doomed");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());
    update(&indexer);

    fs::remove_file(&doomed).unwrap();
    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, doomed);
    assert_eq!(records[0].state, FileState::Lost);

    assert!(update(&indexer).is_empty());

    // The entry was removed from the tree, so a reappearing file is a
    // fresh discovery.
    write_file(&doomed, b"back");
    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, FileState::New);
}

#[test]
fn subtree_deletion_publishes_lost_for_every_contained_file() {
    let temp = TempDir::new().unwrap();
    write_file(&temp.path().join("r.txt"), b"root file");
    let sub = temp.path().join("sub");
    let nested = sub.join("nested");
    fs::create_dir_all(&nested).unwrap();
    write_file(&sub.join("s.txt"), b"sub file");
    write_file(&nested.join("n.txt"), b"nested file");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());
    let records = update(&indexer);
    assert_eq!(paths_with_state(&records, FileState::New).len(), 3);

    fs::remove_dir_all(&sub).unwrap();
    let records = update(&indexer);
    assert_eq!(
        paths_with_state(&records, FileState::Lost),
        vec![nested.join("n.txt"), sub.join("s.txt")]
    );
    assert_eq!(records.len(), 2);

    // The subtree is forgotten; no further records from it.
    assert!(update(&indexer).is_empty());
    assert!(update(&indexer).is_empty());
}

#[test]
fn change_in_nested_directory_is_detected() {
    let temp = TempDir::new().unwrap();
    let sub = temp.path().join("sub");
    fs::create_dir(&sub).unwrap();
    let path = sub.join("s.txt");
    write_file(&path, b"v1");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());
    update(&indexer);

    write_file(&path, b"v2 longer");
    bump_mtime(&path, 10);
    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, path);
    assert_eq!(records[0].state, FileState::Changed);
}

/// The reference scenario: register D containing A and B, observe both as
/// New, observe quiescence, delete B, observe exactly one Lost, then
/// quiescence again.
#[test]
fn register_scan_delete_scenario() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a");
    let b = temp.path().join("b");
    write_file(&a, b"a");
    write_file(&b, b"b");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());

    let first = update(&indexer);
    assert_eq!(paths_with_state(&first, FileState::New), vec![a.clone(), b.clone()]);

    assert!(update(&indexer).is_empty());

    fs::remove_file(&b).unwrap();
    let third = update(&indexer);
    assert_eq!(paths_with_state(&third, FileState::Lost), vec![b]);
    assert_eq!(third.len(), 1);

    assert!(update(&indexer).is_empty());
}

#[test]
fn file_filter_excludes_untracked_files() {
    let temp = TempDir::new().unwrap();
    write_file(&temp.path().join("a.txt"), b"tracked");
    write_file(&temp.path().join("b.log"), b"ignored");

    let config = ObserverConfig::default()
        .with_file_filter(|path, _metadata| path.extension().is_some_and(|ext| ext == "txt"));
    let indexer = FileIndexer::new(config).unwrap();
    indexer.add_scan_directory(temp.path());

    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, temp.path().join("a.txt"));

    // An untracked file disappearing is not a change either.
    fs::remove_file(temp.path().join("b.log")).unwrap();
    assert!(update(&indexer).is_empty());
}

#[test]
fn directory_filter_prunes_whole_subtrees() {
    let temp = TempDir::new().unwrap();
    let keep = temp.path().join("keep");
    let skip = temp.path().join("skip");
    fs::create_dir(&keep).unwrap();
    fs::create_dir(&skip).unwrap();
    write_file(&keep.join("k.txt"), b"kept");
    write_file(&skip.join("s.txt"), b"never seen");

    let config = ObserverConfig::default()
        .with_directory_filter(|path, _metadata| path.file_name().is_some_and(|name| name != "skip"));
    let indexer = FileIndexer::new(config).unwrap();
    indexer.add_scan_directory(temp.path());

    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, keep.join("k.txt"));
    assert!(update(&indexer).is_empty());
}

#[test]
fn removed_root_publishes_no_lost_records() {
    let temp = TempDir::new().unwrap();
    write_file(&temp.path().join("a.txt"), b"a");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());
    assert_eq!(update(&indexer).len(), 1);

    indexer.remove_scan_directory(temp.path());
    // Deliberate removal is silent: no Lost records, no further scans.
    assert!(update(&indexer).is_empty());

    write_file(&temp.path().join("later.txt"), b"unseen");
    assert!(update(&indexer).is_empty());
}

#[test]
fn precancelled_update_publishes_nothing() {
    let temp = TempDir::new().unwrap();
    write_file(&temp.path().join("a.txt"), b"a");

    let indexer = indexer();
    indexer.add_scan_directory(temp.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let sink: Mutex<Vec<FileRecord>> = Mutex::new(Vec::new());
    indexer.update_index(&cancel, &sink);
    assert!(sink.into_inner().is_empty());

    // The directory stayed queued and is picked up by the next
    // uncancelled iteration.
    let records = update(&indexer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, FileState::New);
}

#[test]
fn adaptive_size_converges_within_configured_bounds() {
    let temp = TempDir::new().unwrap();
    write_file(&temp.path().join("a.txt"), b"a");

    // Preferring a nanosecond per iteration forces the controller to
    // shrink to the floor.
    let config = ObserverConfig::new(BalancerConfig {
        iteration_size: 8,
        min_iteration_size: 2,
        prefer_iteration_duration: Duration::from_nanos(1),
        ..Default::default()
    });
    let observer = FileSystemObserver::new(config).unwrap();
    observer.add_root_directory(temp.path());
    assert_eq!(observer.current_iteration_size(), 8);

    let sink: Mutex<Vec<FileRecord>> = Mutex::new(Vec::new());
    observer.update_index(&CancellationToken::noop(), &sink);
    assert_eq!(observer.current_iteration_size(), 2);

    // A generous target keeps the size at the ceiling.
    let config = ObserverConfig::new(BalancerConfig {
        iteration_size: 8,
        min_iteration_size: 2,
        prefer_iteration_duration: Duration::from_secs(3600),
        ..Default::default()
    });
    let observer = FileSystemObserver::new(config).unwrap();
    observer.add_root_directory(temp.path());
    let sink: Mutex<Vec<FileRecord>> = Mutex::new(Vec::new());
    observer.update_index(&CancellationToken::noop(), &sink);
    assert_eq!(observer.current_iteration_size(), 8);
}
