use nsmirror::event::ChangeEvent;
use nsmirror::indexer::TreeIndexer;
use nsmirror::namespace::local::{LocalEventStream, LocalNamespace};
use nsmirror::namespace::{EventStream, NamespaceSource};
use nsmirror::processor::EventProcessor;
use nsmirror::InodePath;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use crate::support::{disk_usage, p, temp_store};

#[test]
fn indexes_a_local_directory() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src/nested")).unwrap();
    fs::write(temp.path().join("src/lib.rs"), vec![b'x'; 300]).unwrap();
    fs::write(temp.path().join("src/nested/mod.rs"), vec![b'x'; 50]).unwrap();
    fs::write(temp.path().join("README"), vec![b'x'; 7]).unwrap();

    let ns = LocalNamespace::new(temp.path()).unwrap();
    let store = temp_store();
    let (root, stats) = TreeIndexer::new(&ns, &store)
        .index(&InodePath::root())
        .unwrap();

    assert_eq!(root.disk_usage, 357);
    assert_eq!(stats.files, 3);
    assert_eq!(stats.directories, 3);
    assert_eq!(disk_usage(&store, "/src"), 350);
    assert_eq!(disk_usage(&store, "/src/nested"), 50);
    let lib = store.get(&p("/src/lib.rs")).unwrap().unwrap();
    assert_eq!(lib.size, 300);
    assert_eq!(lib.replication_factor, 1);
    assert!(lib.block_size > 0);
}

#[test]
fn indexing_a_file_root_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("plain"), b"data").unwrap();
    let ns = LocalNamespace::new(temp.path()).unwrap();
    let store = temp_store();
    let status = ns.status_of(&p("/plain")).unwrap();
    assert!(!status.is_directory());
    assert!(TreeIndexer::new(&ns, &store).index(&p("/plain")).is_err());
}

#[test]
fn watcher_reports_created_files() {
    let temp = TempDir::new().unwrap();
    let ns = LocalNamespace::new(temp.path()).unwrap();
    let mut stream = match ns.watch() {
        Ok(stream) => stream,
        // watchers are unavailable in some sandboxes
        Err(_) => return,
    };
    fs::write(temp.path().join("new.txt"), b"hello").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        if let Some(batch) = stream.poll().unwrap() {
            assert!(batch.transaction_id >= 1);
            seen.extend(batch.events);
            if seen.iter().any(|e| matches!(e, ChangeEvent::Create(_))) {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(seen
        .iter()
        .any(|e| matches!(e, ChangeEvent::Create(c) if c.path == "/new.txt")));
}

/// Poll until `done` holds for the events seen so far, or five seconds pass.
fn poll_until(
    stream: &mut LocalEventStream,
    done: impl Fn(&[ChangeEvent]) -> bool,
) -> Vec<ChangeEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    while Instant::now() < deadline && !done(&seen) {
        if let Some(batch) = stream.poll().unwrap() {
            seen.extend(batch.events);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    seen
}

fn created(events: &[ChangeEvent], path: &str) -> bool {
    events
        .iter()
        .any(|e| matches!(e, ChangeEvent::Create(c) if c.path == path))
}

/// Watched root next to an unwatched sibling on the same filesystem.
fn watched_pair() -> (TempDir, LocalNamespace, std::path::PathBuf) {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("watched")).unwrap();
    fs::create_dir(temp.path().join("outside")).unwrap();
    let ns = LocalNamespace::new(temp.path().join("watched")).unwrap();
    let outside = temp.path().join("outside");
    (temp, ns, outside)
}

#[test]
fn watcher_reports_moves_into_the_root() {
    let (_temp, ns, outside) = watched_pair();
    fs::write(outside.join("moved.bin"), vec![0u8; 42]).unwrap();
    fs::create_dir_all(outside.join("incoming/deeper")).unwrap();
    fs::write(outside.join("incoming/deeper/inner.txt"), b"abc").unwrap();
    let Ok(mut stream) = ns.watch() else {
        return;
    };

    fs::rename(outside.join("moved.bin"), ns.root().join("moved.bin")).unwrap();
    fs::rename(outside.join("incoming"), ns.root().join("incoming")).unwrap();

    let seen = poll_until(&mut stream, |events| {
        created(events, "/moved.bin") && created(events, "/incoming/deeper/inner.txt")
    });
    assert!(created(&seen, "/moved.bin"), "{:?}", seen);
    assert!(created(&seen, "/incoming"), "{:?}", seen);
    assert!(created(&seen, "/incoming/deeper"), "{:?}", seen);
    assert!(created(&seen, "/incoming/deeper/inner.txt"), "{:?}", seen);
    let position = |path: &str| {
        seen.iter()
            .position(|e| matches!(e, ChangeEvent::Create(c) if c.path == path))
    };
    assert!(position("/incoming") < position("/incoming/deeper/inner.txt"));
}

#[test]
fn watcher_reports_moves_out_of_the_root() {
    let (_temp, ns, outside) = watched_pair();
    fs::write(ns.root().join("leaving.txt"), b"bye").unwrap();
    fs::write(ns.root().join("staying.txt"), b"hi").unwrap();
    let Ok(mut stream) = ns.watch() else {
        return;
    };

    fs::rename(ns.root().join("leaving.txt"), outside.join("leaving.txt")).unwrap();
    fs::rename(ns.root().join("staying.txt"), ns.root().join("renamed.txt")).unwrap();

    let seen = poll_until(&mut stream, |events| {
        events
            .iter()
            .any(|e| matches!(e, ChangeEvent::Unlink(u) if u.path == "/leaving.txt"))
    });
    assert!(
        seen.iter()
            .any(|e| matches!(e, ChangeEvent::Unlink(u) if u.path == "/leaving.txt")),
        "{:?}",
        seen
    );
    assert!(seen.iter().any(|e| matches!(
        e,
        ChangeEvent::Rename(r) if r.src_path == "/staying.txt" && r.dst_path == "/renamed.txt"
    )));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, ChangeEvent::Unlink(u) if u.path == "/staying.txt")));
}

#[test]
fn moved_in_file_counts_towards_root_usage() {
    let (_temp, ns, outside) = watched_pair();
    fs::write(ns.root().join("base.txt"), vec![0u8; 8]).unwrap();
    fs::write(outside.join("moved.bin"), vec![0u8; 42]).unwrap();
    let store = temp_store();
    TreeIndexer::new(&ns, &store)
        .index(&InodePath::root())
        .unwrap();
    assert_eq!(disk_usage(&store, "/"), 8);
    let Ok(mut stream) = ns.watch() else {
        return;
    };
    let processor = EventProcessor::new(store.clone()).with_source(Arc::new(ns.clone()));

    fs::rename(outside.join("moved.bin"), ns.root().join("moved.bin")).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline && store.get(&p("/moved.bin")).unwrap().is_none() {
        if let Some(batch) = stream.poll().unwrap() {
            processor.apply_batch(&batch).unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(disk_usage(&store, "/moved.bin"), 42);
    assert_eq!(disk_usage(&store, "/"), 50);
}
