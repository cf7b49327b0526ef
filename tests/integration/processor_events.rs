use nsmirror::event::log::EventLog;
use nsmirror::event::{EventBatch, MetadataType, MetadataUpdateEvent, ChangeEvent};
use nsmirror::indexer::TreeIndexer;
use nsmirror::namespace::memory::{MemoryEventStream, MemoryNamespace};
use nsmirror::processor::EventProcessor;
use nsmirror::{InodeKind, InodePath, MetadataStore, MirrorError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::support::{close, create, disk_usage, p, rename, unlink};

/// /            = 350
/// /a           = 300
/// /a/b         = 200   (/a/b/g 120, /a/b/h 80)
/// /a/f         = 100
/// /c           = 50    (/c/x 50)
fn indexed() -> (Arc<MemoryNamespace>, Arc<MetadataStore>, sled::Db) {
    let ns = Arc::new(MemoryNamespace::new());
    ns.mkdir("/a").unwrap();
    ns.mkdir("/a/b").unwrap();
    ns.mkdir("/c").unwrap();
    ns.write_file("/a/f", 100).unwrap();
    ns.write_file("/a/b/g", 120).unwrap();
    ns.write_file("/a/b/h", 80).unwrap();
    ns.write_file("/c/x", 50).unwrap();
    let db = sled::Config::new().temporary(true).open().unwrap();
    let store = Arc::new(MetadataStore::open(&db, "file_system").unwrap());
    TreeIndexer::new(ns.as_ref(), &store)
        .index(&InodePath::root())
        .unwrap();
    (ns, store, db)
}

#[test]
fn unlink_directory_subtracts_aggregate_from_ancestors() {
    let (_ns, store, _db) = indexed();
    let processor = EventProcessor::new(store.clone());
    processor.apply(1, 0, &unlink("/a/b")).unwrap();
    assert!(store.get(&p("/a/b")).unwrap().is_none());
    assert!(store.get(&p("/a/b/g")).unwrap().is_none());
    assert!(store.get(&p("/a/b/h")).unwrap().is_none());
    assert_eq!(disk_usage(&store, "/a"), 100);
    assert_eq!(disk_usage(&store, "/"), 150);
    assert_eq!(disk_usage(&store, "/c"), 50);
}

#[test]
fn close_propagates_to_every_ancestor() {
    let (_ns, store, _db) = indexed();
    let processor = EventProcessor::new(store.clone());
    processor.apply(1, 0, &close("/a/b/g", 20)).unwrap();
    assert_eq!(disk_usage(&store, "/a/b/g"), 20);
    assert_eq!(disk_usage(&store, "/a/b"), 100);
    assert_eq!(disk_usage(&store, "/a"), 200);
    assert_eq!(disk_usage(&store, "/"), 250);
    assert_eq!(disk_usage(&store, "/c"), 50);
}

#[test]
fn create_with_overwrite_replaces_prior_subtree() {
    let (ns, store, _db) = indexed();
    ns.remove(&p("/a/b"));
    ns.write_file("/a/b", 5).unwrap();
    let processor = EventProcessor::new(store.clone()).with_source(ns);
    processor
        .apply(1, 0, &create("/a/b", InodeKind::File, true))
        .unwrap();
    let b = store.get(&p("/a/b")).unwrap().unwrap();
    assert_eq!(b.kind, InodeKind::File);
    assert!(store.get(&p("/a/b/g")).unwrap().is_none());
    assert_eq!(disk_usage(&store, "/a"), 105);
    assert_eq!(disk_usage(&store, "/"), 155);
}

#[test]
fn create_without_overwrite_propagates_difference() {
    let (ns, store, _db) = indexed();
    ns.write_file("/a/f", 130).unwrap();
    let processor = EventProcessor::new(store.clone()).with_source(ns);
    processor
        .apply(1, 0, &create("/a/f", InodeKind::File, false))
        .unwrap();
    assert_eq!(disk_usage(&store, "/a/f"), 130);
    assert_eq!(disk_usage(&store, "/a"), 330);
    assert_eq!(disk_usage(&store, "/"), 380);
}

#[test]
fn rename_onto_existing_destination() {
    let (_ns, store, _db) = indexed();
    let processor = EventProcessor::new(store.clone());
    processor.apply(1, 0, &rename("/a/b", "/c")).unwrap();
    assert!(store.get(&p("/c/x")).unwrap().is_none());
    assert_eq!(disk_usage(&store, "/c"), 200);
    assert_eq!(disk_usage(&store, "/c/g"), 120);
    assert_eq!(disk_usage(&store, "/a"), 100);
    assert_eq!(disk_usage(&store, "/"), 300);
}

#[test]
fn rename_of_unknown_path_is_skipped() {
    let (_ns, store, _db) = indexed();
    let before = store.count().unwrap();
    EventProcessor::new(store.clone())
        .apply(1, 0, &rename("/nope", "/elsewhere"))
        .unwrap();
    assert_eq!(store.count().unwrap(), before);
    assert_eq!(disk_usage(&store, "/"), 350);
}

#[test]
fn metadata_update_on_missing_record_fails() {
    let (_ns, store, _db) = indexed();
    let mut event = MetadataUpdateEvent::new("/a/missing", MetadataType::Perms);
    event.permission = Some("rwx------".to_string());
    let result = EventProcessor::new(store).apply(1, 0, &ChangeEvent::MetadataUpdate(event));
    assert!(matches!(result, Err(MirrorError::MissingRecord(path)) if path == "/a/missing"));
}

#[test]
fn sentinel_values_leave_fields_untouched() {
    let (_ns, store, _db) = indexed();
    let before = store.get(&p("/a/f")).unwrap().unwrap();
    let event = MetadataUpdateEvent::new("/a/f", MetadataType::Times);
    EventProcessor::new(store.clone())
        .apply(1, 0, &ChangeEvent::MetadataUpdate(event))
        .unwrap();
    assert_eq!(store.get(&p("/a/f")).unwrap().unwrap(), before);
}

#[test]
fn temporary_upload_files_are_dropped() {
    let (ns, store, _db) = indexed();
    let before = store.count().unwrap();
    let processor = EventProcessor::new(store.clone()).with_source(ns);
    processor
        .apply(1, 0, &create("/a/upload.bin._COPYING_", InodeKind::File, false))
        .unwrap();
    assert_eq!(store.count().unwrap(), before);
}

#[test]
fn processor_thread_applies_batches_in_order() {
    let (ns, store, db) = indexed();
    let log = Arc::new(EventLog::open(&db, "event_pool").unwrap());
    let (feed, stream) = MemoryEventStream::channel();
    ns.write_file("/c/y", 10).unwrap();
    let handle = EventProcessor::new(store.clone())
        .with_source(ns)
        .with_audit_log(log.clone())
        .start(Box::new(stream))
        .unwrap();

    feed.push(EventBatch::new(
        1,
        vec![
            create("/c/y", InodeKind::File, false),
            close("/c/y", 25),
        ],
    ));
    feed.push(EventBatch::new(2, vec![unlink("/a")]));

    let deadline = Instant::now() + Duration::from_secs(10);
    while log.len() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(25));
    }
    handle.shutdown().unwrap();

    let records = log.records().unwrap();
    let order: Vec<(i64, u32)> = records
        .iter()
        .map(|r| (r.transaction_id, r.sequence))
        .collect();
    assert_eq!(order, vec![(1, 0), (1, 1), (2, 0)]);
    assert_eq!(disk_usage(&store, "/c"), 75);
    assert_eq!(disk_usage(&store, "/"), 75);
    assert!(store.get(&p("/a")).unwrap().is_none());
}
