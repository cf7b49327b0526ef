use nsmirror::indexer::TreeIndexer;
use nsmirror::namespace::memory::MemoryNamespace;
use nsmirror::processor::EventProcessor;
use nsmirror::InodePath;

use crate::support::{close, disk_usage, p, rename, temp_store};

#[test]
fn index_close_rename_keeps_disk_usage_consistent() {
    let ns = MemoryNamespace::new();
    ns.mkdir("/a").unwrap();
    ns.write_file("/a/f", 100).unwrap();
    let store = temp_store();

    TreeIndexer::new(&ns, &store)
        .index(&InodePath::root())
        .unwrap();
    assert_eq!(disk_usage(&store, "/a"), 100);
    assert_eq!(disk_usage(&store, "/"), 100);

    let processor = EventProcessor::new(store.clone());
    processor.apply(1, 0, &close("/a/f", 150)).unwrap();
    let f = store.get(&p("/a/f")).unwrap().unwrap();
    assert_eq!(f.size, 150);
    assert_eq!(f.disk_usage, 150);
    assert_eq!(disk_usage(&store, "/a"), 150);
    assert_eq!(disk_usage(&store, "/"), 150);

    processor.apply(2, 0, &rename("/a", "/b")).unwrap();
    let moved = store.get(&p("/b/f")).unwrap().unwrap();
    assert_eq!(moved.size, 150);
    assert!(store.get(&p("/a/f")).unwrap().is_none());
    assert!(store.get(&p("/a")).unwrap().is_none());
    assert_eq!(store.get(&p("/b")).unwrap().unwrap().name, "b");
    assert_eq!(disk_usage(&store, "/b"), 150);
    assert_eq!(disk_usage(&store, "/"), 150);
}
