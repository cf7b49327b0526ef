use nsmirror::indexer::TreeIndexer;
use nsmirror::namespace::memory::MemoryNamespace;
use nsmirror::{InodePath, MetadataStore};
use proptest::prelude::*;

use crate::support::temp_store;

/// Every directory's disk usage equals the sum over its direct children.
fn assert_aggregated(store: &MetadataStore, dir: &InodePath) -> u64 {
    let record = store.get(dir).unwrap().unwrap();
    if !record.is_directory() {
        return record.disk_usage;
    }
    let total: u64 = store
        .children(dir)
        .unwrap()
        .iter()
        .map(|child| assert_aggregated(store, &child.path))
        .sum();
    assert_eq!(record.disk_usage, total, "at {}", dir);
    total
}

fn build(entries: &[(Vec<u8>, u64)]) -> MemoryNamespace {
    let ns = MemoryNamespace::new();
    for (segments, size) in entries {
        // every prefix becomes a directory, the last segment a file
        let mut path = InodePath::root();
        for (depth, segment) in segments.iter().enumerate() {
            path = path.child(&format!("d{}", segment)).unwrap();
            if depth + 1 < segments.len() {
                ns.insert(nsmirror::namespace::FileStatus::directory(path.clone()));
            }
        }
        let file = path.parent().unwrap().child(&format!("f{}", size)).unwrap();
        ns.insert(nsmirror::namespace::FileStatus::file(file, *size));
    }
    ns
}

#[test]
fn empty_namespace_has_zero_usage() {
    let ns = MemoryNamespace::new();
    let store = temp_store();
    let (root, stats) = TreeIndexer::new(&ns, &store)
        .index(&InodePath::root())
        .unwrap();
    assert_eq!(root.disk_usage, 0);
    assert_eq!(stats.directories, 1);
    assert_eq!(store.count().unwrap(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn directories_sum_their_children(
        entries in prop::collection::vec(
            (prop::collection::vec(0u8..3, 1..4), 0u64..10_000),
            0..12,
        )
    ) {
        let ns = build(&entries);
        let store = temp_store();
        let (root, _) = TreeIndexer::new(&ns, &store)
            .index(&InodePath::root())
            .unwrap();
        let total = assert_aggregated(&store, &InodePath::root());
        prop_assert_eq!(root.disk_usage, total);
        prop_assert_eq!(store.count().unwrap(), ns.len() as u64);
    }
}
