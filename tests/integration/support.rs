use nsmirror::event::{ChangeEvent, CloseEvent, CreateEvent, RenameEvent, UnlinkEvent};
use nsmirror::{InodeKind, InodePath, MetadataStore};
use std::sync::Arc;

pub fn p(raw: &str) -> InodePath {
    InodePath::parse(raw).unwrap()
}

pub fn temp_store() -> Arc<MetadataStore> {
    let db = sled::Config::new().temporary(true).open().unwrap();
    Arc::new(MetadataStore::open(&db, "file_system").unwrap())
}

pub fn disk_usage(store: &MetadataStore, raw: &str) -> u64 {
    store
        .get(&p(raw))
        .unwrap()
        .unwrap_or_else(|| panic!("no record at {}", raw))
        .disk_usage
}

pub fn close(path: &str, size: i64) -> ChangeEvent {
    ChangeEvent::Close(CloseEvent {
        path: path.to_string(),
        file_size: size,
        timestamp: 1_700_000_000_000,
    })
}

pub fn create(path: &str, kind: InodeKind, overwrite: bool) -> ChangeEvent {
    ChangeEvent::Create(CreateEvent {
        path: path.to_string(),
        inode_type: kind,
        ctime: 1_700_000_000_000,
        replication: 1,
        owner: "user".to_string(),
        group: "users".to_string(),
        permission: "rw-r--r--".to_string(),
        symlink_target: None,
        overwrite,
        default_block_size: 0,
    })
}

pub fn rename(src: &str, dst: &str) -> ChangeEvent {
    ChangeEvent::Rename(RenameEvent {
        src_path: src.to_string(),
        dst_path: dst.to_string(),
        timestamp: 1_700_000_000_000,
    })
}

pub fn unlink(path: &str) -> ChangeEvent {
    ChangeEvent::Unlink(UnlinkEvent {
        path: path.to_string(),
        timestamp: 1_700_000_000_000,
    })
}
