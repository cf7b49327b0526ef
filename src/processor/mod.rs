//! Event Processor
//!
//! Applies change events to the mirror, one at a time and in arrival order. Each
//! kind maps to one store mutation followed by disk-usage propagation to the
//! ancestors of the affected path.

pub mod runtime;

pub use runtime::ProcessorHandle;

use crate::error::{MirrorError, NamespaceError, Result};
use crate::event::log::EventLog;
use crate::event::{
    ChangeEvent, CloseEvent, CreateEvent, EventBatch, MetadataUpdateEvent, RenameEvent,
    TransactionId, UnlinkEvent,
};
use crate::inode::Inode;
use crate::namespace::{FileStatus, NamespaceSource, DEFAULT_BLOCK_SIZE};
use crate::path::InodePath;
use crate::store::update::InodeUpdate;
use crate::store::MetadataStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Suffix of files still being copied into the namespace.
pub const DEFAULT_TEMPORARY_SUFFIX: &str = "._COPYING_";

pub const MIN_POLL_INTERVAL_MS: u64 = 250;
pub const MAX_POLL_INTERVAL_MS: u64 = 500;

pub struct EventProcessor {
    store: Arc<MetadataStore>,
    source: Option<Arc<dyn NamespaceSource>>,
    audit: Option<Arc<EventLog>>,
    temporary_suffix: String,
    poll_interval: Duration,
}

impl EventProcessor {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self {
            store,
            source: None,
            audit: None,
            temporary_suffix: DEFAULT_TEMPORARY_SUFFIX.to_string(),
            poll_interval: Duration::from_millis(MIN_POLL_INTERVAL_MS),
        }
    }

    /// Resolve CREATE events against the live namespace instead of their payload.
    pub fn with_source(mut self, source: Arc<dyn NamespaceSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Persist every event to `log` before applying it.
    pub fn with_audit_log(mut self, log: Arc<EventLog>) -> Self {
        self.audit = Some(log);
        self
    }

    pub fn with_temporary_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temporary_suffix = suffix.into();
        self
    }

    /// Base polling interval, clamped to 250..=500 ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let ms = (interval.as_millis() as u64).clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS);
        self.poll_interval = Duration::from_millis(ms);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Apply every event in `batch` in order, stopping at the first failure.
    pub fn apply_batch(&self, batch: &EventBatch) -> Result<()> {
        debug!(
            transaction_id = batch.transaction_id,
            events = batch.events.len(),
            "Applying batch"
        );
        for (sequence, event) in batch.events.iter().enumerate() {
            self.apply(batch.transaction_id, sequence as u32, event)?;
        }
        Ok(())
    }

    pub fn apply(
        &self,
        transaction_id: TransactionId,
        sequence: u32,
        event: &ChangeEvent,
    ) -> Result<()> {
        let start = Instant::now();
        if let Some(log) = &self.audit {
            log.record(transaction_id, sequence, event)?;
        }
        info!(
            transaction_id,
            kind = %event.kind(),
            path = event.path(),
            "Processing event"
        );
        match event {
            ChangeEvent::Append(e) => {
                trace!(path = %e.path, new_block = e.new_block, "Append observed");
            }
            ChangeEvent::Close(e) => self.on_close(e)?,
            ChangeEvent::Create(e) => self.on_create(e)?,
            ChangeEvent::MetadataUpdate(e) => self.on_metadata_update(e)?,
            ChangeEvent::Rename(e) => self.on_rename(e)?,
            ChangeEvent::Unlink(e) => self.on_unlink(e)?,
        }
        debug!(
            transaction_id,
            sequence,
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "Event applied"
        );
        Ok(())
    }

    fn existing(&self, path: &InodePath) -> Result<Inode> {
        self.store
            .get(path)?
            .ok_or_else(|| MirrorError::MissingRecord(path.to_string()))
    }

    fn on_close(&self, event: &CloseEvent) -> Result<()> {
        let path = InodePath::parse(&event.path)?;
        let record = self.existing(&path)?;
        let new_size = event.file_size.max(0);
        let delta = new_size - record.disk_usage as i64;
        let update = InodeUpdate::new()
            .file_size(new_size)
            .mtime(event.timestamp)
            .disk_usage(new_size as u64);
        self.store.update(&path, &update)?;
        self.store.adjust_ancestors(&path, delta)
    }

    fn on_create(&self, event: &CreateEvent) -> Result<()> {
        let path = InodePath::parse(&event.path)?;
        let Some(status) = self.resolve_status(&path, event)? else {
            return Ok(());
        };

        if event.overwrite {
            if let Some(prior) = self.store.get(&path)? {
                self.store.delete(&path)?;
                self.store
                    .adjust_ancestors(&path, -(prior.disk_usage as i64))?;
            }
        }

        let mut inode = Inode::from_status(&status);
        let previous = self.store.get(&path)?;
        if let Some(previous) = &previous {
            inode.id = previous.id;
            // a directory keeps its children, and with them its aggregated usage
            if previous.is_directory() && inode.is_directory() {
                inode.disk_usage = previous.disk_usage;
            }
        }
        let delta = inode.disk_usage as i64 - previous.map_or(0, |p| p.disk_usage as i64);
        self.store.upsert(&inode)?;
        self.store.adjust_ancestors(&path, delta)
    }

    /// Current status for a created path; `None` when the event should be dropped.
    fn resolve_status(&self, path: &InodePath, event: &CreateEvent) -> Result<Option<FileStatus>> {
        let Some(source) = &self.source else {
            return Ok(Some(status_from_payload(path.clone(), event)));
        };
        match source.status_of(path) {
            Ok(status) => Ok(Some(status)),
            Err(NamespaceError::NotFound(_)) => {
                if event.path.ends_with(&self.temporary_suffix) {
                    trace!(path = %path, "Temporary file vanished before create was applied");
                } else {
                    warn!(path = %path, "Created path no longer exists, skipping");
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn on_metadata_update(&self, event: &MetadataUpdateEvent) -> Result<()> {
        let path = InodePath::parse(&event.path)?;
        self.existing(&path)?;
        let update = InodeUpdate::new()
            .atime(event.atime)
            .mtime(event.mtime)
            .replication(event.replication)
            .owner(event.owner.clone())
            .group(event.group.clone())
            .permission(event.permission.clone());
        if !self.store.update(&path, &update)? {
            debug!(path = %path, metadata_type = ?event.metadata_type, "Metadata not mirrored");
        }
        Ok(())
    }

    fn on_rename(&self, event: &RenameEvent) -> Result<()> {
        let src = InodePath::parse(&event.src_path)?;
        let dst = InodePath::parse(&event.dst_path)?;
        if src == dst {
            return Ok(());
        }
        if src.has_prefix(&dst) || dst.has_prefix(&src) {
            return Err(MirrorError::InvalidPath {
                path: event.dst_path.clone(),
                reason: format!("cannot rename {} onto its own ancestor or descendant", src),
            });
        }
        let Some(record) = self.store.get(&src)? else {
            warn!(src = %src, dst = %dst, "Rename source not in mirror, skipping");
            return Ok(());
        };
        if let Some(replaced) = self.store.get(&dst)? {
            self.store.delete(&dst)?;
            self.store
                .adjust_ancestors(&dst, -(replaced.disk_usage as i64))?;
        }
        let usage = record.disk_usage as i64;
        self.store.adjust_ancestors(&src, -usage)?;
        self.store.rename(&src, &dst)?;
        self.store.adjust_ancestors(&dst, usage)
    }

    fn on_unlink(&self, event: &UnlinkEvent) -> Result<()> {
        let path = InodePath::parse(&event.path)?;
        let Some(record) = self.store.get(&path)? else {
            warn!(path = %path, "Unlinked path not in mirror, skipping");
            return Ok(());
        };
        self.store.delete(&path)?;
        self.store
            .adjust_ancestors(&path, -(record.disk_usage as i64))
    }
}

fn status_from_payload(path: InodePath, event: &CreateEvent) -> FileStatus {
    FileStatus {
        path,
        kind: event.inode_type,
        size: 0,
        block_size: if event.default_block_size > 0 {
            event.default_block_size as u64
        } else {
            DEFAULT_BLOCK_SIZE
        },
        replication: event.replication.clamp(1, i32::from(u16::MAX)) as u16,
        owner: event.owner.clone(),
        group: event.group.clone(),
        permission: event.permission.clone(),
        modification_time: event.ctime,
        access_time: event.ctime,
        symlink_target: event.symlink_target.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AppendEvent, MetadataType};
    use crate::inode::InodeKind;
    use crate::namespace::memory::MemoryNamespace;

    fn p(raw: &str) -> InodePath {
        InodePath::parse(raw).unwrap()
    }

    fn store() -> Arc<MetadataStore> {
        let db = sled::Config::new().temporary(true).open().unwrap();
        Arc::new(MetadataStore::open(&db, "file_system").unwrap())
    }

    fn seed(store: &MetadataStore) {
        let mut root = Inode::from_status(&FileStatus::directory(InodePath::root()));
        root.disk_usage = 100;
        let mut a = Inode::from_status(&FileStatus::directory(p("/a")));
        a.disk_usage = 100;
        let f = Inode::from_status(&FileStatus::file(p("/a/f"), 100));
        store.insert_many(&[root, a, f]).unwrap();
    }

    fn du(store: &MetadataStore, raw: &str) -> u64 {
        store.get(&p(raw)).unwrap().unwrap().disk_usage
    }

    fn create(path: &str, kind: InodeKind) -> ChangeEvent {
        ChangeEvent::Create(CreateEvent {
            path: path.to_string(),
            inode_type: kind,
            ctime: 1_000,
            replication: 3,
            owner: "hdfs".to_string(),
            group: "supergroup".to_string(),
            permission: "rw-r--r--".to_string(),
            symlink_target: None,
            overwrite: false,
            default_block_size: 0,
        })
    }

    #[test]
    fn test_close_propagates_delta() {
        let store = store();
        seed(&store);
        let processor = EventProcessor::new(store.clone());
        processor
            .apply(
                1,
                0,
                &ChangeEvent::Close(CloseEvent {
                    path: "/a/f".to_string(),
                    file_size: 40,
                    timestamp: 5,
                }),
            )
            .unwrap();
        let f = store.get(&p("/a/f")).unwrap().unwrap();
        assert_eq!((f.size, f.disk_usage, f.modification_time), (40, 40, 5));
        assert_eq!(du(&store, "/a"), 40);
        assert_eq!(du(&store, "/"), 40);
    }

    #[test]
    fn test_close_on_missing_record() {
        let processor = EventProcessor::new(store());
        let result = processor.apply(
            1,
            0,
            &ChangeEvent::Close(CloseEvent {
                path: "/nope".to_string(),
                file_size: 1,
                timestamp: 1,
            }),
        );
        assert!(matches!(result, Err(MirrorError::MissingRecord(_))));
    }

    #[test]
    fn test_create_from_payload() {
        let store = store();
        seed(&store);
        let processor = EventProcessor::new(store.clone());
        processor.apply(1, 0, &create("/a/new", InodeKind::File)).unwrap();
        let record = store.get(&p("/a/new")).unwrap().unwrap();
        assert_eq!(record.owner, "hdfs");
        assert_eq!(record.replication_factor, 3);
        assert_eq!(record.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(du(&store, "/a"), 100);
    }

    #[test]
    fn test_create_uses_namespace_status() {
        let store = store();
        seed(&store);
        let ns = Arc::new(MemoryNamespace::new());
        ns.mkdir("/a").unwrap();
        ns.write_file("/a/g", 25).unwrap();
        let processor = EventProcessor::new(store.clone()).with_source(ns);

        processor.apply(1, 0, &create("/a/g", InodeKind::File)).unwrap();
        assert_eq!(store.get(&p("/a/g")).unwrap().unwrap().size, 25);
        assert_eq!(du(&store, "/a"), 125);
        assert_eq!(du(&store, "/"), 125);

        // vanished paths are dropped, temporary or not
        processor.apply(2, 0, &create("/a/gone", InodeKind::File)).unwrap();
        processor
            .apply(3, 0, &create("/a/x._COPYING_", InodeKind::File))
            .unwrap();
        assert!(store.get(&p("/a/gone")).unwrap().is_none());
        assert!(store.get(&p("/a/x._COPYING_")).unwrap().is_none());
    }

    #[test]
    fn test_metadata_update() {
        let store = store();
        seed(&store);
        let processor = EventProcessor::new(store.clone());
        let mut event = MetadataUpdateEvent::new("/a/f", MetadataType::Owner);
        event.owner = Some("alice".to_string());
        event.replication = 2;
        processor
            .apply(1, 0, &ChangeEvent::MetadataUpdate(event))
            .unwrap();
        let f = store.get(&p("/a/f")).unwrap().unwrap();
        assert_eq!(f.owner, "alice");
        assert_eq!(f.replication_factor, 2);
        assert_eq!(f.group, "root");

        let missing = MetadataUpdateEvent::new("/zz", MetadataType::Times);
        assert!(matches!(
            processor.apply(2, 0, &ChangeEvent::MetadataUpdate(missing)),
            Err(MirrorError::MissingRecord(_))
        ));
    }

    #[test]
    fn test_unlink_and_unknown_paths() {
        let store = store();
        seed(&store);
        let processor = EventProcessor::new(store.clone());
        processor
            .apply(
                1,
                0,
                &ChangeEvent::Unlink(UnlinkEvent {
                    path: "/zz".to_string(),
                    timestamp: 0,
                }),
            )
            .unwrap();
        processor
            .apply(
                2,
                0,
                &ChangeEvent::Unlink(UnlinkEvent {
                    path: "/a".to_string(),
                    timestamp: 0,
                }),
            )
            .unwrap();
        assert!(store.get(&p("/a/f")).unwrap().is_none());
        assert_eq!(du(&store, "/"), 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_rename_into_own_subtree_rejected() {
        let store = store();
        seed(&store);
        let processor = EventProcessor::new(store.clone());
        let rename = |src: &str, dst: &str| {
            ChangeEvent::Rename(RenameEvent {
                src_path: src.to_string(),
                dst_path: dst.to_string(),
                timestamp: 0,
            })
        };
        for event in [rename("/a/f", "/a"), rename("/a", "/a/f/g")] {
            assert!(matches!(
                processor.apply(1, 0, &event),
                Err(MirrorError::InvalidPath { .. })
            ));
        }
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(du(&store, "/a"), 100);
        assert_eq!(du(&store, "/"), 100);
    }

    #[test]
    fn test_append_is_informational() {
        let store = store();
        seed(&store);
        let processor = EventProcessor::new(store.clone());
        processor
            .apply(
                1,
                0,
                &ChangeEvent::Append(AppendEvent {
                    path: "/a/f".to_string(),
                    new_block: true,
                }),
            )
            .unwrap();
        assert_eq!(du(&store, "/a/f"), 100);
    }

    #[test]
    fn test_audit_log_records_before_apply() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = Arc::new(MetadataStore::open(&db, "file_system").unwrap());
        let log = Arc::new(EventLog::open(&db, "event_pool").unwrap());
        let processor = EventProcessor::new(store).with_audit_log(log.clone());
        let batch = EventBatch::new(
            7,
            vec![ChangeEvent::Close(CloseEvent {
                path: "/missing".to_string(),
                file_size: 1,
                timestamp: 1,
            })],
        );
        assert!(processor.apply_batch(&batch).is_err());
        let records = log.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transaction_id, 7);
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let processor = EventProcessor::new(store());
        assert_eq!(
            processor
                .with_poll_interval(Duration::from_millis(10))
                .poll_interval(),
            Duration::from_millis(250)
        );
        let processor = EventProcessor::new(store());
        assert_eq!(
            processor
                .with_poll_interval(Duration::from_secs(5))
                .poll_interval(),
            Duration::from_millis(500)
        );
    }
}
