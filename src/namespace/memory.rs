//! In-memory namespace and scripted change feed.

use super::{EventStream, FileStatus, NamespaceSource};
use crate::error::NamespaceError;
use crate::event::EventBatch;
use crate::path::InodePath;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::mpsc;

/// Namespace held in a map; starts with an empty root directory.
pub struct MemoryNamespace {
    entries: RwLock<BTreeMap<InodePath, FileStatus>>,
}

impl Default for MemoryNamespace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNamespace {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(InodePath::root(), FileStatus::directory(InodePath::root()));
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Insert or replace an entry. Parents are not created.
    pub fn insert(&self, status: FileStatus) {
        self.entries.write().insert(status.path.clone(), status);
    }

    pub fn mkdir(&self, raw: &str) -> crate::error::Result<()> {
        self.insert(FileStatus::directory(InodePath::parse(raw)?));
        Ok(())
    }

    pub fn write_file(&self, raw: &str, size: u64) -> crate::error::Result<()> {
        self.insert(FileStatus::file(InodePath::parse(raw)?, size));
        Ok(())
    }

    /// Remove `path` and everything below it.
    pub fn remove(&self, path: &InodePath) {
        self.entries.write().retain(|p, _| !p.has_prefix(path));
    }

    /// Move `src` and everything below it to `dst`.
    pub fn rename(&self, src: &InodePath, dst: &InodePath) -> crate::error::Result<()> {
        let mut entries = self.entries.write();
        let moved: Vec<InodePath> = entries
            .keys()
            .filter(|p| p.has_prefix(src))
            .cloned()
            .collect();
        for old in moved {
            if let Some(mut status) = entries.remove(&old) {
                status.path = old.rewrite_prefix(src, dst)?;
                entries.insert(status.path.clone(), status);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl NamespaceSource for MemoryNamespace {
    fn list_directory(&self, path: &InodePath) -> Result<Vec<FileStatus>, NamespaceError> {
        let entries = self.entries.read();
        match entries.get(path) {
            Some(status) if status.is_directory() => {}
            Some(status) => return Ok(vec![status.clone()]),
            None => return Err(NamespaceError::NotFound(path.to_string())),
        }
        Ok(entries
            .values()
            .filter(|s| s.path.parent().as_ref() == Some(path))
            .cloned()
            .collect())
    }

    fn status_of(&self, path: &InodePath) -> Result<FileStatus, NamespaceError> {
        self.entries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| NamespaceError::NotFound(path.to_string()))
    }
}

/// Sending half of a scripted change feed.
#[derive(Clone)]
pub struct EventFeed {
    tx: mpsc::Sender<EventBatch>,
}

impl EventFeed {
    /// Queue a batch; returns `false` once the stream has been dropped.
    pub fn push(&self, batch: EventBatch) -> bool {
        self.tx.send(batch).is_ok()
    }
}

/// Receiving half of a scripted change feed.
pub struct MemoryEventStream {
    rx: mpsc::Receiver<EventBatch>,
}

impl MemoryEventStream {
    pub fn channel() -> (EventFeed, MemoryEventStream) {
        let (tx, rx) = mpsc::channel();
        (EventFeed { tx }, MemoryEventStream { rx })
    }
}

impl EventStream for MemoryEventStream {
    fn poll(&mut self) -> Result<Option<EventBatch>, NamespaceError> {
        match self.rx.try_recv() {
            Ok(batch) => Ok(Some(batch)),
            Err(mpsc::TryRecvError::Empty) | Err(mpsc::TryRecvError::Disconnected) => Ok(None),
        }
    }
}
