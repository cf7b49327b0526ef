//! Local-directory namespace.
//!
//! Exposes a directory on the local filesystem as the namespace root `/`.
//! Listings go through `walkdir`, change notifications through `notify`.

use super::{EventStream, FileStatus, NamespaceSource, DEFAULT_BLOCK_SIZE};
use crate::error::NamespaceError;
use crate::event::{
    ChangeEvent, CloseEvent, CreateEvent, EventBatch, MetadataType, MetadataUpdateEvent,
    RenameEvent, TransactionId, UnlinkEvent,
};
use crate::inode::InodeKind;
use crate::path::InodePath;
use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::SystemTime;
use tracing::{debug, error, trace, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LocalNamespace {
    root: PathBuf,
}

impl LocalNamespace {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, NamespaceError> {
        let root = dunce::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local location of a namespace path.
    pub fn local_path(&self, path: &InodePath) -> PathBuf {
        path.segments()
            .iter()
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    /// Namespace path of a local location, `None` if it lies outside the root.
    pub fn namespace_path(&self, local: &Path) -> Option<InodePath> {
        let relative = local.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        InodePath::from_segments(segments).ok()
    }

    fn stat(&self, path: &InodePath) -> Result<FileStatus, NamespaceError> {
        let local = self.local_path(path);
        let metadata = std::fs::symlink_metadata(&local).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => NamespaceError::NotFound(path.to_string()),
            _ => NamespaceError::Io(e),
        })?;
        Ok(status_from_metadata(path.clone(), &local, &metadata))
    }

    /// Start watching the root recursively.
    pub fn watch(&self) -> Result<LocalEventStream, NamespaceError> {
        LocalEventStream::new(self.clone())
    }
}

impl NamespaceSource for LocalNamespace {
    fn list_directory(&self, path: &InodePath) -> Result<Vec<FileStatus>, NamespaceError> {
        let local = self.local_path(path);
        let mut children = Vec::new();
        for entry in WalkDir::new(&local)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| match e.io_error() {
                Some(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    NamespaceError::NotFound(path.to_string())
                }
                _ => NamespaceError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    e.to_string(),
                )),
            })?;
            let Some(name) = entry.file_name().to_str() else {
                warn!(path = ?entry.path(), "Skipping entry with non UTF-8 name");
                continue;
            };
            let child = path
                .child(name)
                .map_err(|e| NamespaceError::Stream(e.to_string()))?;
            let metadata = entry.metadata().map_err(|e| {
                NamespaceError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    e.to_string(),
                ))
            })?;
            children.push(status_from_metadata(child, entry.path(), &metadata));
        }
        Ok(children)
    }

    fn status_of(&self, path: &InodePath) -> Result<FileStatus, NamespaceError> {
        self.stat(path)
    }
}

fn millis(time: std::io::Result<SystemTime>) -> i64 {
    time.map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or(0)
}

/// Render the low nine mode bits as `rwxr-xr-x`.
pub fn format_permission(mode: u32) -> String {
    const BITS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    BITS.iter()
        .map(|(bit, c)| if mode & bit != 0 { *c } else { '-' })
        .collect()
}

#[cfg(unix)]
fn ownership(metadata: &Metadata) -> (String, String, String, u64) {
    use std::os::unix::fs::MetadataExt;
    (
        metadata.uid().to_string(),
        metadata.gid().to_string(),
        format_permission(metadata.mode()),
        metadata.blksize(),
    )
}

#[cfg(not(unix))]
fn ownership(metadata: &Metadata) -> (String, String, String, u64) {
    let permission = if metadata.permissions().readonly() {
        "r--r--r--"
    } else {
        "rw-rw-rw-"
    };
    (
        "unknown".to_string(),
        "unknown".to_string(),
        permission.to_string(),
        DEFAULT_BLOCK_SIZE,
    )
}

fn status_from_metadata(path: InodePath, local: &Path, metadata: &Metadata) -> FileStatus {
    let file_type = metadata.file_type();
    let kind = if file_type.is_dir() {
        InodeKind::Directory
    } else if file_type.is_symlink() {
        InodeKind::Symlink
    } else {
        InodeKind::File
    };
    let (owner, group, permission, block_size) = ownership(metadata);
    let symlink_target = match kind {
        InodeKind::Symlink => std::fs::read_link(local)
            .ok()
            .map(|t| t.to_string_lossy().to_string()),
        _ => None,
    };
    FileStatus {
        path,
        kind,
        // directory sizes are aggregated by the mirror, not taken from the filesystem
        size: if kind.is_directory() { 0 } else { metadata.len() },
        block_size: if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size
        },
        replication: 1,
        owner,
        group,
        permission,
        modification_time: millis(metadata.modified()),
        access_time: millis(metadata.accessed()),
        symlink_target,
    }
}

/// Change stream fed by a recursive `notify` watcher.
///
/// Each poll drains whatever the watcher has delivered since the previous poll
/// into one batch with the next transaction id.
///
/// Moves are reported as two halves sharing a tracker. A destination half with
/// no source is a move into the root and becomes CREATE for the whole moved
/// subtree. A source half still unmatched one poll after it arrived is a move
/// out of the root and becomes UNLINK.
pub struct LocalEventStream {
    namespace: LocalNamespace,
    rx: mpsc::Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
    next_transaction: TransactionId,
    move_sources: HashMap<usize, InodePath>,
}

impl LocalEventStream {
    fn new(namespace: LocalNamespace) -> Result<Self, NamespaceError> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Err(e) = tx.send(res) {
                error!("Error sending watch event: {}", e);
            }
        })
        .map_err(|e| NamespaceError::Stream(format!("Failed to create watcher: {}", e)))?;
        watcher
            .watch(namespace.root(), RecursiveMode::Recursive)
            .map_err(|e| NamespaceError::Stream(format!("Failed to watch directory: {}", e)))?;
        debug!(root = ?namespace.root(), "Watching local namespace");
        Ok(Self {
            namespace,
            rx,
            _watcher: watcher,
            next_transaction: 1,
            move_sources: HashMap::new(),
        })
    }

    /// Map one watcher event; `carried` holds move sources left over from the previous poll.
    fn convert_event(
        &mut self,
        event: Event,
        carried: &mut HashMap<usize, InodePath>,
    ) -> Vec<ChangeEvent> {
        let tracker = event.tracker();
        let paths: Vec<InodePath> = event
            .paths
            .iter()
            .filter_map(|p| self.namespace.namespace_path(p))
            .collect();
        match event.kind {
            EventKind::Create(_) => paths.iter().map(|p| self.create_event(p)).collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.move_events(mode, tracker, paths, carried)
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => paths
                .iter()
                .filter_map(|p| self.metadata_event(p))
                .collect(),
            EventKind::Modify(_) => paths.iter().filter_map(|p| self.close_event(p)).collect(),
            EventKind::Remove(_) => paths.iter().map(unlink_event).collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {
                trace!(kind = ?event.kind, "Ignoring watch event");
                Vec::new()
            }
        }
    }

    fn move_events(
        &mut self,
        mode: RenameMode,
        tracker: Option<usize>,
        paths: Vec<InodePath>,
        carried: &mut HashMap<usize, InodePath>,
    ) -> Vec<ChangeEvent> {
        match (mode, tracker) {
            (RenameMode::From, Some(tracker)) => {
                if let Some(path) = paths.into_iter().next() {
                    self.move_sources.insert(tracker, path);
                }
                Vec::new()
            }
            // the parent directory's watch reports the same move with a tracker
            (RenameMode::From, None) => Vec::new(),
            (RenameMode::To, tracker) => {
                let Some(dst) = paths.into_iter().next() else {
                    return Vec::new();
                };
                let src = tracker.and_then(|t| {
                    self.move_sources.remove(&t).or_else(|| carried.remove(&t))
                });
                match src {
                    Some(src) => vec![rename_event(&src, &dst)],
                    None => {
                        debug!(path = %dst, "Entry moved into the watched root");
                        self.subtree_create_events(&dst)
                    }
                }
            }
            // tracked halves already produced the rename
            (RenameMode::Both, Some(_)) => Vec::new(),
            (RenameMode::Both, None) if paths.len() >= 2 => {
                vec![rename_event(&paths[0], &paths[1])]
            }
            _ => paths
                .iter()
                .flat_map(|p| match self.namespace.stat(p) {
                    Ok(_) => self.subtree_create_events(p),
                    Err(_) => vec![unlink_event(p)],
                })
                .collect(),
        }
    }

    /// CREATE for `path` and, for a directory, everything below it, parents first.
    fn subtree_create_events(&self, path: &InodePath) -> Vec<ChangeEvent> {
        let mut events = vec![self.create_event(path)];
        let local = self.namespace.local_path(path);
        let is_dir = std::fs::symlink_metadata(&local)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return events;
        }
        for entry in WalkDir::new(&local)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) => {
                    if let Some(nested) = self.namespace.namespace_path(entry.path()) {
                        events.push(self.create_event(&nested));
                    }
                }
                Err(e) => warn!(path = %path, error = %e, "Failed to walk moved directory"),
            }
        }
        events
    }

    /// UNLINK for move sources that never found a destination, unless the path is in use again.
    fn expired_move_events(&self, expired: HashMap<usize, InodePath>) -> Vec<ChangeEvent> {
        expired
            .into_values()
            .filter(|path| !path.is_root())
            .filter(|path| matches!(self.namespace.stat(path), Err(NamespaceError::NotFound(_))))
            .map(|path| {
                debug!(path = %path, "Entry moved out of the watched root");
                unlink_event(&path)
            })
            .collect()
    }

    fn create_event(&self, path: &InodePath) -> ChangeEvent {
        let status = self.namespace.stat(path).ok();
        let (inode_type, owner, group, permission, ctime, target) = match &status {
            Some(s) => (
                s.kind,
                s.owner.clone(),
                s.group.clone(),
                s.permission.clone(),
                s.modification_time,
                s.symlink_target.clone(),
            ),
            None => (
                InodeKind::File,
                String::new(),
                String::new(),
                String::new(),
                Utc::now().timestamp_millis(),
                None,
            ),
        };
        ChangeEvent::Create(CreateEvent {
            path: path.to_string(),
            inode_type,
            ctime,
            replication: 1,
            owner,
            group,
            permission,
            symlink_target: target,
            overwrite: false,
            default_block_size: DEFAULT_BLOCK_SIZE as i64,
        })
    }

    fn close_event(&self, path: &InodePath) -> Option<ChangeEvent> {
        let status = self.namespace.stat(path).ok()?;
        if status.is_directory() {
            return None;
        }
        Some(ChangeEvent::Close(CloseEvent {
            path: path.to_string(),
            file_size: status.size as i64,
            timestamp: status.modification_time,
        }))
    }

    fn metadata_event(&self, path: &InodePath) -> Option<ChangeEvent> {
        let status = self.namespace.stat(path).ok()?;
        let mut event = MetadataUpdateEvent::new(path.to_string(), MetadataType::Perms);
        event.mtime = status.modification_time;
        event.atime = status.access_time;
        event.owner = Some(status.owner);
        event.group = Some(status.group);
        event.permission = Some(status.permission);
        Some(ChangeEvent::MetadataUpdate(event))
    }
}

fn rename_event(src: &InodePath, dst: &InodePath) -> ChangeEvent {
    ChangeEvent::Rename(RenameEvent {
        src_path: src.to_string(),
        dst_path: dst.to_string(),
        timestamp: Utc::now().timestamp_millis(),
    })
}

fn unlink_event(path: &InodePath) -> ChangeEvent {
    ChangeEvent::Unlink(UnlinkEvent {
        path: path.to_string(),
        timestamp: Utc::now().timestamp_millis(),
    })
}

impl EventStream for LocalEventStream {
    fn poll(&mut self) -> Result<Option<EventBatch>, NamespaceError> {
        let mut carried = std::mem::take(&mut self.move_sources);
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => {
                    let converted = self.convert_event(event, &mut carried);
                    events.extend(converted);
                }
                Ok(Err(e)) => warn!("Watch error: {}", e),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    return Err(NamespaceError::Stream(
                        "Watcher channel disconnected".to_string(),
                    ))
                }
            }
        }
        events.extend(self.expired_move_events(carried));
        if events.is_empty() {
            return Ok(None);
        }
        let transaction_id = self.next_transaction;
        self.next_transaction += 1;
        Ok(Some(EventBatch::new(transaction_id, events)))
    }
}
