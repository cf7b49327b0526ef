//! Namespace sources
//!
//! The mirrored namespace is consumed through two seams: [`NamespaceSource`] for
//! listing directories and looking up current status, and [`EventStream`] for the
//! ordered feed of change notifications.

pub mod local;
pub mod memory;

use crate::error::NamespaceError;
use crate::event::EventBatch;
use crate::inode::InodeKind;
use crate::path::InodePath;
use serde::{Deserialize, Serialize};

/// Default block size reported for entries built without one.
pub const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

/// Status of one namespace entry as reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: InodePath,
    pub kind: InodeKind,
    pub size: u64,
    pub block_size: u64,
    pub replication: u16,
    pub owner: String,
    pub group: String,
    pub permission: String,
    pub modification_time: i64,
    pub access_time: i64,
    pub symlink_target: Option<String>,
}

impl FileStatus {
    fn base(path: InodePath, kind: InodeKind, size: u64, permission: &str) -> Self {
        Self {
            path,
            kind,
            size,
            block_size: DEFAULT_BLOCK_SIZE,
            replication: 1,
            owner: "root".to_string(),
            group: "root".to_string(),
            permission: permission.to_string(),
            modification_time: 0,
            access_time: 0,
            symlink_target: None,
        }
    }

    pub fn directory(path: InodePath) -> Self {
        Self::base(path, InodeKind::Directory, 0, "rwxr-xr-x")
    }

    pub fn file(path: InodePath, size: u64) -> Self {
        Self::base(path, InodeKind::File, size, "rw-r--r--")
    }

    pub fn symlink(path: InodePath, target: impl Into<String>) -> Self {
        let target = target.into();
        let mut status = Self::base(path, InodeKind::Symlink, target.len() as u64, "rwxrwxrwx");
        status.symlink_target = Some(target);
        status
    }

    pub fn with_owner(mut self, owner: impl Into<String>, group: impl Into<String>) -> Self {
        self.owner = owner.into();
        self.group = group.into();
        self
    }

    pub fn with_times(mut self, modification_time: i64, access_time: i64) -> Self {
        self.modification_time = modification_time;
        self.access_time = access_time;
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

/// Read access to the current state of the namespace.
pub trait NamespaceSource: Send + Sync {
    /// Immediate children of a directory.
    fn list_directory(&self, path: &InodePath) -> Result<Vec<FileStatus>, NamespaceError>;

    /// Status of a single entry; [`NamespaceError::NotFound`] when it does not exist.
    fn status_of(&self, path: &InodePath) -> Result<FileStatus, NamespaceError>;
}

/// Ordered feed of change notifications.
pub trait EventStream: Send {
    /// Next available batch, or `None` when nothing is pending. Must not block.
    fn poll(&mut self) -> Result<Option<EventBatch>, NamespaceError>;
}

impl<T: NamespaceSource + ?Sized> NamespaceSource for std::sync::Arc<T> {
    fn list_directory(&self, path: &InodePath) -> Result<Vec<FileStatus>, NamespaceError> {
        (**self).list_directory(path)
    }

    fn status_of(&self, path: &InodePath) -> Result<FileStatus, NamespaceError> {
        (**self).status_of(path)
    }
}

impl<T: EventStream + ?Sized> EventStream for Box<T> {
    fn poll(&mut self) -> Result<Option<EventBatch>, NamespaceError> {
        (**self).poll()
    }
}
