//! Inode records
//!
//! The stored representation of one namespace entry. Records are keyed by their
//! encoded [`InodePath`]; there is no parent pointer, ancestry is derived from the
//! path prefix relation.

use crate::error::Result;
use crate::namespace::FileStatus;
use crate::path::InodePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// Document field names, shared by predicates and partial updates.
pub const FIELD_ID: &str = "id";
pub const FIELD_ACCESS_TIME: &str = "accessTime";
pub const FIELD_MODIFICATION_TIME: &str = "modificationTime";
pub const FIELD_SIZE: &str = "size";
pub const FIELD_DISK_USAGE: &str = "diskUsage";
pub const FIELD_BLOCK_SIZE: &str = "blockSize";
pub const FIELD_REPLICATION_FACTOR: &str = "replicationFactor";
pub const FIELD_OWNER: &str = "owner";
pub const FIELD_GROUP: &str = "group";
pub const FIELD_PERMISSION: &str = "permission";
pub const FIELD_NAME: &str = "name";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_PATH: &str = "path";

/// Kind of namespace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InodeKind {
    Directory,
    File,
    Symlink,
}

impl InodeKind {
    pub fn is_directory(&self) -> bool {
        matches!(self, InodeKind::Directory)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InodeKind::Directory => "DIRECTORY",
            InodeKind::File => "FILE",
            InodeKind::Symlink => "SYMLINK",
        }
    }
}

impl fmt::Display for InodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata record for a file, directory or symlink.
///
/// `disk_usage` equals `size` for files and symlinks and the sum over the whole
/// subtree for directories. Times are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inode {
    pub id: Uuid,
    pub access_time: i64,
    pub modification_time: i64,
    pub size: u64,
    pub disk_usage: u64,
    pub block_size: u64,
    pub replication_factor: u16,
    pub owner: String,
    pub group: String,
    pub permission: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InodeKind,
    pub path: InodePath,
}

impl Inode {
    /// Create a fresh record from namespace status with a newly generated id.
    pub fn from_status(status: &FileStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            access_time: status.access_time,
            modification_time: status.modification_time,
            size: status.size,
            disk_usage: status.size,
            block_size: status.block_size,
            replication_factor: status.replication,
            owner: status.owner.clone(),
            group: status.group.clone(),
            permission: status.permission.clone(),
            name: status.path.name().to_string(),
            kind: status.kind,
            path: status.path.clone(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    /// Move the record to `path`, keeping `name` in step with the last segment.
    pub fn relocate(&mut self, path: InodePath) {
        self.name = path.name().to_string();
        self.path = path;
    }

    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_document(doc: Value) -> Result<Self> {
        Ok(serde_json::from_value(doc)?)
    }
}

impl fmt::Display for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}, size={}, du={})",
            self.kind, self.path, self.size, self.disk_usage
        )
    }
}
