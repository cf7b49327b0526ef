//! Change events
//!
//! One variant per namespace mutation kind. Payload paths are kept as the raw
//! strings delivered by the source and parsed when the event is applied, so a
//! malformed path surfaces as an error at dispatch time.

pub mod log;

use crate::error::{MirrorError, Result};
use crate::inode::InodeKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source-assigned, monotonically increasing sequence number.
pub type TransactionId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEvent {
    pub path: String,
    #[serde(default)]
    pub new_block: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseEvent {
    pub path: String,
    pub file_size: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
    pub path: String,
    pub inode_type: InodeKind,
    pub ctime: i64,
    pub replication: i32,
    pub owner: String,
    pub group: String,
    pub permission: String,
    #[serde(default)]
    pub symlink_target: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub default_block_size: i64,
}

/// Which attribute family a metadata update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataType {
    Times,
    Replication,
    Owner,
    Perms,
    Acls,
    Xattrs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdateEvent {
    pub path: String,
    pub metadata_type: MetadataType,
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub atime: i64,
    #[serde(default)]
    pub replication: i32,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default)]
    pub acls: Option<Vec<String>>,
}

impl MetadataUpdateEvent {
    /// Update event carrying no attribute values yet.
    pub fn new(path: impl Into<String>, metadata_type: MetadataType) -> Self {
        Self {
            path: path.into(),
            metadata_type,
            mtime: 0,
            atime: 0,
            replication: 0,
            owner: None,
            group: None,
            permission: None,
            acls: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameEvent {
    pub src_path: String,
    pub dst_path: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkEvent {
    pub path: String,
    pub timestamp: i64,
}

/// Namespace change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    Append(AppendEvent),
    Close(CloseEvent),
    Create(CreateEvent),
    MetadataUpdate(MetadataUpdateEvent),
    Rename(RenameEvent),
    Unlink(UnlinkEvent),
}

impl ChangeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Append(_) => EventKind::Append,
            ChangeEvent::Close(_) => EventKind::Close,
            ChangeEvent::Create(_) => EventKind::Create,
            ChangeEvent::MetadataUpdate(_) => EventKind::MetadataUpdate,
            ChangeEvent::Rename(_) => EventKind::Rename,
            ChangeEvent::Unlink(_) => EventKind::Unlink,
        }
    }

    /// Path the event is about; the source path for renames.
    pub fn path(&self) -> &str {
        match self {
            ChangeEvent::Append(e) => &e.path,
            ChangeEvent::Close(e) => &e.path,
            ChangeEvent::Create(e) => &e.path,
            ChangeEvent::MetadataUpdate(e) => &e.path,
            ChangeEvent::Rename(e) => &e.src_path,
            ChangeEvent::Unlink(e) => &e.path,
        }
    }
}

/// Event kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Append,
    Close,
    Create,
    MetadataUpdate,
    Rename,
    Unlink,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Append => "APPEND",
            EventKind::Close => "CLOSE",
            EventKind::Create => "CREATE",
            EventKind::MetadataUpdate => "METADATA_UPDATE",
            EventKind::Rename => "RENAME",
            EventKind::Unlink => "UNLINK",
        }
    }
}

impl FromStr for EventKind {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "APPEND" => Ok(EventKind::Append),
            "CLOSE" => Ok(EventKind::Close),
            "CREATE" => Ok(EventKind::Create),
            "METADATA_UPDATE" | "METADATA" => Ok(EventKind::MetadataUpdate),
            "RENAME" => Ok(EventKind::Rename),
            "UNLINK" => Ok(EventKind::Unlink),
            other => Err(MirrorError::UnsupportedEvent(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events delivered together under one transaction id, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    pub transaction_id: TransactionId,
    pub events: Vec<ChangeEvent>,
}

impl EventBatch {
    pub fn new(transaction_id: TransactionId, events: Vec<ChangeEvent>) -> Self {
        Self {
            transaction_id,
            events,
        }
    }
}
