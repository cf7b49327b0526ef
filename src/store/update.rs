//! Partial updates.
//!
//! [`InodeUpdate`] collects incoming attribute values and turns them into a sparse
//! [`UpdateSet`]. A value is only written when it is "present": numbers must be
//! `> 0`, strings must be `Some`. This means a numeric attribute can never be set
//! back to zero through an update.

use crate::inode::{
    FIELD_ACCESS_TIME, FIELD_DISK_USAGE, FIELD_GROUP, FIELD_MODIFICATION_TIME, FIELD_OWNER,
    FIELD_PERMISSION, FIELD_REPLICATION_FACTOR, FIELD_SIZE,
};
use serde_json::Value;
use std::fmt;

/// Sparse set of top-level field assignments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSet {
    fields: Vec<(String, Value)>,
}

impl UpdateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, value);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(f, _)| *f == field) {
            Some(existing) => existing.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(f, v)| (f.as_str(), v))
    }

    /// Apply the assignments to a document. Returns whether anything changed.
    pub fn apply(&self, doc: &mut Value) -> bool {
        let Some(map) = doc.as_object_mut() else {
            return false;
        };
        let mut changed = false;
        for (field, value) in &self.fields {
            if map.get(field) != Some(value) {
                map.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

impl fmt::Display for UpdateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (field, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field, value)?;
        }
        f.write_str("}")
    }
}

/// Attribute changes for a single inode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InodeUpdate {
    access_time: i64,
    modification_time: i64,
    replication_factor: i32,
    group: Option<String>,
    owner: Option<String>,
    permission: Option<String>,
    size: i64,
    // computed by the caller, not subject to the presence rule
    disk_usage: Option<u64>,
}

impl InodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atime(mut self, time: i64) -> Self {
        self.access_time = time;
        self
    }

    pub fn mtime(mut self, time: i64) -> Self {
        self.modification_time = time;
        self
    }

    pub fn replication(mut self, replication: i32) -> Self {
        self.replication_factor = replication;
        self
    }

    pub fn group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    pub fn owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn permission(mut self, permission: Option<String>) -> Self {
        self.permission = permission;
        self
    }

    /// File size, only sent on close.
    pub fn file_size(mut self, bytes: i64) -> Self {
        self.size = bytes;
        self
    }

    pub fn disk_usage(mut self, bytes: u64) -> Self {
        self.disk_usage = Some(bytes);
        self
    }

    pub fn to_update_set(&self) -> UpdateSet {
        let mut set = UpdateSet::new();
        if self.access_time > 0 {
            set.push(FIELD_ACCESS_TIME, self.access_time);
        }
        if self.modification_time > 0 {
            set.push(FIELD_MODIFICATION_TIME, self.modification_time);
        }
        if self.replication_factor > 0 {
            set.push(FIELD_REPLICATION_FACTOR, self.replication_factor);
        }
        if let Some(group) = &self.group {
            set.push(FIELD_GROUP, group.as_str());
        }
        if let Some(owner) = &self.owner {
            set.push(FIELD_OWNER, owner.as_str());
        }
        if let Some(permission) = &self.permission {
            set.push(FIELD_PERMISSION, permission.as_str());
        }
        if self.size > 0 {
            set.push(FIELD_SIZE, self.size);
        }
        if let Some(disk_usage) = self.disk_usage {
            set.push(FIELD_DISK_USAGE, disk_usage);
        }
        set
    }
}
