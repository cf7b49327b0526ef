//! Metadata Store
//!
//! Typed access to the mirror collection. Reads go straight to the collection;
//! every structural mutation runs under a single process-wide modification lock,
//! so unrelated paths contend on the same lock.

pub mod collection;
pub mod filter;
pub mod persistence;
pub mod update;

use crate::error::{MirrorError, Result};
use crate::inode::{Inode, FIELD_DISK_USAGE};
use crate::path::{filter as path_filter, InodePath};
use collection::{DocumentCollection, WriteResult};
use parking_lot::Mutex;
use persistence::SledCollection;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use update::{InodeUpdate, UpdateSet};

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e3
}

fn acknowledged(result: WriteResult, what: impl FnOnce() -> String) -> Result<WriteResult> {
    if !result.acknowledged {
        return Err(MirrorError::StoreIo(what()));
    }
    Ok(result)
}

pub struct MetadataStore {
    collection: Arc<dyn DocumentCollection>,
    modification_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(collection: Arc<dyn DocumentCollection>) -> Self {
        Self {
            collection,
            modification_lock: Mutex::new(()),
        }
    }

    /// Store backed by sled tree `name`.
    pub fn open(db: &sled::Db, name: &str) -> Result<Self> {
        Ok(Self::new(Arc::new(SledCollection::open(db, name)?)))
    }

    pub fn collection(&self) -> &Arc<dyn DocumentCollection> {
        &self.collection
    }

    /// Record stored at `path`. Does not take the modification lock.
    pub fn get(&self, path: &InodePath) -> Result<Option<Inode>> {
        self.collection
            .find_one(&path_filter::exact(path))?
            .map(Inode::from_document)
            .transpose()
    }

    /// `path` and all its descendants.
    pub fn find_subtree(&self, path: &InodePath) -> Result<Vec<Inode>> {
        self.collection
            .find(&path_filter::subtree(path))?
            .into_iter()
            .map(Inode::from_document)
            .collect()
    }

    /// Direct children of `path`, ordered by name.
    pub fn children(&self, path: &InodePath) -> Result<Vec<Inode>> {
        let mut children: Vec<Inode> = self
            .collection
            .find(&path_filter::children(path))?
            .into_iter()
            .map(Inode::from_document)
            .collect::<Result<_>>()?;
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    /// Strict ancestors of `path` present in the store, root first.
    pub fn ancestors(&self, path: &InodePath) -> Result<Vec<Inode>> {
        let mut found = Vec::new();
        for ancestor in path.ancestors() {
            if let Some(inode) = self.get(&ancestor)? {
                found.push(inode);
            }
        }
        Ok(found)
    }

    pub fn count(&self) -> Result<u64> {
        self.collection.count(&filter::Filter::all())
    }

    /// Bulk insert without replacement; used by the initial index.
    pub fn insert_many(&self, inodes: &[Inode]) -> Result<()> {
        if inodes.is_empty() {
            return Ok(());
        }
        let _guard = self.modification_lock.lock();
        let start = Instant::now();
        let docs = inodes
            .iter()
            .map(Inode::to_document)
            .collect::<Result<Vec<_>>>()?;
        let result = acknowledged(self.collection.insert_many(docs)?, || {
            format!("insert of {} records", inodes.len())
        })?;
        debug!(
            inserted = result.inserted,
            elapsed_ms = elapsed_ms(start),
            "Inserted records"
        );
        Ok(())
    }

    /// Insert `inode`, replacing any record already stored at its path.
    pub fn upsert(&self, inode: &Inode) -> Result<()> {
        let _guard = self.modification_lock.lock();
        let start = Instant::now();
        let result = self.collection.replace_one(
            &path_filter::exact(&inode.path),
            inode.to_document()?,
            true,
        )?;
        let result = acknowledged(result, || format!("upsert of {}", inode.path))?;
        debug!(
            path = %inode.path,
            id = %inode.id,
            modified = result.modified,
            upserted = result.upserted_id.is_some(),
            elapsed_ms = elapsed_ms(start),
            "Upserted record"
        );
        Ok(())
    }

    /// Delete `path` and every descendant. Not atomic for concurrent readers.
    pub fn delete(&self, path: &InodePath) -> Result<u64> {
        let _guard = self.modification_lock.lock();
        let start = Instant::now();
        let result = self.collection.delete_many(&path_filter::subtree(path))?;
        let result = acknowledged(result, || format!("delete of {}", path))?;
        info!(
            path = %path,
            deleted = result.deleted,
            elapsed_ms = elapsed_ms(start),
            "Deleted subtree"
        );
        Ok(result.deleted)
    }

    /// Move the subtree at `src` to `dst`, one replace per record.
    ///
    /// Not atomic: a failure part way leaves the subtree split between both paths.
    pub fn rename(&self, src: &InodePath, dst: &InodePath) -> Result<u64> {
        let _guard = self.modification_lock.lock();
        let start = Instant::now();
        let docs = self.collection.find(&path_filter::subtree(src))?;
        let mut renamed = 0;
        for doc in docs {
            let mut inode = Inode::from_document(doc)?;
            let old_path = inode.path.clone();
            inode.relocate(old_path.rewrite_prefix(src, dst)?);
            let result = self.collection.replace_one(
                &path_filter::exact(&old_path),
                inode.to_document()?,
                false,
            )?;
            acknowledged(result, || format!("rename of {} to {}", old_path, inode.path))?;
            renamed += 1;
        }
        info!(
            src = %src,
            dst = %dst,
            renamed,
            elapsed_ms = elapsed_ms(start),
            "Renamed subtree"
        );
        Ok(renamed)
    }

    /// Apply a partial update to the record at `path`.
    ///
    /// Returns `false` without touching the store when the update carries no
    /// present fields.
    pub fn update(&self, path: &InodePath, update: &InodeUpdate) -> Result<bool> {
        let set = update.to_update_set();
        if set.is_empty() {
            warn!(path = %path, "Update ignored, no fields to set");
            return Ok(false);
        }
        let _guard = self.modification_lock.lock();
        self.apply_update(path, &set)?;
        Ok(true)
    }

    fn apply_update(&self, path: &InodePath, set: &UpdateSet) -> Result<WriteResult> {
        let start = Instant::now();
        let result = self
            .collection
            .update_one(&path_filter::exact(path), set)?;
        let result = acknowledged(result, || format!("update of {} with {}", path, set))?;
        debug!(
            path = %path,
            update = %set,
            matched = result.matched,
            modified = result.modified,
            elapsed_ms = elapsed_ms(start),
            "Updated record"
        );
        Ok(result)
    }

    /// Add `delta` to the disk usage of every strict ancestor of `path`.
    ///
    /// Results are clamped at zero; a clamp means the mirror has drifted from the
    /// namespace and is logged.
    pub fn adjust_ancestors(&self, path: &InodePath, delta: i64) -> Result<()> {
        if delta == 0 || path.is_root() {
            return Ok(());
        }
        let _guard = self.modification_lock.lock();
        let start = Instant::now();
        let mut adjusted = 0;
        for predicate in path_filter::ancestors(path) {
            let Some(doc) = self.collection.find_one(&predicate)? else {
                continue;
            };
            let ancestor = Inode::from_document(doc)?;
            let current = ancestor.disk_usage as i64;
            let next = current.saturating_add(delta);
            if next < 0 {
                warn!(
                    path = %ancestor.path,
                    disk_usage = current,
                    delta,
                    "Disk usage would go negative, clamping to zero"
                );
            }
            let set = UpdateSet::new().set(FIELD_DISK_USAGE, next.max(0) as u64);
            self.apply_update(&ancestor.path, &set)?;
            adjusted += 1;
        }
        debug!(
            path = %path,
            delta,
            adjusted,
            elapsed_ms = elapsed_ms(start),
            "Adjusted ancestor disk usage"
        );
        Ok(())
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.modification_lock.lock();
        let start = Instant::now();
        self.collection.drop_all()?;
        info!(elapsed_ms = elapsed_ms(start), "Cleared metadata store");
        Ok(())
    }
}
