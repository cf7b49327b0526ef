//! Tree Indexer
//!
//! One-shot bulk walk that populates the mirror from scratch. The walk is
//! depth-first and post-order: a directory's record is written only after all of
//! its children, carrying the sum of their disk usage. Records are inserted one
//! directory level at a time.

use crate::error::{MirrorError, Result};
use crate::inode::Inode;
use crate::namespace::NamespaceSource;
use crate::path::InodePath;
use crate::store::MetadataStore;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Totals gathered during one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub directories: u64,
    pub files: u64,
    pub disk_usage: u64,
    pub elapsed: Duration,
}

pub struct TreeIndexer<'a> {
    source: &'a dyn NamespaceSource,
    store: &'a MetadataStore,
}

impl<'a> TreeIndexer<'a> {
    pub fn new(source: &'a dyn NamespaceSource, store: &'a MetadataStore) -> Self {
        Self { source, store }
    }

    /// Index the subtree at `root`; returns the root's aggregated record.
    pub fn index(&self, root: &InodePath) -> Result<(Inode, IndexStats)> {
        let start = Instant::now();
        let status = self.source.status_of(root)?;
        if !status.is_directory() {
            return Err(MirrorError::NotADirectory(root.to_string()));
        }
        info!(root = %root, "Indexing namespace");

        let mut stats = IndexStats::default();
        let mut record = Inode::from_status(&status);
        self.index_directory(&mut record, &mut stats)?;

        stats.disk_usage = record.disk_usage;
        stats.elapsed = start.elapsed();
        info!(
            root = %root,
            directories = stats.directories,
            files = stats.files,
            disk_usage = stats.disk_usage,
            elapsed_ms = stats.elapsed.as_secs_f64() * 1e3,
            "Indexing complete"
        );
        Ok((record, stats))
    }

    /// Fill in `dir.disk_usage` from its children and persist this level.
    fn index_directory(&self, dir: &mut Inode, stats: &mut IndexStats) -> Result<()> {
        let mut staged = Vec::new();
        let mut total: u64 = 0;

        for child in self.source.list_directory(&dir.path)? {
            if child.is_directory() {
                let mut record = Inode::from_status(&child);
                self.index_directory(&mut record, stats)?;
                total += record.disk_usage;
            } else {
                let record = Inode::from_status(&child);
                total += record.disk_usage;
                stats.files += 1;
                staged.push(record);
            }
        }

        dir.disk_usage = total;
        stats.directories += 1;
        debug!(
            path = %dir.path,
            children = staged.len(),
            disk_usage = total,
            "Indexed directory"
        );
        staged.push(dir.clone());
        self.store.insert_many(&staged)
    }
}
