//! Sled-backed document collection.
//!
//! Each document is stored as JSON under its `id` field. A second tree maps the
//! [`InodePath::index_key`] of every document's path to its id, so exact path
//! predicates resolve with one lookup and subtree predicates with one prefix
//! scan. Other predicates fall back to a pass over the whole collection.

use super::collection::{DocumentCollection, WriteResult};
use super::filter::Filter;
use super::update::UpdateSet;
use crate::error::{MirrorError, Result};
use crate::inode::{FIELD_ID, FIELD_PATH};
use crate::path::{index_key, InodePath, FIELD_DEPTH, MAX_DEPTH};
use serde_json::Value;
use sled::IVec;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

type Entries<'a> = Box<dyn Iterator<Item = Result<(IVec, IVec)>> + 'a>;

/// How a predicate is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPlan {
    /// One index lookup.
    Exact(Vec<u8>),
    /// One index prefix scan; the predicate filters the candidates.
    Prefix(Vec<u8>),
    /// Every document is tested.
    Scan,
}

impl IndexPlan {
    /// Plan a predicate built from `path.<n>` and `path.depth` equalities.
    ///
    /// The leading run of consecutive segment clauses forms the key. Any other
    /// clause only narrows the candidates and is checked per document.
    pub fn of(filter: &Filter) -> Self {
        let Filter::And(clauses) = filter else {
            return IndexPlan::Scan;
        };
        let depth_key = format!("{}.{}", FIELD_PATH, FIELD_DEPTH);
        let mut segments = BTreeMap::new();
        let mut depth = None;
        for clause in clauses {
            let Filter::Eq(key, value) = clause else {
                continue;
            };
            if *key == depth_key {
                depth = value.as_u64();
                continue;
            }
            let Some(position) = key
                .strip_prefix(FIELD_PATH)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|field| field.parse::<usize>().ok())
            else {
                continue;
            };
            if position >= MAX_DEPTH {
                continue;
            }
            if let Some(segment) = value.as_str() {
                segments.insert(position, segment);
            }
        }
        let leading: Vec<&str> = (0..)
            .map_while(|i| segments.get(&i).copied())
            .collect();
        let complete = leading.len() == segments.len();
        match depth {
            Some(d) if complete && d as usize == leading.len() => {
                IndexPlan::Exact(index_key(leading))
            }
            _ if leading.is_empty() => IndexPlan::Scan,
            _ => IndexPlan::Prefix(index_key(leading)),
        }
    }
}

pub struct SledCollection {
    tree: sled::Tree,
    paths: sled::Tree,
    flush_on_write: bool,
}

impl SledCollection {
    /// Open (or create) the collection stored in tree `name` and its path index.
    pub fn open(db: &sled::Db, name: &str) -> Result<Self> {
        let tree = db.open_tree(name)?;
        let paths = db.open_tree(format!("{}.{}-index", name, FIELD_PATH))?;
        let collection = Self {
            tree,
            paths,
            flush_on_write: false,
        };
        if collection.paths.is_empty() && !collection.tree.is_empty() {
            collection.rebuild_index()?;
        }
        Ok(collection)
    }

    /// Flush to disk before acknowledging each write.
    pub fn with_flush_on_write(mut self, flush: bool) -> Self {
        self.flush_on_write = flush;
        self
    }

    /// Recreate the path index from the stored documents.
    pub fn rebuild_index(&self) -> Result<u64> {
        self.paths.clear()?;
        let mut batch = sled::Batch::default();
        let mut indexed = 0;
        for entry in self.tree.iter() {
            let (id, bytes) = entry?;
            if let Some(key) = Self::path_key(&Self::decode(&bytes)?) {
                batch.insert(key, id);
                indexed += 1;
            }
        }
        self.paths.apply_batch(batch)?;
        info!(indexed, "Rebuilt path index");
        Ok(indexed)
    }

    fn decode(bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Index key of a document, `None` when it carries no valid path.
    fn path_key(doc: &Value) -> Option<Vec<u8>> {
        let path = InodePath::decode(doc.get(FIELD_PATH)?).ok()?;
        Some(path.index_key())
    }

    /// Storage key of a document, assigning a fresh id when it has none.
    fn key_of(doc: &mut Value) -> Result<String> {
        let map = doc
            .as_object_mut()
            .ok_or_else(|| MirrorError::StoreIo("document must be a JSON object".to_string()))?;
        match map.get(FIELD_ID) {
            Some(Value::String(id)) => Ok(id.clone()),
            _ => {
                let id = Uuid::new_v4().to_string();
                map.insert(FIELD_ID.to_string(), Value::String(id.clone()));
                Ok(id)
            }
        }
    }

    /// Resolve an id read from the index to its stored document.
    fn resolve(&self, id: Result<IVec>) -> Option<Result<(IVec, IVec)>> {
        let id = match id {
            Ok(id) => id,
            Err(e) => return Some(Err(e)),
        };
        match self.tree.get(&id) {
            Ok(Some(bytes)) => Some(Ok((id, bytes))),
            Ok(None) => None,
            Err(e) => Some(Err(e.into())),
        }
    }

    fn candidates(&self, plan: IndexPlan) -> Entries<'_> {
        match plan {
            IndexPlan::Exact(key) => Box::new(
                self.paths
                    .get(key)
                    .map_err(MirrorError::from)
                    .transpose()
                    .into_iter()
                    .filter_map(move |id| self.resolve(id)),
            ),
            IndexPlan::Prefix(key) => Box::new(self.paths.scan_prefix(key).filter_map(
                move |entry| self.resolve(entry.map(|(_, id)| id).map_err(MirrorError::from)),
            )),
            IndexPlan::Scan => Box::new(self.tree.iter().map(|e| e.map_err(MirrorError::from))),
        }
    }

    fn scan(&self, filter: &Filter) -> impl Iterator<Item = Result<(IVec, Value)>> + '_ {
        let filter = filter.clone();
        self.candidates(IndexPlan::of(&filter))
            .filter_map(move |entry| {
                let (key, bytes) = match entry {
                    Ok(kv) => kv,
                    Err(e) => return Some(Err(e)),
                };
                match Self::decode(&bytes) {
                    Ok(doc) if filter.matches(&doc) => Some(Ok((key, doc))),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
    }

    fn first_match(&self, filter: &Filter) -> Result<Option<(IVec, Value)>> {
        self.scan(filter).next().transpose()
    }

    /// Store `doc` under `id`, moving its index entry from `previous` when the path changed.
    fn put(&self, id: &str, doc: &Value, previous: Option<&Value>) -> Result<()> {
        self.tree.insert(id.as_bytes(), serde_json::to_vec(doc)?)?;
        let old_key = previous.and_then(Self::path_key);
        let new_key = Self::path_key(doc);
        if let Some(old_key) = old_key.filter(|k| Some(k) != new_key.as_ref()) {
            self.paths.remove(old_key)?;
        }
        if let Some(new_key) = new_key {
            self.paths.insert(new_key, id.as_bytes())?;
        }
        Ok(())
    }

    fn finish(&self, result: WriteResult) -> Result<WriteResult> {
        if self.flush_on_write {
            self.tree.flush()?;
        }
        Ok(result)
    }
}

impl DocumentCollection for SledCollection {
    fn find(&self, filter: &Filter) -> Result<Vec<Value>> {
        self.scan(filter).map(|r| r.map(|(_, doc)| doc)).collect()
    }

    fn find_one(&self, filter: &Filter) -> Result<Option<Value>> {
        Ok(self.first_match(filter)?.map(|(_, doc)| doc))
    }

    fn insert_many(&self, docs: Vec<Value>) -> Result<WriteResult> {
        let mut batch = sled::Batch::default();
        let mut index = sled::Batch::default();
        let mut inserted = 0;
        for mut doc in docs {
            let key = Self::key_of(&mut doc)?;
            if let Some(path_key) = Self::path_key(&doc) {
                index.insert(path_key, key.as_bytes());
            }
            batch.insert(key.as_bytes(), serde_json::to_vec(&doc)?);
            inserted += 1;
        }
        self.tree.apply_batch(batch)?;
        self.paths.apply_batch(index)?;
        self.finish(WriteResult {
            inserted,
            ..WriteResult::acknowledged()
        })
    }

    fn replace_one(&self, filter: &Filter, mut doc: Value, upsert: bool) -> Result<WriteResult> {
        match self.first_match(filter)? {
            Some((old_key, old_doc)) => {
                if doc.get(FIELD_ID).is_none() {
                    if let Some(id) = old_doc.get(FIELD_ID) {
                        if let Some(map) = doc.as_object_mut() {
                            map.insert(FIELD_ID.to_string(), id.clone());
                        }
                    }
                }
                let key = Self::key_of(&mut doc)?;
                if old_key.as_ref() != key.as_bytes() {
                    self.tree.remove(&old_key)?;
                }
                self.put(&key, &doc, Some(&old_doc))?;
                self.finish(WriteResult {
                    matched: 1,
                    modified: u64::from(old_doc != doc),
                    ..WriteResult::acknowledged()
                })
            }
            None if upsert => {
                let key = Self::key_of(&mut doc)?;
                self.put(&key, &doc, None)?;
                self.finish(WriteResult {
                    upserted_id: Some(key),
                    ..WriteResult::acknowledged()
                })
            }
            None => Ok(WriteResult::acknowledged()),
        }
    }

    fn update_one(&self, filter: &Filter, update: &UpdateSet) -> Result<WriteResult> {
        match self.first_match(filter)? {
            Some((key, mut doc)) => {
                let previous = doc.clone();
                let changed = update.apply(&mut doc);
                if changed {
                    let id = String::from_utf8_lossy(&key).into_owned();
                    self.put(&id, &doc, Some(&previous))?;
                }
                self.finish(WriteResult {
                    matched: 1,
                    modified: u64::from(changed),
                    ..WriteResult::acknowledged()
                })
            }
            None => Ok(WriteResult::acknowledged()),
        }
    }

    fn delete_many(&self, filter: &Filter) -> Result<WriteResult> {
        let matches: Vec<(IVec, Value)> = self.scan(filter).collect::<Result<_>>()?;
        let mut batch = sled::Batch::default();
        let mut index = sled::Batch::default();
        for (key, doc) in &matches {
            batch.remove(key.clone());
            if let Some(path_key) = Self::path_key(doc) {
                index.remove(path_key);
            }
        }
        self.tree.apply_batch(batch)?;
        self.paths.apply_batch(index)?;
        self.finish(WriteResult {
            deleted: matches.len() as u64,
            ..WriteResult::acknowledged()
        })
    }

    fn count(&self, filter: &Filter) -> Result<u64> {
        let mut total = 0;
        for entry in self.scan(filter) {
            entry?;
            total += 1;
        }
        Ok(total)
    }

    fn drop_all(&self) -> Result<()> {
        self.tree.clear()?;
        self.paths.clear()?;
        if self.flush_on_write {
            self.tree.flush()?;
        }
        Ok(())
    }
}
