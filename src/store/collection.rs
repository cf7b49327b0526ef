//! Document collection interface.
//!
//! The operations the mirror needs from a document store. Every write reports
//! whether the store acknowledged it together with matched/modified/deleted
//! counts; callers decide what an unacknowledged write means.

use super::filter::Filter;
use super::update::UpdateSet;
use crate::error::Result;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub acknowledged: bool,
    pub matched: u64,
    pub modified: u64,
    pub inserted: u64,
    pub deleted: u64,
    pub upserted_id: Option<String>,
}

impl WriteResult {
    pub fn acknowledged() -> Self {
        Self {
            acknowledged: true,
            ..Self::default()
        }
    }
}

pub trait DocumentCollection: Send + Sync {
    /// All documents matching `filter`.
    fn find(&self, filter: &Filter) -> Result<Vec<Value>>;

    fn find_one(&self, filter: &Filter) -> Result<Option<Value>> {
        Ok(self.find(filter)?.into_iter().next())
    }

    fn insert_one(&self, doc: Value) -> Result<WriteResult> {
        self.insert_many(vec![doc])
    }

    fn insert_many(&self, docs: Vec<Value>) -> Result<WriteResult>;

    /// Replace the first match with `doc`; insert it when nothing matches and `upsert` is set.
    fn replace_one(&self, filter: &Filter, doc: Value, upsert: bool) -> Result<WriteResult>;

    /// Apply `update` to the first match.
    fn update_one(&self, filter: &Filter, update: &UpdateSet) -> Result<WriteResult>;

    fn delete_many(&self, filter: &Filter) -> Result<WriteResult>;

    fn count(&self, filter: &Filter) -> Result<u64> {
        Ok(self.find(filter)?.len() as u64)
    }

    /// Remove every document.
    fn drop_all(&self) -> Result<()>;
}
