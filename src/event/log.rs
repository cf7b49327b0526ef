//! Audit log of raw change events.
//!
//! Every event is stored before it is applied to the mirror. The log is
//! append-only and keyed by `(transaction id, sequence within batch)`; nothing
//! replays it.

use super::{ChangeEvent, EventKind, TransactionId};
use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub transaction_id: TransactionId,
    pub sequence: u32,
    pub event_type: EventKind,
    pub event: ChangeEvent,
}

impl EventRecord {
    /// Decode a stored record. An unknown `eventType` is reported as
    /// [`MirrorError::UnsupportedEvent`] rather than a generic decode failure.
    pub fn from_document(doc: Value) -> Result<Self> {
        if let Some(kind) = doc.get("eventType").and_then(Value::as_str) {
            kind.parse::<EventKind>()?;
        }
        Ok(serde_json::from_value(doc)?)
    }
}

pub struct EventLog {
    tree: sled::Tree,
}

impl EventLog {
    pub fn open(db: &sled::Db, name: &str) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(name)?,
        })
    }

    fn key(transaction_id: TransactionId, sequence: u32) -> [u8; 12] {
        let mut key = [0u8; 12];
        // flip the sign bit so negative ids still sort before positive ones
        key[..8].copy_from_slice(&((transaction_id as u64) ^ (1 << 63)).to_be_bytes());
        key[8..].copy_from_slice(&sequence.to_be_bytes());
        key
    }

    pub fn record(
        &self,
        transaction_id: TransactionId,
        sequence: u32,
        event: &ChangeEvent,
    ) -> Result<()> {
        let record = EventRecord {
            transaction_id,
            sequence,
            event_type: event.kind(),
            event: event.clone(),
        };
        let bytes = serde_json::to_vec(&record)?;
        self.tree.insert(Self::key(transaction_id, sequence), bytes)?;
        debug!(transaction_id, sequence, kind = %event.kind(), "Recorded event");
        Ok(())
    }

    /// All records in transaction order.
    pub fn records(&self) -> Result<Vec<EventRecord>> {
        self.tree
            .iter()
            .values()
            .map(|bytes| {
                let bytes = bytes?;
                let doc: Value = serde_json::from_slice(&bytes)?;
                EventRecord::from_document(doc)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        self.tree.clear().map_err(MirrorError::from)
    }
}
