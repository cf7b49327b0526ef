//! Mirror Manager
//!
//! Startup and shutdown sequence. Startup clears the store and the audit log,
//! indexes the namespace synchronously and only then starts the event processor.
//! Any startup error is returned to the caller and nothing keeps running.

use crate::error::{MirrorError, Result};
use crate::event::log::EventLog;
use crate::indexer::{IndexStats, TreeIndexer};
use crate::namespace::{EventStream, NamespaceSource};
use crate::path::InodePath;
use crate::processor::{EventProcessor, ProcessorHandle};
use crate::store::MetadataStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub struct MirrorManager {
    store: Arc<MetadataStore>,
    source: Arc<dyn NamespaceSource>,
    audit: Option<Arc<EventLog>>,
    root: InodePath,
    poll_interval: Duration,
    temporary_suffix: String,
    handle: Option<ProcessorHandle>,
}

impl MirrorManager {
    pub fn new(store: Arc<MetadataStore>, source: Arc<dyn NamespaceSource>, root: InodePath) -> Self {
        Self {
            store,
            source,
            audit: None,
            root,
            poll_interval: Duration::from_millis(crate::processor::MIN_POLL_INTERVAL_MS),
            temporary_suffix: crate::processor::DEFAULT_TEMPORARY_SUFFIX.to_string(),
            handle: None,
        }
    }

    pub fn with_audit_log(mut self, log: Arc<EventLog>) -> Self {
        self.audit = Some(log);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_temporary_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temporary_suffix = suffix.into();
        self
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, ProcessorHandle::is_running)
    }

    /// Rebuild the mirror from scratch without starting the processor.
    pub fn reindex(&self) -> Result<IndexStats> {
        let start = Instant::now();
        self.store.clear()?;
        if let Some(log) = &self.audit {
            log.clear()?;
        }
        let (_, stats) = TreeIndexer::new(self.source.as_ref(), &self.store).index(&self.root)?;
        info!(
            root = %self.root,
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "Mirror rebuilt"
        );
        Ok(stats)
    }

    /// Rebuild the mirror, then follow `stream`.
    pub fn start(&mut self, stream: Box<dyn EventStream>) -> Result<IndexStats> {
        if self.handle.is_some() {
            return Err(MirrorError::Processor("mirror already started".to_string()));
        }
        let stats = self.reindex()?;
        let mut processor = EventProcessor::new(Arc::clone(&self.store))
            .with_source(Arc::clone(&self.source))
            .with_temporary_suffix(self.temporary_suffix.clone())
            .with_poll_interval(self.poll_interval);
        if let Some(log) = &self.audit {
            processor = processor.with_audit_log(Arc::clone(log));
        }
        self.handle = Some(processor.start(stream)?);
        Ok(stats)
    }

    /// Stop the processor and wait for it; returns the error that ended it, if any.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let start = Instant::now();
        let result = handle.shutdown();
        info!(
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "Mirror stopped"
        );
        result
    }
}

impl Drop for MirrorManager {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.stop();
        }
    }
}
