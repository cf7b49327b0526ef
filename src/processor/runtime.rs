//! Processor thread.
//!
//! Polls an [`EventStream`] on a dedicated thread. When the stream is idle the
//! thread sleeps the base interval plus a random jitter of up to the base. Any
//! error is terminal: it is logged, the running flag is cleared and the thread
//! ends.

use super::EventProcessor;
use crate::error::{MirrorError, Result};
use crate::namespace::EventStream;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

pub struct ProcessorHandle {
    running: Arc<RwLock<bool>>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ProcessorHandle {
    /// Whether the thread is still polling.
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Ask the thread to stop after its current iteration.
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Wait for the thread to end and return how it ended.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| MirrorError::Processor("processor thread panicked".to_string()))?,
            None => Ok(()),
        }
    }

    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join()
    }
}

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl EventProcessor {
    /// Move the processor onto its own thread, consuming `stream`.
    pub fn start(self, stream: Box<dyn EventStream>) -> Result<ProcessorHandle> {
        let poll_interval_ms = self.poll_interval.as_millis() as u64;
        let running = Arc::new(RwLock::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("nsmirror-processor".to_string())
            .spawn(move || self.run(stream, flag))
            .map_err(|e| MirrorError::Processor(format!("failed to spawn thread: {}", e)))?;
        info!(poll_interval_ms, "Event processor started");
        Ok(ProcessorHandle {
            running,
            thread: Some(thread),
        })
    }

    fn run(self, mut stream: Box<dyn EventStream>, running: Arc<RwLock<bool>>) -> Result<()> {
        let base = self.poll_interval.as_millis() as u64;
        let mut rng = rand::thread_rng();
        while *running.read() {
            match self.poll_once(stream.as_mut()) {
                Ok(true) => {}
                Ok(false) => {
                    let pause = base + rng.gen_range(0..base);
                    std::thread::sleep(Duration::from_millis(pause));
                }
                Err(e) => {
                    error!(error = %e, "Event processor failed, stopping");
                    *running.write() = false;
                    return Err(e);
                }
            }
        }
        debug!("Event processor stopped");
        Ok(())
    }

    /// Apply the next available batch; `false` when the stream had nothing.
    fn poll_once(&self, stream: &mut dyn EventStream) -> Result<bool> {
        match stream.poll()? {
            Some(batch) => {
                self.apply_batch(&batch)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
