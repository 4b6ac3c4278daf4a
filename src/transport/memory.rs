//! In-memory sinks for tests and dry runs.
//!
//! Clones share the same buffer, so a test keeps one handle and gives the
//! other to the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{AlertSink, FrameSink};
use crate::alert::AlertPayload;
use crate::error::{EngineError, EngineResult};

#[derive(Clone, Default)]
pub struct MemoryAlertSink {
    delivered: Arc<Mutex<Vec<AlertPayload>>>,
    attempts: Arc<Mutex<usize>>,
    failing: Arc<AtomicBool>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<AlertPayload> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|guard| *guard).unwrap_or(0)
    }
}

impl AlertSink for MemoryAlertSink {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn deliver(&mut self, payload: &AlertPayload) -> EngineResult<()> {
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Delivery("memory sink set to fail".into()));
        }
        let mut delivered = self
            .delivered
            .lock()
            .map_err(|_| EngineError::Delivery("memory sink poisoned".into()))?;
        delivered.push(payload.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryFrameSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> usize {
        self.frames.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn last(&self) -> Option<Vec<u8>> {
        self.frames
            .lock()
            .ok()
            .and_then(|guard| guard.last().cloned())
    }
}

impl FrameSink for MemoryFrameSink {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn publish(&mut self, jpeg: &[u8]) -> EngineResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Delivery("memory sink set to fail".into()));
        }
        let mut frames = self
            .frames
            .lock()
            .map_err(|_| EngineError::Delivery("memory sink poisoned".into()))?;
        frames.push(jpeg.to_vec());
        Ok(())
    }
}
