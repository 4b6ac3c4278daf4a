//! JSON-lines alert sink.
//!
//! Appends one payload per line. Used by the replay tool and for offline
//! deployments where the backend picks alerts up from disk.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::AlertSink;
use crate::alert::AlertPayload;
use crate::error::{EngineError, EngineResult};

pub struct JsonlAlertSink {
    path: PathBuf,
}

impl JsonlAlertSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertSink for JsonlAlertSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn deliver(&mut self, payload: &AlertPayload) -> EngineResult<()> {
        let mut line = serde_json::to_vec(payload)
            .map_err(|e| EngineError::Delivery(format!("encode alert: {}", e)))?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                EngineError::Delivery(format!("open {}: {}", self.path.display(), e))
            })?;
        file.write_all(&line)
            .map_err(|e| EngineError::Delivery(format!("append {}: {}", self.path.display(), e)))
    }
}
