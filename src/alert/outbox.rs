//! Durable spool for alerts the backend did not accept.
//!
//! Off unless `alert.outbox_dir` is configured. Each undelivered payload is
//! written atomically as one JSON file; redelivery takes the oldest entry, at
//! most one per frame cycle, with exponential backoff and jitter between
//! failed attempts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;

use super::evidence::write_atomic;
use super::AlertPayload;
use crate::error::{EngineError, EngineResult};
use crate::transport::AlertSink;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);
const ENTRY_SUFFIX: &str = ".json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Redelivery {
    /// Nothing spooled.
    Idle,
    /// Backing off after a failure.
    Waiting,
    Delivered,
    Failed,
}

pub struct AlertOutbox {
    dir: PathBuf,
    max_entries: usize,
    seq: u64,
    failures: u32,
    next_attempt: Option<Instant>,
}

impl AlertOutbox {
    pub fn open(dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            EngineError::EvidencePersistence(format!("create outbox {}: {}", dir.display(), e))
        })?;
        let outbox = Self {
            dir,
            max_entries: DEFAULT_MAX_ENTRIES,
            seq: 0,
            failures: 0,
            next_attempt: None,
        };
        let pending = outbox.pending()?.len();
        if pending > 0 {
            log::info!(
                "outbox {} holds {} undelivered alerts",
                outbox.dir.display(),
                pending
            );
        }
        Ok(outbox)
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Spooled entries, oldest first.
    pub fn pending(&self) -> EngineResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            EngineError::EvidencePersistence(format!("list outbox {}: {}", self.dir.display(), e))
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(ENTRY_SUFFIX))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    pub fn len(&self) -> usize {
        self.pending().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spool one payload. The oldest entries are dropped once the cap is hit.
    pub fn enqueue(&mut self, payload: &AlertPayload) -> EngineResult<PathBuf> {
        let pending = self.pending()?;
        if pending.len() >= self.max_entries {
            let excess = pending.len() + 1 - self.max_entries;
            for old in pending.iter().take(excess) {
                log::warn!("outbox full; dropping {}", old.display());
                let _ = fs::remove_file(old);
            }
        }

        self.seq += 1;
        let name = format!(
            "{:013}_{:06}_id{}{}",
            Utc::now().timestamp_millis().max(0),
            self.seq,
            payload.object_id,
            ENTRY_SUFFIX
        );
        let path = self.dir.join(name);
        let json = serde_json::to_vec(payload)
            .map_err(|e| EngineError::EvidencePersistence(format!("encode outbox entry: {}", e)))?;
        write_atomic(&path, &json).map_err(|e| {
            EngineError::EvidencePersistence(format!("write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }

    /// Spool a payload whose live delivery just failed at `now`. The failure
    /// counts toward backoff, so redelivery waits at least one backoff step.
    pub fn enqueue_failed(&mut self, payload: &AlertPayload, now: Instant) -> EngineResult<PathBuf> {
        let path = self.enqueue(payload)?;
        let backing_off = matches!(self.next_attempt, Some(next) if next > now);
        if !backing_off {
            self.back_off(now);
        }
        Ok(path)
    }

    /// Try to hand the oldest spooled alert to `sink`.
    pub fn redeliver(&mut self, sink: &mut dyn AlertSink, now: Instant) -> Redelivery {
        if let Some(next) = self.next_attempt {
            if now < next {
                return Redelivery::Waiting;
            }
        }
        let oldest = match self.pending() {
            Ok(pending) => match pending.into_iter().next() {
                Some(path) => path,
                None => return Redelivery::Idle,
            },
            Err(err) => {
                log::warn!("{}", err);
                return self.back_off(now);
            }
        };

        let payload: AlertPayload = match fs::read(&oldest)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_slice(&raw).map_err(|e| e.to_string()))
        {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("discarding unreadable outbox entry {}: {}", oldest.display(), err);
                let _ = fs::remove_file(&oldest);
                return Redelivery::Failed;
            }
        };

        match sink.deliver(&payload) {
            Ok(()) => {
                if let Err(err) = fs::remove_file(&oldest) {
                    log::warn!("delivered but could not remove {}: {}", oldest.display(), err);
                }
                log::info!("redelivered spooled alert for track {}", payload.object_id);
                self.failures = 0;
                self.next_attempt = None;
                Redelivery::Delivered
            }
            Err(err) => {
                log::debug!("outbox redelivery failed: {}", err);
                self.back_off(now)
            }
        }
    }

    fn back_off(&mut self, now: Instant) -> Redelivery {
        self.failures = self.failures.saturating_add(1);
        let delay = backoff_delay(self.failures);
        self.next_attempt = Some(now + delay);
        Redelivery::Failed
    }
}

/// `base * 2^(failures-1)`, capped, plus up to 25% jitter.
fn backoff_delay(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    let delay = BACKOFF_BASE.saturating_mul(1u32 << exp).min(BACKOFF_MAX);
    let jitter = rand::thread_rng().gen_range(0.0..0.25);
    delay + delay.mul_f64(jitter)
}
