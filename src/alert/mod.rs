//! Alert decision and dispatch.
//!
//! [`AlertDispatcher`] owns the per-track cooldown records. The order of
//! operations on a fired alert is fixed:
//!
//! 1. the cooldown is stamped (before any I/O, so a failing backend cannot
//!    cause an alert storm);
//! 2. the annotated evidence image is persisted locally;
//! 3. one best-effort delivery is attempted, with the outbox as the only
//!    fallback.
//!
//! Evidence and delivery failures are logged and counted, never propagated.

pub mod evidence;
pub mod outbox;
mod payload;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::detect::{Detection, TrackId};
use crate::frame::Frame;
use crate::transport::AlertSink;

pub use evidence::{DirectoryEvidenceStore, EvidenceCapture, EvidenceRef, EvidenceStore};
pub use outbox::{AlertOutbox, Redelivery};
pub use payload::{AlertPayload, ALERT_TYPE};

pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(3);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);
pub const DEFAULT_CLASSES: [&str; 6] = ["person", "bicycle", "car", "motorcycle", "bus", "truck"];

/// Which detections may alert, and how often.
#[derive(Clone, Debug)]
pub struct AlertPolicy {
    threshold: Duration,
    cooldown: Duration,
    classes: HashSet<String>,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_COOLDOWN, DEFAULT_CLASSES)
    }
}

impl AlertPolicy {
    pub fn new<I, S>(threshold: Duration, cooldown: Duration, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            threshold,
            cooldown,
            classes: classes
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn allows_class(&self, class_label: &str) -> bool {
        self.classes.contains(&class_label.to_ascii_lowercase())
    }

    /// Class is allow-listed and dwell has reached the threshold.
    pub fn is_eligible(&self, class_label: &str, dwell: Duration) -> bool {
        dwell >= self.threshold && self.allows_class(class_label)
    }
}

/// A fired alert, as returned to the frame cycle.
#[derive(Clone, Debug)]
pub struct Alert {
    pub object_id: TrackId,
    pub class_label: String,
    pub confidence: f32,
    pub dwell: Duration,
    pub timestamp: DateTime<Utc>,
    pub camera_id: Option<String>,
    pub evidence: Option<EvidenceRef>,
    /// Public URL of the evidence image; empty when persistence failed.
    pub image_url: String,
    pub delivered: bool,
}

impl Alert {
    pub fn payload(&self) -> AlertPayload {
        AlertPayload::from(self)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub fired: u64,
    pub suppressed: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub evidence_failures: u64,
    pub spooled: u64,
}

pub struct AlertDispatcher {
    policy: AlertPolicy,
    cooldowns: HashMap<TrackId, Instant>,
    evidence: Box<dyn EvidenceStore>,
    sink: Box<dyn AlertSink>,
    outbox: Option<AlertOutbox>,
    camera_id: Option<String>,
    public_base_url: String,
    stats: DispatchStats,
}

impl AlertDispatcher {
    pub fn new(
        policy: AlertPolicy,
        evidence: Box<dyn EvidenceStore>,
        sink: Box<dyn AlertSink>,
    ) -> Self {
        Self {
            policy,
            cooldowns: HashMap::new(),
            evidence,
            sink,
            outbox: None,
            camera_id: None,
            public_base_url: String::new(),
            stats: DispatchStats::default(),
        }
    }

    pub fn with_camera_id(mut self, camera_id: Option<String>) -> Self {
        self.camera_id = camera_id;
        self
    }

    /// Base URL the backend serves the evidence directory under.
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = base.into();
        self
    }

    pub fn with_outbox(mut self, outbox: Option<AlertOutbox>) -> Self {
        self.outbox = outbox;
        self
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    /// Time of the last alert for `id`, if it is still tracked.
    pub fn last_alert(&self, id: TrackId) -> Option<Instant> {
        self.cooldowns.get(&id).copied()
    }

    /// Decide whether `detection` alerts on this frame, and if so persist
    /// evidence and deliver.
    pub fn maybe_alert(
        &mut self,
        detection: &Detection,
        dwell: Duration,
        frame: &Frame,
    ) -> Option<Alert> {
        if !self.policy.is_eligible(&detection.class_label, dwell) {
            return None;
        }
        let id = detection.track_id;
        let now = frame.captured_at();
        if let Some(last) = self.cooldowns.get(&id) {
            if now.saturating_duration_since(*last) < self.policy.cooldown {
                self.stats.suppressed += 1;
                return None;
            }
        }

        self.cooldowns.insert(id, now);
        self.prune_cooldowns(now);
        self.stats.fired += 1;
        log::warn!(
            "ALERT: track {} ({}) in zone for {:.1}s",
            id,
            detection.class_label,
            dwell.as_secs_f64()
        );

        let capture = EvidenceCapture {
            frame,
            detection,
            dwell,
            camera_id: self.camera_id.as_deref(),
        };
        let evidence = match self.evidence.persist(&capture) {
            Ok(evidence) => Some(evidence),
            Err(err) => {
                self.stats.evidence_failures += 1;
                log::warn!("track {}: {}", id, err);
                None
            }
        };
        let image_url = evidence
            .as_ref()
            .map(|e| join_url(&self.public_base_url, &e.filename))
            .unwrap_or_default();

        let mut alert = Alert {
            object_id: id,
            class_label: detection.class_label.clone(),
            confidence: detection.confidence,
            dwell,
            timestamp: frame.wall_clock(),
            camera_id: self.camera_id.clone(),
            evidence,
            image_url,
            delivered: false,
        };

        let payload = alert.payload();
        match self.sink.deliver(&payload) {
            Ok(()) => {
                alert.delivered = true;
                self.stats.delivered += 1;
            }
            Err(err) => {
                self.stats.delivery_failures += 1;
                log::warn!("track {}: {}", id, err);
                if let Some(outbox) = self.outbox.as_mut() {
                    match outbox.enqueue_failed(&payload, now) {
                        Ok(path) => {
                            self.stats.spooled += 1;
                            log::info!("alert spooled to {}", path.display());
                        }
                        Err(err) => log::warn!("alert for track {} lost: {}", id, err),
                    }
                }
            }
        }
        Some(alert)
    }

    /// One outbox redelivery attempt, if an outbox is configured.
    pub fn retry_outbox(&mut self, now: Instant) -> Option<Redelivery> {
        let outbox = self.outbox.as_mut()?;
        Some(outbox.redeliver(self.sink.as_mut(), now))
    }

    /// Expired cooldowns no longer suppress anything.
    fn prune_cooldowns(&mut self, now: Instant) {
        let cooldown = self.policy.cooldown;
        self.cooldowns
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
    }
}

fn join_url(base: &str, filename: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", base, filename)
    }
}
