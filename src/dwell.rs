//! Per-track dwell timing.
//!
//! A track's dwell is the continuous time it has been inside the zone:
//! `now - entry`, never accumulated across exits. Which frames count as an
//! exit is governed by [`ExitPolicy`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::detect::{Detection, TrackId};
use crate::zone::ZonePolygon;

/// How a tracked id that is missing from the zone on a frame is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Drop the record on the first frame the id is not seen in the zone.
    #[default]
    Immediate,
    /// Keep the record (and its entry time) across up to `max_missed_frames`
    /// consecutive frames where the id is not seen in the zone.
    Grace { max_missed_frames: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DwellRecord {
    entered_at: Instant,
    missed_frames: u32,
}

/// Owned dwell state for one camera instance.
pub struct DwellTracker {
    zone: ZonePolygon,
    policy: ExitPolicy,
    records: HashMap<TrackId, DwellRecord>,
}

impl DwellTracker {
    pub fn new(zone: ZonePolygon, policy: ExitPolicy) -> Self {
        Self {
            zone,
            policy,
            records: HashMap::new(),
        }
    }

    pub fn zone(&self) -> &ZonePolygon {
        &self.zone
    }

    pub fn policy(&self) -> ExitPolicy {
        self.policy
    }

    /// Advance the tracker by one frame.
    ///
    /// Returns the dwell of every id whose center is inside the zone on this
    /// frame. A frame with no detections at all is a tracking loss and clears
    /// every record, whatever the policy.
    pub fn update(
        &mut self,
        detections: &[Detection],
        now: Instant,
    ) -> HashMap<TrackId, Duration> {
        if detections.is_empty() {
            if !self.records.is_empty() {
                log::debug!("empty frame: clearing {} dwell records", self.records.len());
            }
            self.records.clear();
            return HashMap::new();
        }

        let mut in_zone: HashMap<TrackId, bool> = HashMap::with_capacity(detections.len());
        for det in detections {
            // Duplicate ids within a frame: last write wins.
            in_zone.insert(det.track_id, self.zone.contains(det.center()));
        }

        let policy = self.policy;
        self.records.retain(|id, record| {
            if in_zone.get(id).copied().unwrap_or(false) {
                record.missed_frames = 0;
                return true;
            }
            match policy {
                ExitPolicy::Immediate => false,
                ExitPolicy::Grace { max_missed_frames } => {
                    record.missed_frames += 1;
                    record.missed_frames <= max_missed_frames
                }
            }
        });

        let mut dwell = HashMap::new();
        for (id, inside) in in_zone {
            if !inside {
                continue;
            }
            let record = self.records.entry(id).or_insert_with(|| {
                log::debug!("track {} entered zone", id);
                DwellRecord {
                    entered_at: now,
                    missed_frames: 0,
                }
            });
            dwell.insert(id, now.saturating_duration_since(record.entered_at));
        }
        dwell
    }

    /// Entry time of a tracked id, if it currently has a record.
    pub fn entry_of(&self, id: TrackId) -> Option<Instant> {
        self.records.get(&id).map(|r| r.entered_at)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
