//! Per-frame pipeline for one camera instance.
//!
//! detect -> dwell update -> alert decision -> stream publish, strictly in
//! that order, one frame at a time. Nothing here is shared across instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbImage;

use crate::alert::{
    Alert, AlertDispatcher, AlertOutbox, AlertPolicy, DirectoryEvidenceStore,
};
use crate::config::EngineConfig;
use crate::detect::{Detection, TrackId, TrackingDetector};
use crate::dwell::DwellTracker;
use crate::error::EngineResult;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::overlay::{Overlay, BOX_CRITICAL, BOX_WARNING, ZONE_CRITICAL, ZONE_SAFE};
use crate::stream::{PublishOutcome, StreamPublisher};
use crate::transport::{alert_sink_for, HttpFrameSink};
use crate::zone::ZonePolygon;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What happened on one processed frame.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub sequence: u64,
    /// Detections kept after the confidence filter.
    pub detections: usize,
    pub dwell: HashMap<TrackId, Duration>,
    pub alerts: Vec<Alert>,
    /// `None` when no stream endpoint is configured.
    pub stream: Option<PublishOutcome>,
}

#[derive(Debug)]
pub enum StepOutcome {
    Processed(CycleReport),
    /// Detector failed on this frame; dwell state untouched.
    Skipped,
    EndOfStream,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub skipped: u64,
    pub alerts: u64,
}

pub struct FrameCycle {
    tracker: DwellTracker,
    dispatcher: AlertDispatcher,
    publisher: Option<StreamPublisher>,
    overlay: Overlay,
    min_confidence: f32,
    frames: u64,
    last_health_log: Option<Instant>,
}

impl FrameCycle {
    pub fn new(tracker: DwellTracker, dispatcher: AlertDispatcher) -> Self {
        Self {
            tracker,
            dispatcher,
            publisher: None,
            overlay: Overlay::new(),
            min_confidence: 0.0,
            frames: 0,
            last_health_log: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Option<StreamPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = overlay;
        self
    }

    /// Detections below this confidence are dropped before the dwell update.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Wire a full instance from configuration.
    pub fn from_config(cfg: &EngineConfig) -> Result<Self> {
        let zone = ZonePolygon::load_or_default(cfg.zone_path.as_deref());
        let tracker = DwellTracker::new(zone.clone(), cfg.dwell.exit_policy);

        let store = DirectoryEvidenceStore::new(&cfg.evidence.dir)
            .with_context(|| format!("open evidence dir {}", cfg.evidence.dir.display()))?
            .with_overlay(Overlay::load(cfg.evidence.font_path.as_deref()))
            .with_zone(zone)
            .with_jpeg_quality(cfg.evidence.jpeg_quality);
        let sink = alert_sink_for(&cfg.alert.url, cfg.alert.timeout)?;
        let outbox = match &cfg.alert.outbox_dir {
            Some(dir) => Some(
                AlertOutbox::open(dir)
                    .with_context(|| format!("open alert outbox {}", dir.display()))?,
            ),
            None => None,
        };
        let policy = AlertPolicy::new(cfg.threshold(), cfg.cooldown(), &cfg.alert.classes);
        let dispatcher = AlertDispatcher::new(policy, Box::new(store), sink)
            .with_camera_id(cfg.camera_id.clone())
            .with_public_base_url(cfg.evidence.public_base_url.clone())
            .with_outbox(outbox);

        let publisher = match &cfg.stream.url {
            Some(url) => {
                let sink = HttpFrameSink::new(url, cfg.stream.timeout)?;
                log::info!("publishing live view to {}", url);
                Some(
                    StreamPublisher::new(Box::new(sink), cfg.stream.interval)
                        .with_jpeg_quality(cfg.stream.jpeg_quality),
                )
            }
            None => {
                log::info!("no stream url configured; live view disabled");
                None
            }
        };

        Ok(Self::new(tracker, dispatcher)
            .with_publisher(publisher)
            .with_overlay(Overlay::load(cfg.evidence.font_path.as_deref()))
            .with_min_confidence(cfg.alert.min_confidence))
    }

    pub fn tracker(&self) -> &DwellTracker {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub fn publisher(&self) -> Option<&StreamPublisher> {
        self.publisher.as_ref()
    }

    /// Run one pass over a frame whose detections are already known.
    pub fn process(&mut self, frame: &Frame, detections: Vec<Detection>) -> CycleReport {
        let now = frame.captured_at();
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.min_confidence)
            .collect();
        let dwell = self.tracker.update(&detections, now);

        // Duplicate ids: the last detection wins, matching the tracker.
        let mut latest: HashMap<TrackId, &Detection> = HashMap::new();
        for det in &detections {
            latest.insert(det.track_id, det);
        }

        let mut alerts = Vec::new();
        let mut alarm = false;
        for (id, elapsed) in &dwell {
            let Some(det) = latest.get(id) else {
                continue;
            };
            if !self.dispatcher.policy().is_eligible(&det.class_label, *elapsed) {
                continue;
            }
            alarm = true;
            if let Some(alert) = self.dispatcher.maybe_alert(det, *elapsed, frame) {
                alerts.push(alert);
            }
        }

        self.dispatcher.retry_outbox(now);

        let stream = match self.publisher.as_mut() {
            Some(publisher) if publisher.is_due(now) => {
                let canvas = annotate(
                    &self.overlay,
                    self.tracker.zone(),
                    self.dispatcher.policy(),
                    frame,
                    &latest,
                    &dwell,
                    alarm,
                );
                Some(publisher.maybe_publish(&canvas, now))
            }
            Some(_) => Some(PublishOutcome::Throttled),
            None => None,
        };

        self.frames += 1;
        let report = CycleReport {
            sequence: frame.sequence(),
            detections: detections.len(),
            dwell,
            alerts,
            stream,
        };
        log::debug!(
            "frame {}: {} detections, {} in zone, {} alerts",
            report.sequence,
            report.detections,
            report.dwell.len(),
            report.alerts.len()
        );
        report
    }

    /// Pull one frame and its detections, then process it.
    ///
    /// A read failure on a connected source skips the frame; the source
    /// reconnects on its own. Only `connect` failures are fatal.
    pub fn step(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn TrackingDetector,
    ) -> EngineResult<StepOutcome> {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(StepOutcome::EndOfStream),
            Err(err) => {
                log::warn!("{}; frame skipped", err);
                return Ok(StepOutcome::Skipped);
            }
        };
        match detector.detect(&frame) {
            Ok(detections) => Ok(StepOutcome::Processed(self.process(&frame, detections))),
            Err(_) if detector.is_exhausted() => Ok(StepOutcome::EndOfStream),
            Err(err) => {
                log::warn!("{}; skipping frame {}", err, frame.sequence());
                Ok(StepOutcome::Skipped)
            }
        }
    }

    /// Loop until end-of-stream or `shutdown` is set.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        detector: &mut dyn TrackingDetector,
        shutdown: &AtomicBool,
    ) -> EngineResult<RunSummary> {
        let mut summary = RunSummary::default();
        while !shutdown.load(Ordering::SeqCst) {
            match self.step(source, detector)? {
                StepOutcome::Processed(report) => {
                    summary.frames += 1;
                    summary.alerts += report.alerts.len() as u64;
                }
                StepOutcome::Skipped => summary.skipped += 1,
                StepOutcome::EndOfStream => {
                    log::info!("end of stream after {} frames", summary.frames);
                    break;
                }
            }
            self.log_health(source, Instant::now());
        }
        Ok(summary)
    }

    fn log_health(&mut self, source: &dyn FrameSource, now: Instant) {
        if let Some(last) = self.last_health_log {
            if now.saturating_duration_since(last) < HEALTH_LOG_INTERVAL {
                return;
            }
        }
        self.last_health_log = Some(now);
        let source_stats = source.stats();
        let alerts = self.dispatcher.stats();
        let stream = self.publisher.as_ref().map(|p| p.stats()).unwrap_or_default();
        log::info!(
            "source={} healthy={} frames={} processed={} tracked={} alerts fired={} suppressed={} delivered={} failed={} evidence_failures={} stream ok={} failed={}",
            source_stats.source,
            source.is_healthy(),
            source_stats.frames_captured,
            self.frames,
            self.tracker.len(),
            alerts.fired,
            alerts.suppressed,
            alerts.delivered,
            alerts.delivery_failures,
            alerts.evidence_failures,
            stream.published,
            stream.failed
        );
    }
}

/// Live-view annotation: zone outline plus boxes for in-zone objects.
fn annotate(
    overlay: &Overlay,
    zone: &ZonePolygon,
    policy: &AlertPolicy,
    frame: &Frame,
    latest: &HashMap<TrackId, &Detection>,
    dwell: &HashMap<TrackId, Duration>,
    alarm: bool,
) -> RgbImage {
    let mut canvas = frame.to_canvas();
    overlay.draw_zone(&mut canvas, zone, if alarm { ZONE_CRITICAL } else { ZONE_SAFE });
    for (id, elapsed) in dwell {
        let Some(det) = latest.get(id) else {
            continue;
        };
        let color = if policy.is_eligible(&det.class_label, *elapsed) {
            BOX_CRITICAL
        } else {
            BOX_WARNING
        };
        overlay.draw_box(&mut canvas, &det.bbox, color);
        let label = format!("ID:{} {} {:.1}s", id, det.class_label, elapsed.as_secs_f64());
        overlay.draw_label(&mut canvas, &det.bbox, &label, color);
    }
    canvas
}
