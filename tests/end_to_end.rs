use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use railguard_engine::alert::ALERT_TYPE;
use railguard_engine::ingest::synthetic::SyntheticSource;
use railguard_engine::transport::{MemoryAlertSink, MemoryFrameSink};
use railguard_engine::{
    AlertDispatcher, AlertOutbox, AlertPolicy, BoundingBox, DirectoryEvidenceStore, Detection,
    DwellTracker, ExitPolicy, Frame, FrameCycle, Point, ScriptedDetector, SourceConfig,
    StreamPublisher, ZonePolygon,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

struct Rig {
    cycle: FrameCycle,
    alerts: MemoryAlertSink,
    evidence_dir: TempDir,
    base: Instant,
    wall: DateTime<Utc>,
    sequence: u64,
}

impl Rig {
    fn new(policy: ExitPolicy) -> Self {
        Self::build(policy, None)
    }

    fn build(policy: ExitPolicy, outbox: Option<AlertOutbox>) -> Self {
        let evidence_dir = TempDir::new().unwrap();
        let alerts = MemoryAlertSink::new();
        let store = DirectoryEvidenceStore::new(evidence_dir.path())
            .unwrap()
            .with_zone(zone());
        let dispatcher = AlertDispatcher::new(
            AlertPolicy::new(Duration::from_secs(3), Duration::from_secs(5), ["person"]),
            Box::new(store),
            Box::new(alerts.clone()),
        )
        .with_camera_id(Some("cam-test".to_string()))
        .with_public_base_url("http://backend.local/evidence")
        .with_outbox(outbox);
        let cycle = FrameCycle::new(DwellTracker::new(zone(), policy), dispatcher);
        Self {
            cycle,
            alerts,
            evidence_dir,
            base: Instant::now(),
            wall: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            sequence: 0,
        }
    }

    /// Process one frame captured `ms` after the rig's base time.
    fn at(&mut self, ms: u64, detections: Vec<Detection>) -> usize {
        self.sequence += 1;
        let offset = Duration::from_millis(ms);
        let frame = Frame::blank(
            WIDTH,
            HEIGHT,
            self.sequence,
            self.base + offset,
            self.wall + chrono::Duration::milliseconds(ms as i64),
        );
        self.cycle.process(&frame, detections).alerts.len()
    }

    fn evidence_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.evidence_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".jpg"))
            .collect();
        names.sort();
        names
    }
}

fn zone() -> ZonePolygon {
    ZonePolygon::new(vec![
        Point::new(100, 100),
        Point::new(500, 100),
        Point::new(500, 400),
        Point::new(100, 400),
    ])
    .unwrap()
}

/// Detection centered at (`cx`, 250).
fn at_x(id: i64, class: &str, cx: i32) -> Detection {
    Detection::new(id, class, 0.9, BoundingBox::new(cx - 20, 200, cx + 20, 300))
}

fn inside(id: i64) -> Detection {
    at_x(id, "person", 300)
}

fn outside(id: i64) -> Detection {
    at_x(id, "person", 600)
}

#[test]
fn alerts_at_threshold_then_respects_cooldown() {
    let mut rig = Rig::new(ExitPolicy::Immediate);

    for ms in [0, 1000, 2000, 2900] {
        assert_eq!(rig.at(ms, vec![inside(7)]), 0, "no alert at {}ms", ms);
    }
    assert_eq!(rig.at(3000, vec![inside(7)]), 1);
    assert_eq!(rig.at(4500, vec![inside(7)]), 0);
    assert_eq!(rig.at(7900, vec![inside(7)]), 0);
    assert_eq!(rig.at(8100, vec![inside(7)]), 1);

    let delivered = rig.alerts.delivered();
    assert_eq!(delivered.len(), 2);
    let first = &delivered[0];
    assert_eq!(first.kind, ALERT_TYPE);
    assert_eq!(first.object_id, 7);
    assert_eq!(first.object_class, "person");
    assert!(first.in_roi);
    assert!((first.duration_seconds - 3.0).abs() < 1e-9);
    assert_eq!(first.camera_id.as_deref(), Some("cam-test"));
    assert!((delivered[1].duration_seconds - 8.1).abs() < 1e-9);

    let files = rig.evidence_files();
    assert_eq!(files.len(), 2);
    assert_eq!(
        first.image_url,
        format!("http://backend.local/evidence/{}", files[0])
    );
    assert!(files[0].contains("cam-test"));
    assert!(files[0].contains("id7"));

    let stats = rig.cycle.dispatcher().stats();
    assert_eq!(stats.fired, 2);
    assert_eq!(stats.suppressed, 2);
    assert_eq!(stats.delivered, 2);
}

#[test]
fn empty_frame_resets_dwell() {
    let mut rig = Rig::new(ExitPolicy::Grace {
        max_missed_frames: 5,
    });

    for ms in [0, 1000, 2500] {
        rig.at(ms, vec![inside(3)]);
    }
    assert_eq!(rig.at(2600, Vec::new()), 0);
    assert!(rig.cycle.tracker().is_empty());

    rig.at(2700, vec![inside(3)]);
    assert_eq!(rig.at(5000, vec![inside(3)]), 0);
    assert_eq!(rig.at(5700, vec![inside(3)]), 1);
}

#[test]
fn leaving_the_zone_restarts_the_clock() {
    let mut rig = Rig::new(ExitPolicy::Immediate);

    rig.at(0, vec![inside(11)]);
    rig.at(1000, vec![inside(11)]);
    rig.at(2000, vec![outside(11)]);
    assert_eq!(rig.cycle.tracker().entry_of(11), None);

    rig.at(2500, vec![inside(11)]);
    assert_eq!(rig.at(5000, vec![inside(11)]), 0);
    assert_eq!(rig.at(5500, vec![inside(11)]), 1);
}

#[test]
fn grace_policy_tolerates_brief_misses() {
    let mut rig = Rig::new(ExitPolicy::Grace {
        max_missed_frames: 2,
    });

    rig.at(0, vec![inside(4)]);
    // Another object keeps the frame non-empty while track 4 is briefly lost.
    rig.at(1000, vec![outside(9)]);
    rig.at(2000, vec![outside(9)]);
    assert_eq!(rig.at(3000, vec![inside(4)]), 1);
}

#[test]
fn classes_outside_the_allow_list_never_alert() {
    let mut rig = Rig::new(ExitPolicy::Immediate);

    for ms in (0..=10_000).step_by(500) {
        assert_eq!(rig.at(ms, vec![at_x(21, "dog", 300)]), 0);
    }
    assert!(rig.alerts.delivered().is_empty());
    assert!(rig.evidence_files().is_empty());
}

#[test]
fn tracks_alert_independently() {
    let mut rig = Rig::new(ExitPolicy::Immediate);

    rig.at(0, vec![inside(1)]);
    rig.at(1000, vec![inside(1), inside(2)]);
    assert_eq!(rig.at(3000, vec![inside(1), inside(2)]), 1);
    assert_eq!(rig.at(4000, vec![inside(1), inside(2)]), 1);

    let ids: Vec<i64> = rig.alerts.delivered().iter().map(|p| p.object_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn delivery_failure_keeps_evidence_and_cooldown() {
    let mut rig = Rig::new(ExitPolicy::Immediate);
    rig.alerts.set_failing(true);

    rig.at(0, vec![inside(7)]);
    assert_eq!(rig.at(3000, vec![inside(7)]), 1);
    assert_eq!(rig.evidence_files().len(), 1);
    assert_eq!(rig.cycle.dispatcher().stats().delivery_failures, 1);

    rig.alerts.set_failing(false);
    assert_eq!(rig.at(4000, vec![inside(7)]), 0);
    assert_eq!(rig.alerts.attempts(), 1);
    assert!(rig.alerts.delivered().is_empty());
}

#[test]
fn outbox_redelivers_after_backend_recovers() {
    let spool = TempDir::new().unwrap();
    let outbox = AlertOutbox::open(spool.path()).unwrap();
    let mut rig = Rig::build(ExitPolicy::Immediate, Some(outbox));
    rig.alerts.set_failing(true);

    rig.at(0, vec![inside(7)]);
    assert_eq!(rig.at(3000, vec![inside(7)]), 1);
    assert_eq!(rig.cycle.dispatcher().stats().spooled, 1);
    // One live attempt; the spooled copy waits out the backoff.
    assert_eq!(rig.alerts.attempts(), 1);

    rig.alerts.set_failing(false);
    rig.at(3500, vec![inside(7)]);
    assert_eq!(rig.alerts.attempts(), 1);

    // First backoff step is at most 1.25s.
    rig.at(4500, vec![inside(7)]);

    let delivered = rig.alerts.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].object_id, 7);
    let left = std::fs::read_dir(spool.path()).unwrap().count();
    assert_eq!(left, 0);
}

#[test]
fn stream_publishes_on_interval_regardless_of_alerts() {
    let frames = MemoryFrameSink::new();
    let evidence_dir = TempDir::new().unwrap();
    let dispatcher = AlertDispatcher::new(
        AlertPolicy::default(),
        Box::new(DirectoryEvidenceStore::new(evidence_dir.path()).unwrap()),
        Box::new(MemoryAlertSink::new()),
    );
    let publisher = StreamPublisher::new(Box::new(frames.clone()), Duration::from_millis(100));
    let mut cycle = FrameCycle::new(DwellTracker::new(zone(), ExitPolicy::Immediate), dispatcher)
        .with_publisher(Some(publisher));

    let base = Instant::now();
    let wall = Utc::now();
    for (seq, ms) in [0u64, 10, 200, 250, 300].into_iter().enumerate() {
        let frame = Frame::blank(
            WIDTH,
            HEIGHT,
            seq as u64,
            base + Duration::from_millis(ms),
            wall,
        );
        cycle.process(&frame, Vec::new());
    }

    assert_eq!(frames.published(), 3);
    let last = frames.last().unwrap();
    assert_eq!(&last[..2], &[0xFF, 0xD8]);
}

#[test]
fn run_stops_when_detections_run_out() {
    let evidence_dir = TempDir::new().unwrap();
    let alerts = MemoryAlertSink::new();
    let dispatcher = AlertDispatcher::new(
        AlertPolicy::default(),
        Box::new(DirectoryEvidenceStore::new(evidence_dir.path()).unwrap()),
        Box::new(alerts.clone()),
    );
    let mut cycle = FrameCycle::new(DwellTracker::new(zone(), ExitPolicy::Immediate), dispatcher);

    let mut source = SyntheticSource::new(SourceConfig {
        url: "stub://e2e".to_string(),
        target_fps: 200,
        width: 320,
        height: 240,
        ..SourceConfig::default()
    });
    let mut detector = ScriptedDetector::new(vec![vec![inside(1)], Vec::new(), vec![inside(1)]]);
    let shutdown = AtomicBool::new(false);

    let summary = cycle.run(&mut source, &mut detector, &shutdown).unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.alerts, 0);
    assert!(alerts.delivered().is_empty());
}
