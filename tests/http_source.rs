use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use railguard_engine::frame::encode_jpeg;
use railguard_engine::ingest::HttpJpegSource;
use railguard_engine::transport::MemoryAlertSink;
use railguard_engine::{
    AlertDispatcher, AlertPolicy, DirectoryEvidenceStore, DwellTracker, ExitPolicy, FrameCycle,
    FrameSource, ScriptedDetector, SourceConfig, StepOutcome, ZonePolygon,
};

#[derive(Clone, Copy)]
enum Reply {
    Snapshot,
    Hangup,
}

/// Snapshot camera answering one connection per entry in `plan`.
fn camera(plan: Vec<Reply>) -> (String, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let jpeg = encode_jpeg(&RgbImage::from_pixel(32, 24, Rgb([10, 200, 30])), 80).unwrap();
    let handle = thread::spawn(move || {
        let mut served = 0;
        for reply in plan {
            let (stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line.trim_end().is_empty() {
                    break;
                }
            }
            served += 1;
            match reply {
                Reply::Hangup => drop(stream),
                Reply::Snapshot => {
                    let mut stream = stream;
                    write!(
                        stream,
                        "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        jpeg.len()
                    )
                    .unwrap();
                    stream.write_all(&jpeg).unwrap();
                    stream.flush().unwrap();
                }
            }
        }
        served
    });
    (format!("http://{}/snapshot.jpg", addr), handle)
}

fn cycle(evidence: &TempDir) -> FrameCycle {
    let dispatcher = AlertDispatcher::new(
        AlertPolicy::default(),
        Box::new(DirectoryEvidenceStore::new(evidence.path()).unwrap()),
        Box::new(MemoryAlertSink::new()),
    );
    FrameCycle::new(
        DwellTracker::new(ZonePolygon::fallback(), ExitPolicy::Immediate),
        dispatcher,
    )
}

#[test]
fn dropped_snapshot_skips_a_frame_then_reconnects() {
    // connect, failed read, reconnect, successful read
    let (url, server) = camera(vec![
        Reply::Snapshot,
        Reply::Hangup,
        Reply::Snapshot,
        Reply::Snapshot,
    ]);
    let mut source = HttpJpegSource::new(SourceConfig {
        url,
        target_fps: 0,
        ..SourceConfig::default()
    })
    .unwrap();
    source.connect().unwrap();

    let evidence = TempDir::new().unwrap();
    let mut cycle = cycle(&evidence);
    let mut detector = ScriptedDetector::new(vec![Vec::new(), Vec::new()]);

    let outcome = cycle.step(&mut source, &mut detector).unwrap();
    assert!(matches!(outcome, StepOutcome::Skipped));
    assert!(!source.is_healthy());

    let outcome = cycle.step(&mut source, &mut detector).unwrap();
    match outcome {
        StepOutcome::Processed(report) => assert_eq!(report.sequence, 1),
        other => panic!("expected a processed frame, got {:?}", other),
    }
    assert!(source.is_healthy());
    assert_eq!(source.stats().frames_captured, 1);

    assert_eq!(server.join().unwrap(), 4);
}

#[test]
fn unreachable_camera_fails_at_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/snapshot.jpg", listener.local_addr().unwrap());
    drop(listener);

    let mut source = HttpJpegSource::new(SourceConfig {
        url,
        ..SourceConfig::default()
    })
    .unwrap();
    let err = source.connect().unwrap_err();
    assert!(err.is_fatal());
}
