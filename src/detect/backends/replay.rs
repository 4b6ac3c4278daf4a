//! JSON-lines replay of tracker output.
//!
//! Each line is one processed frame:
//!
//! ```text
//! {"t": 0.5, "detections": [{"track_id": 7, "class_label": "person", "confidence": 0.91, "bbox": [400, 300, 460, 420]}]}
//! ```
//!
//! `t` (seconds since stream start) is optional; the `replay` binary uses it to
//! build a deterministic frame clock. The daemon ignores it and stamps frames
//! at capture time. `-` reads from stdin so a tracker process can be piped in.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::detect::backend::TrackingDetector;
use crate::detect::result::{BoundingBox, Detection, TrackId};
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;

#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(alias = "id")]
    track_id: TrackId,
    #[serde(alias = "class")]
    class_label: String,
    #[serde(alias = "conf")]
    confidence: f32,
    bbox: [i32; 4],
}

/// Detections for one replayed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayBatch {
    /// Offset from stream start, when the line carried `t`.
    pub offset: Option<Duration>,
    pub detections: Vec<Detection>,
}

pub struct ReplayDetector {
    reader: Box<dyn BufRead + Send>,
    origin: String,
    line_no: u64,
    exhausted: bool,
}

impl ReplayDetector {
    /// Open a replay log; `-` means stdin.
    pub fn open(path: &str) -> Result<Self> {
        if path == "-" {
            return Ok(Self::from_reader(BufReader::new(io::stdin()), "stdin"));
        }
        let file = File::open(Path::new(path))
            .with_context(|| format!("open detection replay {}", path))?;
        Ok(Self::from_reader(BufReader::new(file), path))
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static, origin: &str) -> Self {
        Self {
            reader: Box::new(reader),
            origin: origin.to_string(),
            line_no: 0,
            exhausted: false,
        }
    }

    /// Next non-blank line, or `None` at end of input.
    pub fn next_batch(&mut self) -> EngineResult<Option<ReplayBatch>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.reader.read_line(&mut line).map_err(|e| {
                EngineError::Detector(format!("{} read failed: {}", self.origin, e))
            })?;
            if read == 0 {
                self.exhausted = true;
                log::info!(
                    "replay {} exhausted after {} lines",
                    self.origin,
                    self.line_no
                );
                return Ok(None);
            }
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return parse_line(&line)
                .map(Some)
                .map_err(|e| EngineError::Detector(format!("{}:{}: {}", self.origin, self.line_no, e)));
        }
    }
}

impl TrackingDetector for ReplayDetector {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, _frame: &Frame) -> EngineResult<Vec<Detection>> {
        match self.next_batch()? {
            Some(batch) => Ok(batch.detections),
            None => Err(EngineError::Detector(format!(
                "replay {} has no more frames",
                self.origin
            ))),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Parse one replay line.
pub fn parse_line(line: &str) -> std::result::Result<ReplayBatch, String> {
    let parsed: ReplayLine = serde_json::from_str(line.trim()).map_err(|e| e.to_string())?;
    let offset = match parsed.t {
        Some(t) => match Duration::try_from_secs_f64(t) {
            Ok(offset) => Some(offset),
            Err(_) => return Err(format!("invalid frame time {}", t)),
        },
        None => None,
    };
    let detections = parsed
        .detections
        .into_iter()
        .map(|d| {
            Detection::new(
                d.track_id,
                d.class_label,
                d.confidence,
                BoundingBox::from_array(d.bbox),
            )
        })
        .collect();
    Ok(ReplayBatch { offset, detections })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_line_with_time_and_aliases() {
        let batch = parse_line(
            r#"{"t": 1.5, "detections": [{"id": 7, "class": "person", "conf": 0.8, "bbox": [10, 20, 30, 40]}]}"#,
        )
        .expect("parse");
        assert_eq!(batch.offset, Some(Duration::from_millis(1500)));
        assert_eq!(batch.detections.len(), 1);
        assert_eq!(batch.detections[0].track_id, 7);
        assert_eq!(batch.detections[0].class_label, "person");
        assert_eq!(batch.detections[0].bbox, BoundingBox::new(10, 20, 30, 40));
    }

    #[test]
    fn empty_detection_list_is_a_valid_frame() {
        let batch = parse_line(r#"{"detections": []}"#).expect("parse");
        assert!(batch.offset.is_none());
        assert!(batch.detections.is_empty());
    }

    #[test]
    fn rejects_negative_time_and_garbage() {
        assert!(parse_line(r#"{"t": -1.0, "detections": []}"#).is_err());
        assert!(parse_line("not json").is_err());
    }

    #[test]
    fn time_beyond_duration_range_is_rejected() {
        assert!(parse_line(r#"{"t": 1e30, "detections": []}"#).is_err());
    }

    #[test]
    fn extreme_boxes_parse_unchanged() {
        let batch = parse_line(
            r#"{"detections": [{"id": 1, "class": "person", "conf": 0.9, "bbox": [-2147483648, -2147483648, 2147483647, 2147483647]}]}"#,
        )
        .expect("parse");
        assert_eq!(
            batch.detections[0].bbox,
            BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)
        );
    }

    #[test]
    fn skips_blank_lines_and_reports_exhaustion() {
        let input = "\n{\"detections\": []}\n\n{\"detections\": [{\"track_id\": 1, \"class_label\": \"car\", \"confidence\": 0.5, \"bbox\": [0,0,4,4]}]}\n";
        let mut replay = ReplayDetector::from_reader(Cursor::new(input.to_string()), "test");
        assert!(replay.next_batch().unwrap().unwrap().detections.is_empty());
        assert_eq!(replay.next_batch().unwrap().unwrap().detections.len(), 1);
        assert!(replay.next_batch().unwrap().is_none());
        assert!(replay.is_exhausted());
    }

    #[test]
    fn malformed_line_is_a_detector_error() {
        let mut replay =
            ReplayDetector::from_reader(Cursor::new("{\"detections\": 3}\n".to_string()), "test");
        let err = replay.next_batch().unwrap_err();
        assert!(matches!(err, EngineError::Detector(_)));
        assert!(!replay.is_exhausted());
    }
}
