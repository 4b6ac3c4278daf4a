//! Evidence persistence.
//!
//! Every fired alert leaves an annotated JPEG on local disk before any network
//! call is attempted. Files are written to a temporary name, synced and then
//! renamed, so a reader (or a crash) never sees a partial image.
//!
//! Names are derived from capture time, camera, track id and class, which
//! keeps concurrent per-camera instances writing into one shared directory
//! from colliding.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::detect::{Detection, TrackId};
use crate::error::{EngineError, EngineResult};
use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};
use crate::overlay::{Overlay, BOX_CRITICAL, ZONE_CRITICAL};
use crate::zone::ZonePolygon;

/// One alert's worth of material to persist.
pub struct EvidenceCapture<'a> {
    pub frame: &'a Frame,
    pub detection: &'a Detection,
    pub dwell: Duration,
    pub camera_id: Option<&'a str>,
}

/// Where a persisted evidence image ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvidenceRef {
    pub filename: String,
    pub path: PathBuf,
    /// Hex SHA-256 of the JPEG bytes.
    pub sha256: String,
}

pub trait EvidenceStore {
    fn persist(&mut self, capture: &EvidenceCapture<'_>) -> EngineResult<EvidenceRef>;
}

impl<S: EvidenceStore + ?Sized> EvidenceStore for Box<S> {
    fn persist(&mut self, capture: &EvidenceCapture<'_>) -> EngineResult<EvidenceRef> {
        (**self).persist(capture)
    }
}

#[derive(Serialize)]
struct Sidecar<'a> {
    image: &'a str,
    sha256: &'a str,
    camera_id: Option<&'a str>,
    object_id: TrackId,
    object_class: &'a str,
    confidence: f32,
    duration_seconds: f64,
    bbox: [i32; 4],
    captured_at: DateTime<Utc>,
}

/// Evidence directory on local disk.
pub struct DirectoryEvidenceStore {
    root: PathBuf,
    overlay: Overlay,
    zone: Option<ZonePolygon>,
    jpeg_quality: u8,
}

impl DirectoryEvidenceStore {
    /// Open (creating if needed) the evidence directory.
    pub fn new(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            EngineError::EvidencePersistence(format!("create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            overlay: Overlay::new(),
            zone: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        })
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = overlay;
        self
    }

    /// Outline this zone on every evidence image.
    pub fn with_zone(mut self, zone: ZonePolygon) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn render(&self, capture: &EvidenceCapture<'_>) -> EngineResult<Vec<u8>> {
        let det = capture.detection;
        let mut canvas = capture.frame.to_canvas();
        if let Some(zone) = &self.zone {
            self.overlay.draw_zone(&mut canvas, zone, ZONE_CRITICAL);
        }
        self.overlay.draw_box(&mut canvas, &det.bbox, BOX_CRITICAL);
        let label = format!(
            "ID:{} {} {:.2} {:.1}s",
            det.track_id,
            det.class_label,
            det.confidence,
            capture.dwell.as_secs_f64()
        );
        self.overlay.draw_label(&mut canvas, &det.bbox, &label, BOX_CRITICAL);
        crate::frame::encode_jpeg(&canvas, self.jpeg_quality)
            .map_err(|e| EngineError::EvidencePersistence(format!("encode evidence: {}", e)))
    }

    /// First free path for `filename`; suffixes `_1`, `_2`, ... on collision.
    fn unique_path(&self, filename: &str) -> (String, PathBuf) {
        let path = self.root.join(filename);
        if !path.exists() {
            return (filename.to_string(), path);
        }
        let stem = filename.trim_end_matches(".jpg");
        let mut n = 1u32;
        loop {
            let candidate = format!("{}_{}.jpg", stem, n);
            let path = self.root.join(&candidate);
            if !path.exists() {
                return (candidate, path);
            }
            n += 1;
        }
    }
}

impl EvidenceStore for DirectoryEvidenceStore {
    fn persist(&mut self, capture: &EvidenceCapture<'_>) -> EngineResult<EvidenceRef> {
        let det = capture.detection;
        let jpeg = self.render(capture)?;
        let sha256 = hex::encode(Sha256::digest(&jpeg));

        let name = evidence_filename(
            capture.frame.wall_clock(),
            capture.camera_id,
            det.track_id,
            &det.class_label,
        );
        let (filename, path) = self.unique_path(&name);
        write_atomic(&path, &jpeg).map_err(|e| {
            EngineError::EvidencePersistence(format!("write {}: {}", path.display(), e))
        })?;

        let sidecar = Sidecar {
            image: &filename,
            sha256: &sha256,
            camera_id: capture.camera_id,
            object_id: det.track_id,
            object_class: &det.class_label,
            confidence: det.confidence,
            duration_seconds: capture.dwell.as_secs_f64(),
            bbox: [det.bbox.x1, det.bbox.y1, det.bbox.x2, det.bbox.y2],
            captured_at: capture.frame.wall_clock(),
        };
        // The image is already durable; a missing sidecar only loses metadata.
        match serde_json::to_vec_pretty(&sidecar) {
            Ok(json) => {
                if let Err(err) = write_atomic(&path.with_extension("json"), &json) {
                    log::warn!("evidence sidecar for {} not written: {}", filename, err);
                }
            }
            Err(err) => log::warn!("evidence sidecar for {} not encoded: {}", filename, err),
        }

        log::info!("evidence saved: {} (sha256 {})", path.display(), &sha256[..16]);
        Ok(EvidenceRef {
            filename,
            path,
            sha256,
        })
    }
}

/// `<YYYYmmddTHHMMSS.mmmZ>[_<camera>]_id<track>_<class>.jpg`
pub fn evidence_filename(
    captured_at: DateTime<Utc>,
    camera_id: Option<&str>,
    track_id: TrackId,
    class_label: &str,
) -> String {
    let stamp = captured_at.format("%Y%m%dT%H%M%S%.3fZ");
    match camera_id.map(sanitize_component) {
        Some(camera) => format!(
            "{}_{}_id{}_{}.jpg",
            stamp,
            camera,
            track_id,
            sanitize_component(class_label)
        ),
        None => format!(
            "{}_id{}_{}.jpg",
            stamp,
            track_id,
            sanitize_component(class_label)
        ),
    }
}

fn sanitize_component(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^a-z0-9_-]+").expect("static regex"));
    let lowered = raw.trim().to_ascii_lowercase();
    let cleaned = re.replace_all(&lowered, "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Write to `<name>.tmp`, fsync, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
