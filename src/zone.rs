//! Restricted zone polygon.
//!
//! The zone is a simple polygon in frame-pixel coordinates, implicitly closed
//! and immutable once loaded. Points on an edge or vertex count as inside.

use std::path::Path;

use crate::detect::{BoundingBox, Point};
use crate::error::{EngineError, EngineResult};

/// Zone used when no valid zone file is available.
pub const DEFAULT_ZONE: [(i32, i32); 4] = [(350, 200), (850, 200), (1000, 600), (200, 600)];

pub const MIN_VERTICES: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZonePolygon {
    vertices: Vec<Point>,
}

impl ZonePolygon {
    pub fn new(vertices: Vec<Point>) -> EngineResult<Self> {
        if vertices.len() < MIN_VERTICES {
            return Err(EngineError::Configuration(format!(
                "zone polygon needs at least {} vertices, got {}",
                MIN_VERTICES,
                vertices.len()
            )));
        }
        Ok(Self { vertices })
    }

    pub fn fallback() -> Self {
        Self {
            vertices: DEFAULT_ZONE.iter().copied().map(Point::from).collect(),
        }
    }

    /// Parse the persisted zone format: a JSON array of `[x, y]` pairs.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let pairs: Vec<[i32; 2]> = serde_json::from_str(json)
            .map_err(|e| EngineError::Configuration(format!("invalid zone json: {}", e)))?;
        Self::new(pairs.into_iter().map(|[x, y]| Point::new(x, y)).collect())
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("read zone file {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Load the zone file, falling back to [`DEFAULT_ZONE`] on any problem.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::info!("no zone file configured; using default zone");
            return Self::fallback();
        };
        match Self::load(path) {
            Ok(zone) => {
                log::info!(
                    "loaded zone with {} vertices from {}",
                    zone.vertices.len(),
                    path.display()
                );
                zone
            }
            Err(err) => {
                log::warn!("{}; using default zone", err);
                Self::fallback()
            }
        }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let first = self.vertices[0];
        let (mut x1, mut y1, mut x2, mut y2) = (first.x, first.y, first.x, first.y);
        for v in &self.vertices[1..] {
            x1 = x1.min(v.x);
            y1 = y1.min(v.y);
            x2 = x2.max(v.x);
            y2 = y2.max(v.y);
        }
        BoundingBox::new(x1, y1, x2, y2)
    }

    /// Even-odd point-in-polygon test with inclusive boundary.
    ///
    /// Integer arithmetic only (widened to i64), so results are exact for
    /// every pixel coordinate.
    pub fn contains(&self, point: Point) -> bool {
        let px = point.x as i64;
        let py = point.y as i64;
        let n = self.vertices.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let (ax, ay, bx, by) = (a.x as i64, a.y as i64, b.x as i64, b.y as i64);

            let cross = (bx - ax) * (py - ay) - (px - ax) * (by - ay);
            if cross == 0
                && px >= ax.min(bx)
                && px <= ax.max(bx)
                && py >= ay.min(by)
                && py <= ay.max(by)
            {
                return true;
            }

            if (ay > py) != (by > py) && (cross > 0) == (by > ay) {
                inside = !inside;
            }
        }
        inside
    }
}
