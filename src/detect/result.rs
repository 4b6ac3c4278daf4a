/// Track identifier assigned by the upstream tracker.
///
/// Stable only while tracking is unbroken; after a tracking loss the same
/// physical object may come back under a new id.
pub type TrackId = i64;

/// Integer pixel coordinate in frame space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in pixel coordinates, corners `(x1, y1)` and `(x2, y2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Builds a box, swapping corners so that `x1 <= x2` and `y1 <= y2`.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn from_array(coords: [i32; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn center(&self) -> Point {
        Point::new(
            ((self.x1 as i64 + self.x2 as i64) / 2) as i32,
            ((self.y1 as i64 + self.y2 as i64) / 2) as i32,
        )
    }

    pub fn width(&self) -> u32 {
        self.x2.abs_diff(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.abs_diff(self.y1)
    }
}

/// One tracked object reported by the detector for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub track_id: TrackId,
    pub class_label: String,
    /// Clamped to `0.0..=1.0`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(
        track_id: TrackId,
        class_label: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            track_id,
            class_label: class_label.into(),
            confidence,
            bbox,
        }
    }

    /// Center of the bounding box; this is the point tested against the zone.
    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_normalizes_swapped_corners() {
        let bbox = BoundingBox::new(50, 80, 10, 20);
        assert_eq!(bbox, BoundingBox::new(10, 20, 50, 80));
        assert_eq!(bbox.width(), 40);
        assert_eq!(bbox.height(), 60);
    }

    #[test]
    fn center_is_integer_midpoint() {
        let det = Detection::new(1, "person", 0.9, BoundingBox::new(10, 10, 21, 31));
        assert_eq!(det.center(), Point::new(15, 20));
    }

    #[test]
    fn confidence_is_clamped() {
        let bbox = BoundingBox::new(0, 0, 1, 1);
        assert_eq!(Detection::new(1, "car", 1.7, bbox).confidence, 1.0);
        assert_eq!(Detection::new(1, "car", -0.2, bbox).confidence, 0.0);
        assert_eq!(Detection::new(1, "car", f32::NAN, bbox).confidence, 0.0);
    }
}
