use crate::detect::result::Detection;
use crate::error::EngineResult;
use crate::frame::Frame;

/// Seam to the external object detector/tracker.
///
/// The engine never runs a model itself. Implementations hand back the
/// tracked objects for one frame, each carrying the tracker's stable id.
/// Implementations must not retain the frame beyond the call.
pub trait TrackingDetector {
    /// Backend identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Tracked detections for `frame`.
    ///
    /// An error skips the frame; the cycle logs it and moves on.
    fn detect(&mut self, frame: &Frame) -> EngineResult<Vec<Detection>>;

    /// True once the backend has no more detections to give (end of a replay).
    fn is_exhausted(&self) -> bool {
        false
    }
}

impl<D: TrackingDetector + ?Sized> TrackingDetector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> EngineResult<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn is_exhausted(&self) -> bool {
        (**self).is_exhausted()
    }
}
