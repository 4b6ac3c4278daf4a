use std::collections::VecDeque;

use crate::detect::backend::TrackingDetector;
use crate::detect::result::Detection;
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;

/// Scripted backend for tests and demos. Hands out one prepared detection
/// list per call, in order.
pub struct ScriptedDetector {
    frames: VecDeque<Vec<Detection>>,
}

impl ScriptedDetector {
    pub fn new(frames: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push(&mut self, detections: Vec<Detection>) {
        self.frames.push_back(detections);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl TrackingDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> EngineResult<Vec<Detection>> {
        self.frames
            .pop_front()
            .ok_or_else(|| EngineError::Detector("script exhausted".to_string()))
    }

    fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}
