//! Synthetic (`stub://`) source.
//!
//! Produces a moving gradient at the configured size and frame rate. Used when
//! detections come from a replay and no imagery is available, and in tests.

use std::time::Instant;

use image::{Rgb, RgbImage};

use super::{frame_interval, FrameSource, SourceConfig, SourceStats};
use crate::error::EngineResult;
use crate::frame::Frame;

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    /// Shifts every 50 frames so consecutive images are not identical.
    scene_state: u8,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            next_due: None,
        }
    }

    fn render(&mut self) -> RgbImage {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count as u32 + self.scene_state as u32;
        RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            let v = ((x + y + shift) % 256) as u8;
            Rgb([v, v / 2, 96])
        })
    }

    fn pace(&mut self) {
        let interval = frame_interval(self.config.target_fps);
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + interval);
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> EngineResult<()> {
        log::info!("synthetic source {} connected", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        self.pace();
        self.frame_count += 1;
        let image = self.render();
        Ok(Some(Frame::new(image, self.frame_count)))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
