//! Throttled live-view publishing.
//!
//! Independent of dwell and alert state. The interval clock advances on every
//! attempt, successful or not, so an unreachable endpoint costs at most one
//! timeout per interval.

use std::time::{Duration, Instant};

use image::RgbImage;

use crate::frame::{encode_jpeg, DEFAULT_JPEG_QUALITY};
use crate::transport::FrameSink;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Throttled,
    Published,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub published: u64,
    pub failed: u64,
}

pub struct StreamPublisher {
    sink: Box<dyn FrameSink>,
    interval: Duration,
    jpeg_quality: u8,
    last_attempt: Option<Instant>,
    failing: bool,
    stats: StreamStats,
}

impl StreamPublisher {
    pub fn new(sink: Box<dyn FrameSink>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            last_attempt: None,
            failing: false,
            stats: StreamStats::default(),
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Whether an attempt at `now` would go out.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn maybe_publish(&mut self, image: &RgbImage, now: Instant) -> PublishOutcome {
        if !self.is_due(now) {
            return PublishOutcome::Throttled;
        }
        self.last_attempt = Some(now);

        let result = encode_jpeg(image, self.jpeg_quality)
            .map_err(|e| format!("encode stream frame: {}", e))
            .and_then(|jpeg| self.sink.publish(&jpeg).map_err(|e| e.to_string()));
        match result {
            Ok(()) => {
                if self.failing {
                    log::info!("stream publishing to {} recovered", self.sink.describe());
                    self.failing = false;
                }
                self.stats.published += 1;
                PublishOutcome::Published
            }
            Err(err) => {
                // Warn once per outage; the endpoint is optional.
                if !self.failing {
                    log::warn!("stream publish failed: {}", err);
                    self.failing = true;
                } else {
                    log::debug!("stream publish failed: {}", err);
                }
                self.stats.failed += 1;
                PublishOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryFrameSink;

    fn image() -> RgbImage {
        RgbImage::from_pixel(16, 16, image::Rgb([10, 20, 30]))
    }

    #[test]
    fn publishes_at_most_once_per_interval() {
        let sink = MemoryFrameSink::new();
        let mut publisher =
            StreamPublisher::new(Box::new(sink.clone()), Duration::from_millis(100));
        let t0 = Instant::now();

        assert_eq!(publisher.maybe_publish(&image(), t0), PublishOutcome::Published);
        assert_eq!(
            publisher.maybe_publish(&image(), t0 + Duration::from_millis(10)),
            PublishOutcome::Throttled
        );
        assert_eq!(
            publisher.maybe_publish(&image(), t0 + Duration::from_millis(200)),
            PublishOutcome::Published
        );
        assert_eq!(sink.published(), 2);
        let jpeg = sink.last().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn failed_attempt_still_advances_the_clock() {
        let sink = MemoryFrameSink::new();
        sink.set_failing(true);
        let mut publisher =
            StreamPublisher::new(Box::new(sink.clone()), Duration::from_millis(100));
        let t0 = Instant::now();

        assert_eq!(publisher.maybe_publish(&image(), t0), PublishOutcome::Failed);
        assert!(!publisher.is_due(t0 + Duration::from_millis(50)));

        sink.set_failing(false);
        assert_eq!(
            publisher.maybe_publish(&image(), t0 + Duration::from_millis(100)),
            PublishOutcome::Published
        );
        assert_eq!(
            publisher.stats(),
            StreamStats {
                published: 1,
                failed: 1
            }
        );
    }
}
