//! Frame ingestion sources.
//!
//! Capture and decode proper belong to an external pipeline; the sources here
//! cover what a single camera instance needs on its own:
//!
//! - `stub://` synthetic frames (tests, replays without imagery)
//! - a still image or a directory of images, optionally looping
//! - HTTP MJPEG streams and JPEG snapshot endpoints
//!
//! Every source hands out owned [`Frame`]s stamped at capture time. Sources
//! do not buffer frames; a frame is dropped once the cycle is done with it.

pub mod file;
pub mod http;
pub mod synthetic;

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;

pub use file::ImageSource;
pub use http::HttpJpegSource;
pub use synthetic::SyntheticSource;

/// A live or recorded frame supplier.
pub trait FrameSource {
    /// Open the underlying stream. Failure here is fatal for the instance.
    fn connect(&mut self) -> EngineResult<()>;

    /// Next frame, or `None` once a finite source is exhausted.
    fn next_frame(&mut self) -> EngineResult<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> EngineResult<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Configuration shared by every source kind.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://...`, `http(s)://...`, `file://...` or a plain local path.
    pub url: String,
    /// Target frame rate; sources decimate or pace to it. 0 means unpaced.
    pub target_fps: u32,
    /// Restart finite sources (image directories) at the end.
    pub looping: bool,
    /// Frame size for synthetic sources.
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://synthetic".to_string(),
            target_fps: 10,
            looping: false,
            width: 1280,
            height: 720,
        }
    }
}

/// Build the source named by `config.url`.
pub fn open_source(config: &SourceConfig) -> EngineResult<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    match Url::parse(&config.url) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Box::new(HttpJpegSource::new(config.clone())?)),
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    EngineError::SourceUnavailable(format!("bad file url '{}'", config.url))
                })?;
                Ok(Box::new(ImageSource::new(path, config.clone())))
            }
            other => Err(EngineError::SourceUnavailable(format!(
                "unsupported source scheme '{}' (supported: stub, http(s), file, local path)",
                other
            ))),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Box::new(ImageSource::new(
            PathBuf::from(&config.url),
            config.clone(),
        ))),
        Err(err) => Err(EngineError::SourceUnavailable(format!(
            "invalid source '{}': {}",
            config.url, err
        ))),
    }
}

pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// How long a source may go without a frame and still count as healthy.
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
