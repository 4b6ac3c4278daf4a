//! Local still-image source.
//!
//! Reads one image file, or every `.jpg`/`.jpeg`/`.png` in a directory in
//! name order. With `looping` the sequence restarts at the end; otherwise the
//! source reports end-of-stream. Frames are paced to `target_fps`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{frame_interval, health_grace, FrameSource, SourceConfig, SourceStats};
use crate::error::{EngineError, EngineResult};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct ImageSource {
    root: PathBuf,
    config: SourceConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
}

impl ImageSource {
    pub fn new(root: impl Into<PathBuf>, config: SourceConfig) -> Self {
        Self {
            root: root.into(),
            config,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
        }
    }

    fn pace(&self) {
        let interval = frame_interval(self.config.target_fps);
        if let Some(last) = self.last_frame_at {
            let due = last + interval;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
    }
}

impl FrameSource for ImageSource {
    fn connect(&mut self) -> EngineResult<()> {
        self.files = list_images(&self.root)?;
        if self.files.is_empty() {
            return Err(EngineError::SourceUnavailable(format!(
                "no images found at {}",
                self.root.display()
            )));
        }
        self.cursor = 0;
        self.connected_at = Some(Instant::now());
        log::info!(
            "image source {} connected ({} files, loop={})",
            self.root.display(),
            self.files.len(),
            self.config.looping
        );
        Ok(())
    }

    fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        if self.files.is_empty() {
            return Err(EngineError::SourceUnavailable(
                "image source not connected; call connect() first".into(),
            ));
        }
        let mut failures = 0usize;
        loop {
            if self.cursor >= self.files.len() {
                if !self.config.looping {
                    return Ok(None);
                }
                self.cursor = 0;
            }
            let path = &self.files[self.cursor];
            self.cursor += 1;

            match image::open(path) {
                Ok(decoded) => {
                    self.pace();
                    self.frame_count += 1;
                    self.last_frame_at = Some(Instant::now());
                    return Ok(Some(Frame::new(decoded.into_rgb8(), self.frame_count)));
                }
                Err(err) => {
                    log::warn!("skipping undecodable image {}: {}", path.display(), err);
                    failures += 1;
                    if failures >= self.files.len() {
                        log::warn!("no decodable images at {}", self.root.display());
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= health_grace(self.config.target_fps);
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.root.display().to_string(),
        }
    }
}

fn list_images(root: &Path) -> EngineResult<Vec<PathBuf>> {
    let meta = fs::metadata(root).map_err(|e| {
        EngineError::SourceUnavailable(format!("open {}: {}", root.display(), e))
    })?;
    if meta.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let entries = fs::read_dir(root).map_err(|e| {
        EngineError::SourceUnavailable(format!("list {}: {}", root.display(), e))
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    IMAGE_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                })
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn unpaced(looping: bool) -> SourceConfig {
        SourceConfig {
            target_fps: 0,
            looping,
            ..SourceConfig::default()
        }
    }

    fn write_images(dir: &Path) {
        RgbImage::from_pixel(8, 6, Rgb([255, 0, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        RgbImage::from_pixel(8, 6, Rgb([0, 0, 255]))
            .save(dir.join("b.png"))
            .unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();
    }

    #[test]
    fn directory_is_read_in_order_then_ends() -> EngineResult<()> {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let mut source = ImageSource::new(dir.path(), unpaced(false));
        source.connect()?;

        let a = source.next_frame()?.expect("first");
        let b = source.next_frame()?.expect("second");
        assert_eq!(a.image().get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(b.image().get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert!(source.next_frame()?.is_none());
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn looping_restarts_from_the_first_image() -> EngineResult<()> {
        let dir = tempfile::tempdir().unwrap();
        write_images(dir.path());
        let mut source = ImageSource::new(dir.path(), unpaced(true));
        source.connect()?;
        for _ in 0..2 {
            source.next_frame()?;
        }
        let again = source.next_frame()?.expect("looped");
        assert_eq!(again.image().get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(again.sequence(), 3);
        Ok(())
    }

    #[test]
    fn nothing_decodable_ends_the_stream_even_when_looping() -> EngineResult<()> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        let mut source = ImageSource::new(dir.path(), unpaced(true));
        source.connect()?;
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn empty_or_missing_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut empty = ImageSource::new(dir.path(), unpaced(false));
        assert!(matches!(
            empty.connect(),
            Err(EngineError::SourceUnavailable(_))
        ));
        let mut missing = ImageSource::new(dir.path().join("nope"), unpaced(false));
        assert!(missing.connect().is_err());
    }
}
