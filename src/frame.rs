//! Captured frames.
//!
//! A `Frame` owns one decoded RGB image plus two capture times:
//!
//! - `captured_at`: monotonic instant, the only clock used for dwell,
//!   cooldown and stream-interval math.
//! - `wall_clock`: UTC time, used for alert timestamps and evidence names.
//!
//! Frames are handed to the cycle by value and dropped once the cycle is done
//! with them; nothing in the engine buffers frames across cycles.

use std::io::Cursor;
use std::time::Instant;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageResult, RgbImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 70;

pub struct Frame {
    image: RgbImage,
    sequence: u64,
    captured_at: Instant,
    wall_clock: DateTime<Utc>,
}

impl Frame {
    /// Stamp a frame with the current monotonic and wall-clock time.
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self::with_times(image, sequence, Instant::now(), Utc::now())
    }

    /// Build a frame with explicit capture times (replays, tests).
    pub fn with_times(
        image: RgbImage,
        sequence: u64,
        captured_at: Instant,
        wall_clock: DateTime<Utc>,
    ) -> Self {
        Self {
            image,
            sequence,
            captured_at,
            wall_clock,
        }
    }

    /// Uniform gray frame; handy when only the clock matters.
    pub fn blank(
        width: u32,
        height: u32,
        sequence: u64,
        captured_at: Instant,
        wall_clock: DateTime<Utc>,
    ) -> Self {
        let image = RgbImage::from_pixel(width, height, image::Rgb([48, 48, 48]));
        Self::with_times(image, sequence, captured_at, wall_clock)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn wall_clock(&self) -> DateTime<Utc> {
        self.wall_clock
    }

    /// Copy of the pixels for annotation. The frame itself stays untouched.
    pub fn to_canvas(&self) -> RgbImage {
        self.image.clone()
    }

    pub fn encode_jpeg(&self, quality: u8) -> ImageResult<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("wall_clock", &self.wall_clock)
            .finish()
    }
}

/// Encode an RGB image as JPEG. `quality` is clamped to `1..=100`.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::with_capacity(image.as_raw().len() / 8));
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode_image(image)?;
    }
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_jpeg_with_soi_marker() {
        let frame = Frame::new(RgbImage::from_pixel(32, 24, image::Rgb([200, 10, 10])), 1);
        let bytes = frame.encode_jpeg(DEFAULT_JPEG_QUALITY).expect("encode");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).expect("decode").to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn canvas_is_a_copy() {
        let frame = Frame::blank(8, 8, 0, Instant::now(), Utc::now());
        let mut canvas = frame.to_canvas();
        canvas.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        assert_eq!(frame.image().get_pixel(0, 0), &image::Rgb([48, 48, 48]));
    }
}
