//! Frame annotation for evidence images and the live view.
//!
//! Boxes and the zone outline are always drawn. Text labels need a TrueType
//! font (`evidence.font_path`); without one the label tab is drawn empty and
//! the label only lands in the evidence sidecar.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

use crate::detect::BoundingBox;
use crate::zone::ZonePolygon;

pub const ZONE_SAFE: Rgb<u8> = Rgb([0, 255, 0]);
pub const ZONE_CRITICAL: Rgb<u8> = Rgb([255, 0, 0]);
pub const BOX_WARNING: Rgb<u8> = Rgb([255, 255, 0]);
pub const BOX_CRITICAL: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_TEXT: Rgb<u8> = Rgb([0, 0, 0]);

const LABEL_SCALE: f32 = 18.0;
const LABEL_PAD: u32 = 3;
const LINE_THICKNESS: i32 = 2;

#[derive(Default)]
pub struct Overlay {
    font: Option<FontVec>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("invalid font {}: {}", path.display(), e))?;
        Ok(Self { font: Some(font) })
    }

    /// Load the configured font, falling back to box-only annotation.
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::with_font_file(path).unwrap_or_else(|err| {
                log::warn!("{:#}; evidence labels will not be rendered", err);
                Self::new()
            }),
            None => Self::new(),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw_zone(&self, canvas: &mut RgbImage, zone: &ZonePolygon, color: Rgb<u8>) {
        let vertices = zone.vertices();
        for (i, a) in vertices.iter().enumerate() {
            let b = vertices[(i + 1) % vertices.len()];
            for offset in 0..LINE_THICKNESS {
                let o = offset as f32;
                draw_line_segment_mut(
                    canvas,
                    (a.x as f32 + o, a.y as f32),
                    (b.x as f32 + o, b.y as f32),
                    color,
                );
            }
        }
    }

    pub fn draw_box(&self, canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
        let Some(bbox) = clip_to_canvas(bbox, canvas) else {
            return;
        };
        for inset in 0..LINE_THICKNESS {
            let w = bbox.width().saturating_sub(2 * inset as u32).max(1);
            let h = bbox.height().saturating_sub(2 * inset as u32).max(1);
            let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    /// Label tab above the box (inside it when the box touches the top edge).
    pub fn draw_label(
        &self,
        canvas: &mut RgbImage,
        bbox: &BoundingBox,
        text: &str,
        color: Rgb<u8>,
    ) {
        let Some(bbox) = clip_to_canvas(bbox, canvas) else {
            return;
        };
        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, text),
            None => (bbox.width().max(1), LABEL_SCALE as u32),
        };
        let tab_w = text_w + 2 * LABEL_PAD;
        let tab_h = text_h + 2 * LABEL_PAD;
        let tab_y = if bbox.y1 >= tab_h as i32 {
            bbox.y1 - tab_h as i32
        } else {
            bbox.y1
        };
        draw_filled_rect_mut(canvas, Rect::at(bbox.x1, tab_y).of_size(tab_w, tab_h), color);
        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                LABEL_TEXT,
                bbox.x1 + LABEL_PAD as i32,
                tab_y + LABEL_PAD as i32,
                scale,
                font,
                text,
            );
        }
    }
}

/// Intersect `bbox` with the canvas so drawing coordinates stay in range.
/// `None` when nothing of the box is visible.
fn clip_to_canvas(bbox: &BoundingBox, canvas: &RgbImage) -> Option<BoundingBox> {
    let max = i64::from(i32::MAX);
    let width = i64::from(canvas.width()).min(max);
    let height = i64::from(canvas.height()).min(max);
    let (x1, y1) = (i64::from(bbox.x1), i64::from(bbox.y1));
    let (x2, y2) = (i64::from(bbox.x2), i64::from(bbox.y2));
    if width == 0 || height == 0 || x2 < 0 || y2 < 0 || x1 >= width || y1 >= height {
        return None;
    }
    Some(BoundingBox::new(
        x1.max(0) as i32,
        y1.max(0) as i32,
        x2.min(width - 1) as i32,
        y2.min(height - 1) as i32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Point;

    #[test]
    fn box_outline_is_drawn_and_interior_untouched() {
        let mut canvas = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let overlay = Overlay::new();
        overlay.draw_box(&mut canvas, &BoundingBox::new(10, 10, 30, 30), BOX_CRITICAL);
        assert_eq!(canvas.get_pixel(10, 10), &BOX_CRITICAL);
        assert_eq!(canvas.get_pixel(11, 20), &BOX_CRITICAL);
        assert_eq!(canvas.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn drawing_outside_the_canvas_is_clipped() {
        let mut canvas = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let overlay = Overlay::new();
        overlay.draw_box(&mut canvas, &BoundingBox::new(-50, -50, 500, 500), BOX_WARNING);
        let zone = ZonePolygon::new(vec![
            Point::new(-100, -100),
            Point::new(400, -100),
            Point::new(400, 400),
        ])
        .unwrap();
        overlay.draw_zone(&mut canvas, &zone, ZONE_SAFE);
        overlay.draw_label(&mut canvas, &BoundingBox::new(5, 0, 15, 10), "id 1", BOX_WARNING);
    }

    #[test]
    fn extreme_boxes_are_clamped_to_the_frame() {
        let mut canvas = RgbImage::from_pixel(16, 12, Rgb([0, 0, 0]));
        let overlay = Overlay::new();
        let huge = BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        overlay.draw_box(&mut canvas, &huge, BOX_CRITICAL);
        overlay.draw_label(&mut canvas, &huge, "id 9", BOX_CRITICAL);
        assert_eq!(canvas.get_pixel(0, 0), &BOX_CRITICAL);

        let mut canvas = RgbImage::from_pixel(16, 12, Rgb([0, 0, 0]));
        let beyond = BoundingBox::new(i32::MAX - 10, i32::MAX - 10, i32::MAX, i32::MAX);
        overlay.draw_box(&mut canvas, &beyond, BOX_CRITICAL);
        overlay.draw_label(&mut canvas, &beyond, "id 9", BOX_CRITICAL);
        assert!(canvas.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn missing_font_degrades_to_box_only() {
        let overlay = Overlay::load(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!overlay.has_font());
    }
}
