use std::sync::OnceLock;

use ab_glyph::{FontRef, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::shared::frame::Frame;
use crate::tracking::domain::tracker::TrackMap;

use super::snapshot_bridge::Snapshot;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: PxScale = PxScale { x: 16.0, y: 16.0 };
const LABEL_GAP: i32 = 3;

static LABEL_FONT_DATA: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono-Bold.ttf");

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("frame buffer does not match {width}x{height} RGB")]
    Buffer { width: u32, height: u32 },
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Draws track boxes onto a frame copy and encodes it as JPEG.
#[derive(Clone, Copy, Debug)]
pub struct FrameRenderer {
    quality: u8,
}

impl FrameRenderer {
    /// `quality` is clamped to the JPEG range 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a snapshot's frame, optionally with its track boxes and ID
    /// labels drawn. The snapshot itself is left untouched.
    pub fn render(&self, snapshot: &Snapshot, draw_boxes: bool) -> Result<Vec<u8>, RenderError> {
        let mut image = to_image(&snapshot.frame)?;
        if draw_boxes {
            draw_tracks(&mut image, &snapshot.tracks);
        }
        self.encode(&image)
    }

    pub fn encode_jpeg(&self, frame: &Frame) -> Result<Vec<u8>, RenderError> {
        self.encode(&to_image(frame)?)
    }

    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, RenderError> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(image)?;
        Ok(out)
    }
}

fn to_image(frame: &Frame) -> Result<RgbImage, RenderError> {
    let (width, height) = (frame.width(), frame.height());
    RgbImage::from_raw(width, height, frame.data().to_vec())
        .ok_or(RenderError::Buffer { width, height })
}

/// Outline every track box and label it `ID n` just above its top edge.
///
/// Boxes are clipped to the image first. A label that would leave the top
/// of the image is pulled down to row 0; anything past the right edge is
/// cut off.
pub fn draw_tracks(image: &mut RgbImage, tracks: &TrackMap) {
    let font = label_font();
    for (id, bbox) in tracks {
        let Some(region) = bbox.clamp_to(image.width(), image.height()) else {
            continue;
        };
        for inset in 0..BOX_THICKNESS {
            let (w, h) = (region.w - 2 * inset, region.h - 2 * inset);
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(region.x + inset, region.y + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }

        if let Some(font) = font {
            let label = format!("ID {id}");
            let (_, text_h) = text_size(LABEL_SCALE, font, &label);
            let y = (region.y - text_h as i32 - LABEL_GAP).max(0);
            draw_text_mut(image, BOX_COLOR, region.x, y, LABEL_SCALE, font, &label);
        }
    }
}

fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| {
        FontRef::try_from_slice(LABEL_FONT_DATA)
            .map_err(|e| log::warn!("Track labels disabled, bundled font unreadable: {e}"))
            .ok()
    })
    .as_ref()
}
