use ndarray::{Array3, ArrayView3, ArrayViewMut3};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("expected {expected} bytes for a {width}x{height} RGB frame, got {actual}")]
pub struct FrameShapeError {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// One captured RGB24 image, stored as `(height, width, 3)`.
///
/// Dimensions are checked once on construction, so views never fail.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pixels: Array3<u8>,
    index: u64,
}

impl Frame {
    pub fn from_rgb(
        data: Vec<u8>,
        width: u32,
        height: u32,
        index: u64,
    ) -> Result<Self, FrameShapeError> {
        let expected = (width as usize) * (height as usize) * 3;
        let actual = data.len();
        let pixels = Array3::from_shape_vec((height as usize, width as usize, 3), data).map_err(
            |_| FrameShapeError {
                width,
                height,
                expected,
                actual,
            },
        )?;
        Ok(Self { pixels, index })
    }

    /// Solid-colour frame, used when nothing has been captured yet.
    pub fn blank(width: u32, height: u32, value: u8) -> Self {
        Self {
            pixels: Array3::from_elem((height as usize, width as usize, 3), value),
            index: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.dim().0 as u32
    }

    /// Position of the frame in its capture stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Row-major RGB bytes.
    pub fn data(&self) -> &[u8] {
        // Always standard layout: built from a flat vec and never reshaped.
        self.pixels.as_slice().unwrap_or_default()
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        self.pixels.view_mut()
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels.into_raw_vec_and_offset().0
    }
}
