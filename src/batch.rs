use crate::error::{Error, Result};
use ndarray::{Array4, ArrayView3, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Height, width and channel count of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    pub fn new(height: usize, width: usize, channels: usize) -> ImageShape {
        ImageShape {
            height,
            width,
            channels,
        }
    }

    pub fn pixels(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn to_vec(self) -> Vec<usize> {
        vec![self.height, self.width, self.channels]
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

// A batch of images laid out as [images x rows x columns x channels], with every pixel a
// normalized intensity in [0, 1]. Sharing one 4D array means every image in a batch has the same
// shape by construction, so the only thing left to check on the way in is the value range.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pixels: Array4<f32>,
}

impl ImageBatch {
    /// Wraps an existing array, rejecting any value that is not a finite number in [0, 1].
    pub fn from_array(pixels: Array4<f32>) -> Result<ImageBatch> {
        // Look for the first pixel that isn't a normalized intensity. NaN fails the range check
        // too, since it compares false against both ends of the range, so a single pass over the
        // array is enough to catch every kind of bad value.
        if let Some(bad) = pixels
            .iter()
            .find(|value| !(0.0..=1.0).contains(*value))
        {
            return Err(Error::Batch(format!(
                "pixel value {bad} is outside the range [0, 1]"
            )));
        }
        Ok(ImageBatch { pixels })
    }

    /// Builds a batch from raw 8-bit pixels stored image after image, row after row, dividing
    /// every byte by 255.
    pub fn from_bytes(count: usize, shape: ImageShape, bytes: &[u8]) -> Result<ImageBatch> {
        // There should be exactly one byte per pixel of every image. If not, either the wrong
        // shape was given or the bytes were cut short somewhere along the way.
        let expected = count
            .checked_mul(shape.height)
            .and_then(|n| n.checked_mul(shape.width))
            .and_then(|n| n.checked_mul(shape.channels));
        if expected != Some(bytes.len()) {
            let expected = expected.map_or_else(|| "too many".to_string(), |n| n.to_string());
            return Err(Error::Batch(format!(
                "expected {expected} bytes for {count} images of shape {shape}, found {}",
                bytes.len()
            )));
        }

        // Scale every byte from 0..=255 down into 0.0..=1.0, then lay the flat vector out as a
        // 4D array. The bytes are already in row-major order (image, then row, then column), which
        // is exactly what from_shape_vec expects, so no reordering is needed.
        let normalized = bytes.iter().map(|&byte| byte as f32 / 255.0).collect();
        let pixels = Array4::from_shape_vec(
            (count, shape.height, shape.width, shape.channels),
            normalized,
        )
        .map_err(|err| Error::Batch(err.to_string()))?;

        Ok(ImageBatch { pixels })
    }

    /// Skips the range check. Callers must have clipped every value into [0, 1] themselves.
    pub(crate) fn from_clipped(pixels: Array4<f32>) -> ImageBatch {
        debug_assert!(pixels.iter().all(|value| (0.0..=1.0).contains(value)));
        ImageBatch { pixels }
    }

    pub fn len(&self) -> usize {
        self.pixels.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image_shape(&self) -> ImageShape {
        let (_, height, width, channels) = self.pixels.dim();
        ImageShape::new(height, width, channels)
    }

    pub fn shape(&self) -> &[usize] {
        self.pixels.shape()
    }

    pub fn image(&self, index: usize) -> Option<ArrayView3<'_, f32>> {
        (index < self.len()).then(|| self.pixels.index_axis(Axis(0), index))
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.pixels.view()
    }

    pub fn pixels(&self) -> &Array4<f32> {
        &self.pixels
    }

    pub fn into_inner(self) -> Array4<f32> {
        self.pixels
    }
}
