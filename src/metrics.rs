use crate::batch::ImageBatch;
use crate::error::{Error, Result};
use ndarray::Zip;

/// Mean of the squared per-pixel differences between two batches of the same shape.
pub fn mean_squared_error(reconstructed: &ImageBatch, target: &ImageBatch) -> Result<f32> {
    if reconstructed.shape() != target.shape() {
        return Err(Error::shape_mismatch(target.shape(), reconstructed.shape()));
    }
    if target.pixels().is_empty() {
        return Ok(0.0);
    }

    let sum = Zip::from(reconstructed.pixels())
        .and(target.pixels())
        .fold(0.0f64, |sum, &a, &b| sum + f64::from(a - b).powi(2));

    Ok((sum / target.pixels().len() as f64) as f32)
}
