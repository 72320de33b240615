use crate::batch::ImageBatch;
use crate::error::{Error, Result};
use ndarray::{Array, Zip};
use ndarray_rand::{RandomExt, rand::Rng, rand_distr::Normal};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub noise_factor: f32,
    pub mean: f32,
    pub stddev: f32,
}

impl Default for NoiseConfig {
    fn default() -> NoiseConfig {
        NoiseConfig {
            noise_factor: 0.5,
            mean: 0.0,
            stddev: 1.0,
        }
    }
}

/// Corrupts image batches with additive Gaussian noise.
///
/// Every pixel `x` becomes `clip(x + noise_factor * n, 0, 1)` where `n` is drawn independently
/// from `N(mean, stddev)`. The random source is supplied per call, so seeding it makes the output
/// reproducible.
#[derive(Debug, Clone, Copy)]
pub struct NoiseInjector {
    noise_factor: f32,
    distribution: Normal<f32>,
}

impl NoiseInjector {
    pub fn new(config: NoiseConfig) -> Result<NoiseInjector> {
        if !config.noise_factor.is_finite() || config.noise_factor < 0.0 {
            return Err(Error::InvalidNoise(format!(
                "noise factor must be a non-negative number, got {}",
                config.noise_factor
            )));
        }
        if !config.mean.is_finite() {
            return Err(Error::InvalidNoise(format!(
                "mean must be finite, got {}",
                config.mean
            )));
        }
        // rand_distr's Normal happily takes a negative standard deviation (it just mirrors the
        // samples), so anything other than a finite, non-negative spread has to be caught here.
        if !config.stddev.is_finite() || config.stddev < 0.0 {
            return Err(Error::InvalidNoise(format!(
                "standard deviation must be a non-negative number, got {}",
                config.stddev
            )));
        }
        let distribution = Normal::new(config.mean, config.stddev).map_err(|err| {
            Error::InvalidNoise(format!("standard deviation {}: {err}", config.stddev))
        })?;

        Ok(NoiseInjector {
            noise_factor: config.noise_factor,
            distribution,
        })
    }

    pub fn noise_factor(&self) -> f32 {
        self.noise_factor
    }

    /// Returns a noisy copy of `batch`. The source batch is left untouched.
    pub fn inject<R: Rng + ?Sized>(&self, batch: &ImageBatch, rng: &mut R) -> Result<ImageBatch> {
        // Draw one sample per pixel up front, in a separate array with the same dimensions as the
        // batch. Drawing them in a single call keeps the order the generator is consumed in fixed,
        // which is what makes a seeded run reproducible.
        let pixels = batch.pixels();
        let noise: Array<f32, _> = Array::random_using(pixels.raw_dim(), self.distribution, rng);

        // Walk the pixels and their noise samples in lockstep, scale each sample by the noise
        // factor, add it to the pixel, and clip the result back into [0, 1]. map_collect builds a
        // brand new array, so the source batch is never written to.
        let noise_factor = self.noise_factor;
        let noisy = Zip::from(pixels)
            .and(&noise)
            .map_collect(|&pixel, &sample| (pixel + noise_factor * sample).clamp(0.0, 1.0));

        // Zip refuses to pair up arrays of different shapes, so this should never trigger. It's
        // kept as a hard error rather than an assert so a broken batch can never leak out.
        if noisy.shape() != pixels.shape() {
            return Err(Error::shape_mismatch(pixels.shape(), noisy.shape()));
        }

        Ok(ImageBatch::from_clipped(noisy))
    }
}
