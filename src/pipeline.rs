use crate::batch::ImageBatch;
use crate::error::{Error, Result};
use crate::metrics::mean_squared_error;
use crate::mnist::Dataset;
use crate::noise::NoiseInjector;
use crate::topology::AutoencoderTopology;
use crate::trainer::{ImagePair, ModelBuilder, Predictor, TrainableModel, TrainingConfig};
use ndarray_rand::rand::Rng;
use tracing::info;

/// Clean images and their corrupted counterparts, ready to be handed to a trainer.
#[derive(Debug, Clone)]
pub struct DenoisingData {
    pub train_clean: ImageBatch,
    pub train_noisy: ImageBatch,
    pub test_clean: ImageBatch,
    pub test_noisy: ImageBatch,
}

impl DenoisingData {
    pub fn train_pair(&self) -> Result<ImagePair<'_>> {
        ImagePair::new(&self.train_noisy, &self.train_clean)
    }

    pub fn test_pair(&self) -> Result<ImagePair<'_>> {
        ImagePair::new(&self.test_noisy, &self.test_clean)
    }
}

/// Corrupts the training set, then the test set, drawing from the same random source.
pub fn corrupt<R: Rng + ?Sized>(
    dataset: Dataset,
    injector: &NoiseInjector,
    rng: &mut R,
) -> Result<DenoisingData> {
    let train_noisy = injector.inject(&dataset.train, rng)?;
    let test_noisy = injector.inject(&dataset.test, rng)?;

    info!(
        noise_factor = injector.noise_factor(),
        train = train_noisy.len(),
        test = test_noisy.len(),
        "corrupted dataset"
    );
    Ok(DenoisingData {
        train_clean: dataset.train,
        train_noisy,
        test_clean: dataset.test,
        test_noisy,
    })
}

/// The noisy test images and what the fitted model made of them.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub noisy: ImageBatch,
    pub decoded: ImageBatch,
}

impl Reconstruction {
    pub fn mean_squared_error(&self, clean: &ImageBatch) -> Result<f32> {
        mean_squared_error(&self.decoded, clean)
    }
}

/// Builds a model for `topology`, fits it to map noisy training images onto clean ones while
/// validating on the test pair, and reconstructs the noisy test images with it.
pub fn run<B: ModelBuilder>(
    builder: &B,
    topology: &AutoencoderTopology,
    data: &DenoisingData,
    config: &TrainingConfig,
) -> Result<Reconstruction> {
    config.validate()?;
    let input = data.train_clean.image_shape();
    topology.check_input(input)?;
    // The model is built for the training images, so the test images it validates on and
    // reconstructs have to share their shape.
    let test_shape = data.test_clean.image_shape();
    if test_shape != input {
        return Err(Error::shape_mismatch(&input.to_vec(), &test_shape.to_vec()));
    }
    let train = data.train_pair()?;
    let validation = data.test_pair()?;

    let model = builder.build(topology, input)?;
    info!(
        optimizer = ?config.optimizer,
        loss = ?config.loss,
        epochs = config.epochs,
        batches_per_epoch = config.batches_per_epoch(train.len()),
        "fitting model"
    );
    let predictor = model.fit(train, validation, config)?;

    let decoded = predictor.predict(&data.test_noisy)?;
    if decoded.shape() != data.test_noisy.shape() {
        return Err(Error::shape_mismatch(data.test_noisy.shape(), decoded.shape()));
    }

    let reconstruction = Reconstruction {
        noisy: data.test_noisy.clone(),
        decoded,
    };
    info!(
        mse = reconstruction.mean_squared_error(&data.test_clean)?,
        "reconstructed test images"
    );
    Ok(reconstruction)
}
