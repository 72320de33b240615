use crate::batch::{ImageBatch, ImageShape};
use crate::error::{Error, Result};
use crate::noise::NoiseConfig;
use crate::topology::AutoencoderTopology;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Optimizer {
    Adadelta,
    Adam,
    Sgd,
    RmsProp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    BinaryCrossEntropy,
    MeanSquaredError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub optimizer: Optimizer,
    pub loss: Loss,
    pub batch_size: usize,
    pub epochs: usize,
    pub shuffle: bool,
}

impl Default for TrainingConfig {
    fn default() -> TrainingConfig {
        TrainingConfig {
            optimizer: Optimizer::Adadelta,
            loss: Loss::BinaryCrossEntropy,
            batch_size: 128,
            epochs: 40,
            shuffle: true,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be positive".to_string()));
        }
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epoch count must be positive".to_string()));
        }
        Ok(())
    }

    pub fn batches_per_epoch(&self, samples: usize) -> usize {
        samples.div_ceil(self.batch_size)
    }
}

/// A corrupted batch alongside the clean batch it should be reconstructed into.
#[derive(Debug, Clone, Copy)]
pub struct ImagePair<'a> {
    pub noisy: &'a ImageBatch,
    pub clean: &'a ImageBatch,
}

impl<'a> ImagePair<'a> {
    pub fn new(noisy: &'a ImageBatch, clean: &'a ImageBatch) -> Result<ImagePair<'a>> {
        if noisy.shape() != clean.shape() {
            return Err(Error::shape_mismatch(clean.shape(), noisy.shape()));
        }
        Ok(ImagePair { noisy, clean })
    }

    pub fn len(&self) -> usize {
        self.noisy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.noisy.is_empty()
    }
}

/// Turns a topology into something trainable. This is the only point where a tensor library
/// with automatic differentiation enters the picture.
pub trait ModelBuilder {
    type Model: TrainableModel;

    fn build(&self, topology: &AutoencoderTopology, input: ImageShape) -> Result<Self::Model>;
}

pub trait TrainableModel {
    type Predictor: Predictor;

    /// Fits the model to map `train.noisy` onto `train.clean`, reporting loss on `validation`.
    fn fit(
        self,
        train: ImagePair<'_>,
        validation: ImagePair<'_>,
        config: &TrainingConfig,
    ) -> Result<Self::Predictor>;
}

pub trait Predictor {
    fn predict(&self, inputs: &ImageBatch) -> Result<ImageBatch>;
}

/// Everything an out-of-process trainer needs to reproduce a run: the network, the shape it
/// expects, the hyperparameters, and where the prepared batches were written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub topology: AutoencoderTopology,
    pub input_shape: ImageShape,
    pub noise: NoiseConfig,
    pub seed: Option<u64>,
    pub training: TrainingConfig,
    pub files: PlanFiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFiles {
    pub train_noisy: String,
    pub train_clean: String,
    pub test_noisy: String,
    pub test_clean: String,
}

impl Default for PlanFiles {
    fn default() -> PlanFiles {
        PlanFiles {
            train_noisy: "train-images-noisy.idx.gz".to_string(),
            train_clean: "train-images-clean.idx.gz".to_string(),
            test_noisy: "test-images-noisy.idx.gz".to_string(),
            test_clean: "test-images-clean.idx.gz".to_string(),
        }
    }
}
