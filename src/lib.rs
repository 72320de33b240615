pub mod batch;
pub mod error;
pub mod metrics;
pub mod mnist;
pub mod noise;
pub mod pipeline;
pub mod topology;
pub mod trainer;
pub mod visualize;

pub use batch::{ImageBatch, ImageShape};
pub use error::{Error, Result};
pub use noise::{NoiseConfig, NoiseInjector};
pub use topology::{Activation, AutoencoderTopology, Stage, TopologyConfig};
pub use trainer::{ModelBuilder, Predictor, TrainableModel, TrainingConfig};
