use denoising_autoencoder::{
    Activation, AutoencoderTopology, Error, ImageBatch, ImageShape, ModelBuilder, NoiseConfig,
    NoiseInjector, Predictor, Result, Stage, TopologyConfig, TrainableModel, TrainingConfig,
    mnist::Dataset,
    pipeline::{corrupt, run},
    trainer::ImagePair,
    visualize::render_grid,
};
use ndarray::Array4;
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::{SeedableRng, rngs::SmallRng};
use std::cell::RefCell;

// Stands in for a tensor library: it records what it was asked to fit, and its predictor squashes
// each noisy pixel through the network's output activation.
#[derive(Default)]
struct RecordingBuilder {
    fitted: RefCell<Vec<(usize, usize, TrainingConfig)>>,
}

struct RecordingModel<'a> {
    output_activation: Activation,
    output_shape: ImageShape,
    fitted: &'a RefCell<Vec<(usize, usize, TrainingConfig)>>,
}

struct SquashingPredictor {
    output_activation: Activation,
    output_shape: ImageShape,
}

impl<'b> ModelBuilder for &'b RecordingBuilder {
    type Model = RecordingModel<'b>;

    fn build(&self, topology: &AutoencoderTopology, input: ImageShape) -> Result<Self::Model> {
        let output_activation = match topology.decoder_stages().last() {
            Some(Stage::Conv2d { activation, .. }) => *activation,
            _ => Activation::Linear,
        };
        let builder: &'b RecordingBuilder = *self;
        Ok(RecordingModel {
            output_activation,
            output_shape: topology.output_shape(input)?,
            fitted: &builder.fitted,
        })
    }
}

impl TrainableModel for RecordingModel<'_> {
    type Predictor = SquashingPredictor;

    fn fit(
        self,
        train: ImagePair<'_>,
        validation: ImagePair<'_>,
        config: &TrainingConfig,
    ) -> Result<SquashingPredictor> {
        self.fitted
            .borrow_mut()
            .push((train.len(), validation.len(), *config));
        Ok(SquashingPredictor {
            output_activation: self.output_activation,
            output_shape: self.output_shape,
        })
    }
}

impl Predictor for SquashingPredictor {
    fn predict(&self, inputs: &ImageBatch) -> Result<ImageBatch> {
        let shape = self.output_shape;
        let pixels = Array4::from_shape_fn(
            (inputs.len(), shape.height, shape.width, shape.channels),
            |(i, y, x, _)| {
                let logit = 8.0 * (inputs.pixels()[[i, y, x, 0]] - 0.5);
                self.output_activation.apply(logit)
            },
        );
        ImageBatch::from_array(pixels)
    }
}

struct FailingBuilder;

#[derive(Debug)]
struct OutOfMemory;

impl std::fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device out of memory")
    }
}

impl std::error::Error for OutOfMemory {}

impl ModelBuilder for FailingBuilder {
    type Model = RecordingModel<'static>;

    fn build(&self, _: &AutoencoderTopology, _: ImageShape) -> Result<Self::Model> {
        Err(Error::Trainer(Box::new(OutOfMemory)))
    }
}

fn digits(count: usize, seed: u64) -> ImageBatch {
    let mut rng = SmallRng::seed_from_u64(seed);
    ImageBatch::from_array(Array4::random_using(
        (count, 28, 28, 1),
        Uniform::new_inclusive(0.0, 1.0),
        &mut rng,
    ))
    .unwrap()
}

fn noisy_dataset(seed: u64) -> denoising_autoencoder::pipeline::DenoisingData {
    let dataset = Dataset {
        train: digits(16, 1),
        test: digits(6, 2),
    };
    let injector = NoiseInjector::new(NoiseConfig::default()).unwrap();
    corrupt(dataset, &injector, &mut SmallRng::seed_from_u64(seed)).unwrap()
}

#[test]
fn noisy_batches_keep_shape_and_range() {
    let data = noisy_dataset(0);

    assert_eq!(data.train_noisy.shape(), &[16, 28, 28, 1]);
    assert_eq!(data.test_noisy.shape(), &[6, 28, 28, 1]);
    for batch in [&data.train_noisy, &data.test_noisy] {
        assert!(batch.pixels().iter().all(|value| (0.0..=1.0).contains(value)));
    }
    assert_ne!(data.train_noisy, data.train_clean);
}

#[test]
fn corruption_is_reproducible_with_a_seed() {
    let first = noisy_dataset(9);
    let second = noisy_dataset(9);

    assert_eq!(first.train_noisy, second.train_noisy);
    assert_eq!(first.test_noisy, second.test_noisy);
    // Train and test draw different noise from the shared generator.
    assert_ne!(first.train_noisy.image(0), first.test_noisy.image(0));
}

#[test]
fn reconstruction_matches_input_shape_and_is_bounded() {
    let data = noisy_dataset(3);
    let topology = AutoencoderTopology::new(&TopologyConfig::default()).unwrap();
    let builder = RecordingBuilder::default();

    let reconstruction = run(&&builder, &topology, &data, &TrainingConfig::default()).unwrap();

    assert_eq!(reconstruction.decoded.shape(), &[6, 28, 28, 1]);
    assert!(
        reconstruction
            .decoded
            .pixels()
            .iter()
            .all(|value| (0.0..=1.0).contains(value))
    );
    assert_eq!(reconstruction.noisy, data.test_noisy);

    let fitted = builder.fitted.borrow();
    assert_eq!(fitted.len(), 1);
    assert_eq!(fitted[0].0, 16);
    assert_eq!(fitted[0].1, 6);
    assert_eq!(fitted[0].2, TrainingConfig::default());

    let mse = reconstruction.mean_squared_error(&data.test_clean).unwrap();
    assert!((0.0..=1.0).contains(&mse));

    let grid = render_grid(&reconstruction.noisy, &reconstruction.decoded, 10).unwrap();
    assert_eq!(grid.lines().count(), 28 * 2 + 1);
}

#[test]
fn trainer_failures_surface_unchanged() {
    let data = noisy_dataset(4);
    let topology = AutoencoderTopology::new(&TopologyConfig::default()).unwrap();

    match run(&FailingBuilder, &topology, &data, &TrainingConfig::default()) {
        Err(Error::Trainer(source)) => assert_eq!(source.to_string(), "device out of memory"),
        other => panic!("expected the trainer's error, got {other:?}"),
    }
}

#[test]
fn inputs_the_network_cannot_reproduce_are_rejected_before_building() {
    let dataset = Dataset {
        train: ImageBatch::from_array(Array4::zeros((2, 27, 27, 1))).unwrap(),
        test: ImageBatch::from_array(Array4::zeros((1, 27, 27, 1))).unwrap(),
    };
    let injector = NoiseInjector::new(NoiseConfig::default()).unwrap();
    let data = corrupt(dataset, &injector, &mut SmallRng::seed_from_u64(0)).unwrap();
    let topology = AutoencoderTopology::new(&TopologyConfig::default()).unwrap();
    let builder = RecordingBuilder::default();

    let result = run(&&builder, &topology, &data, &TrainingConfig::default());

    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    assert!(builder.fitted.borrow().is_empty());
}

#[test]
fn test_images_must_match_training_images() {
    let dataset = Dataset {
        train: digits(4, 1),
        test: ImageBatch::from_array(Array4::zeros((2, 32, 32, 1))).unwrap(),
    };
    let injector = NoiseInjector::new(NoiseConfig::default()).unwrap();
    let data = corrupt(dataset, &injector, &mut SmallRng::seed_from_u64(0)).unwrap();
    let topology = AutoencoderTopology::new(&TopologyConfig::default()).unwrap();
    let builder = RecordingBuilder::default();

    let result = run(&&builder, &topology, &data, &TrainingConfig::default());

    match result {
        Err(Error::ShapeMismatch { expected, found }) => {
            assert_eq!(expected, [28, 28, 1]);
            assert_eq!(found, [32, 32, 1]);
        }
        other => panic!("expected a shape mismatch, got {other:?}"),
    }
    assert!(builder.fitted.borrow().is_empty());
}

#[test]
fn invalid_training_config_stops_the_run() {
    let data = noisy_dataset(5);
    let topology = AutoencoderTopology::new(&TopologyConfig::default()).unwrap();
    let config = TrainingConfig {
        batch_size: 0,
        ..TrainingConfig::default()
    };

    let result = run(&&RecordingBuilder::default(), &topology, &data, &config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
