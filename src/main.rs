use clap::{Args, Parser, Subcommand, ValueEnum};
use denoising_autoencoder::{
    Activation, AutoencoderTopology, ImageShape, NoiseConfig, NoiseInjector, Result,
    TopologyConfig, TrainingConfig,
    metrics::mean_squared_error,
    mnist::{load_mnist, read_images_gz, write_images_gz},
    pipeline::corrupt,
    trainer::{Loss, Optimizer, PlanFiles, TrainingPlan},
    visualize::{DEFAULT_IMAGE_COUNT, render_grid},
};
use rand::{SeedableRng, rngs::SmallRng};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::PathBuf,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Prepares MNIST for a convolutional denoising autoencoder and inspects its reconstructions.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Corrupt MNIST with Gaussian noise and write the batches and training plan for a trainer.
    Prepare(PrepareArgs),
    /// Print each stage of the network with its output shape and parameter count.
    Summary(SummaryArgs),
    /// Show noisy test images above their reconstructions.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
struct PrepareArgs {
    /// Directory holding the gzipped MNIST IDX files.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    #[arg(long, default_value = "prepared")]
    out_dir: PathBuf,
    #[arg(long, default_value_t = 0.5)]
    noise_factor: f32,
    #[arg(long, default_value_t = 0.0)]
    noise_mean: f32,
    #[arg(long, default_value_t = 1.0)]
    noise_stddev: f32,
    /// Seed for the noise. Without one, every run draws different noise.
    #[arg(long)]
    seed: Option<u64>,
    #[command(flatten)]
    network: NetworkArgs,
    #[arg(long, value_enum, default_value_t = Optimizer::Adadelta)]
    optimizer: Optimizer,
    #[arg(long, value_enum, default_value_t = Loss::BinaryCrossEntropy)]
    loss: Loss,
    #[arg(long, default_value_t = 128)]
    batch_size: usize,
    #[arg(long, default_value_t = 40)]
    epochs: usize,
    #[arg(long)]
    no_shuffle: bool,
    /// Number of noisy/clean pairs to preview.
    #[arg(short, default_value_t = DEFAULT_IMAGE_COUNT)]
    n: usize,
}

#[derive(Debug, Args)]
struct SummaryArgs {
    #[arg(long, default_value_t = 28)]
    height: usize,
    #[arg(long, default_value_t = 28)]
    width: usize,
    #[command(flatten)]
    network: NetworkArgs,
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Noisy inputs, as written by `prepare`.
    #[arg(long)]
    noisy: PathBuf,
    /// Model output for the noisy inputs, as a gzipped IDX image file.
    #[arg(long)]
    reconstructed: PathBuf,
    /// Clean targets. When given, the reconstruction error is reported too.
    #[arg(long)]
    clean: Option<PathBuf>,
    #[arg(short, default_value_t = DEFAULT_IMAGE_COUNT)]
    n: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ActivationKind {
    Linear,
    Relu,
    LeakyRelu,
    Sigmoid,
}

#[derive(Debug, Args)]
struct NetworkArgs {
    /// Activation of every stage except the output convolution.
    #[arg(long, value_enum, default_value_t = ActivationKind::LeakyRelu)]
    activation: ActivationKind,
    /// Negative slope of the leaky rectifier.
    #[arg(long, default_value_t = 0.1)]
    alpha: f32,
    #[arg(long, default_value_t = 32)]
    filters: usize,
}

impl NetworkArgs {
    fn topology(&self) -> Result<AutoencoderTopology> {
        let activation = match self.activation {
            ActivationKind::Linear => Activation::Linear,
            ActivationKind::Relu => Activation::Relu,
            ActivationKind::LeakyRelu => Activation::LeakyRelu { alpha: self.alpha },
            ActivationKind::Sigmoid => Activation::Sigmoid,
        };
        AutoencoderTopology::new(&TopologyConfig {
            filters: self.filters,
            activation,
            ..TopologyConfig::default()
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Prepare(args) => prepare(args),
        Command::Summary(args) => summary(args),
        Command::Show(args) => show(args),
    }
}

fn prepare(args: PrepareArgs) -> Result<()> {
    let noise = NoiseConfig {
        noise_factor: args.noise_factor,
        mean: args.noise_mean,
        stddev: args.noise_stddev,
    };
    let training = TrainingConfig {
        optimizer: args.optimizer,
        loss: args.loss,
        batch_size: args.batch_size,
        epochs: args.epochs,
        shuffle: !args.no_shuffle,
    };
    training.validate()?;
    let injector = NoiseInjector::new(noise)?;
    let topology = args.network.topology()?;

    let dataset = load_mnist(&args.data_dir)?;
    let input_shape = dataset.train.image_shape();
    topology.check_input(input_shape)?;
    println!("{}\n", topology.summary(input_shape)?);

    let mut rng = match args.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let data = corrupt(dataset, &injector, &mut rng)?;

    fs::create_dir_all(&args.out_dir)?;
    let files = PlanFiles::default();
    for (name, batch) in [
        (&files.train_noisy, &data.train_noisy),
        (&files.train_clean, &data.train_clean),
        (&files.test_noisy, &data.test_noisy),
        (&files.test_clean, &data.test_clean),
    ] {
        let path = args.out_dir.join(name);
        write_images_gz(&path, batch)?;
        info!(path = %path.display(), images = batch.len(), "wrote batch");
    }

    let plan = TrainingPlan {
        topology,
        input_shape,
        noise,
        seed: args.seed,
        training,
        files,
    };
    let plan_path = args.out_dir.join("plan.json");
    let mut writer = BufWriter::new(File::create(&plan_path)?);
    serde_json::to_writer_pretty(&mut writer, &plan)?;
    writer.flush()?;
    info!(path = %plan_path.display(), "wrote training plan");

    print!("{}", render_grid(&data.test_noisy, &data.test_clean, args.n)?);
    Ok(())
}

fn summary(args: SummaryArgs) -> Result<()> {
    let topology = args.network.topology()?;
    let input = ImageShape::new(args.height, args.width, 1);
    topology.check_input(input)?;
    println!("{}", topology.summary(input)?);
    Ok(())
}

fn show(args: ShowArgs) -> Result<()> {
    let noisy = read_images_gz(&args.noisy)?;
    let reconstructed = read_images_gz(&args.reconstructed)?;

    print!("{}", render_grid(&noisy, &reconstructed, args.n)?);

    if let Some(clean) = &args.clean {
        let clean = read_images_gz(clean)?;
        println!(
            "\nmean squared error: {:.6}",
            mean_squared_error(&reconstructed, &clean)?
        );
    }
    Ok(())
}
