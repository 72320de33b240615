use crate::batch::ImageShape;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    LeakyRelu { alpha: f32 },
    Sigmoid,
}

impl Activation {
    pub fn apply(&self, z: f32) -> f32 {
        match *self {
            Activation::Linear => z,
            Activation::Relu => z.max(0.0),
            Activation::LeakyRelu { alpha } => {
                if z >= 0.0 {
                    z
                } else {
                    alpha * z
                }
            }
            Activation::Sigmoid => 1.0 / (1.0 + f32::exp(-z)),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Linear => write!(f, "linear"),
            Activation::Relu => write!(f, "relu"),
            Activation::LeakyRelu { alpha } => write!(f, "leaky_relu({alpha})"),
            Activation::Sigmoid => write!(f, "sigmoid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    Same,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

/// One transform in the network. Spatial sizes are (rows, columns).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stage {
    Conv2d {
        filters: usize,
        kernel: (usize, usize),
        stride: usize,
        padding: Padding,
        activation: Activation,
    },
    MaxPool2d {
        window: (usize, usize),
        stride: usize,
        padding: Padding,
    },
    UpSample2d {
        factor: (usize, usize),
        interpolation: Interpolation,
    },
}

impl Stage {
    pub fn conv(filters: usize, kernel: usize, activation: Activation) -> Stage {
        Stage::Conv2d {
            filters,
            kernel: (kernel, kernel),
            stride: 1,
            padding: Padding::Same,
            activation,
        }
    }

    pub fn max_pool(size: usize) -> Stage {
        Stage::MaxPool2d {
            window: (size, size),
            stride: size,
            padding: Padding::Same,
        }
    }

    pub fn up_sample(factor: usize, interpolation: Interpolation) -> Stage {
        Stage::UpSample2d {
            factor: (factor, factor),
            interpolation,
        }
    }

    // How much this stage shrinks each spatial axis by.
    fn downscale(&self) -> (usize, usize) {
        match *self {
            Stage::Conv2d { stride, .. } | Stage::MaxPool2d { stride, .. } => (stride, stride),
            Stage::UpSample2d { .. } => (1, 1),
        }
    }

    // How much this stage grows each spatial axis by.
    fn upscale(&self) -> (usize, usize) {
        match *self {
            Stage::UpSample2d { factor, .. } => factor,
            Stage::Conv2d { .. } | Stage::MaxPool2d { .. } => (1, 1),
        }
    }

    fn validate(&self) -> Result<()> {
        let zero = match *self {
            Stage::Conv2d {
                filters,
                kernel,
                stride,
                ..
            } => [filters, kernel.0, kernel.1, stride].contains(&0),
            Stage::MaxPool2d { window, stride, .. } => [window.0, window.1, stride].contains(&0),
            Stage::UpSample2d { factor, .. } => [factor.0, factor.1].contains(&0),
        };
        if zero {
            return Err(Error::InvalidStage(format!(
                "{self:?} has a zero-sized parameter"
            )));
        }
        Ok(())
    }

    pub fn output_shape(&self, input: ImageShape) -> Result<ImageShape> {
        match *self {
            Stage::Conv2d {
                filters,
                kernel,
                stride,
                padding,
                ..
            } => Ok(ImageShape::new(
                sliding_output(input.height, kernel.0, stride, padding, input)?,
                sliding_output(input.width, kernel.1, stride, padding, input)?,
                filters,
            )),
            Stage::MaxPool2d {
                window,
                stride,
                padding,
            } => Ok(ImageShape::new(
                sliding_output(input.height, window.0, stride, padding, input)?,
                sliding_output(input.width, window.1, stride, padding, input)?,
                input.channels,
            )),
            Stage::UpSample2d { factor, .. } => {
                let grown = input
                    .height
                    .checked_mul(factor.0)
                    .zip(input.width.checked_mul(factor.1));
                let (height, width) = grown.ok_or_else(|| {
                    Error::InvalidStage(format!("upsampling {input} by {factor:?} overflows"))
                })?;
                Ok(ImageShape::new(height, width, input.channels))
            }
        }
    }

    /// Trainable weights plus biases, given the number of channels flowing in.
    pub fn parameter_count(&self, in_channels: usize) -> usize {
        match *self {
            Stage::Conv2d {
                filters, kernel, ..
            } => kernel
                .0
                .saturating_mul(kernel.1)
                .saturating_mul(in_channels)
                .saturating_mul(filters)
                .saturating_add(filters),
            Stage::MaxPool2d { .. } | Stage::UpSample2d { .. } => 0,
        }
    }
}

fn sliding_output(
    size: usize,
    window: usize,
    stride: usize,
    padding: Padding,
    input: ImageShape,
) -> Result<usize> {
    match padding {
        Padding::Same => Ok(size.div_ceil(stride)),
        Padding::Valid if size >= window => Ok((size - window) / stride + 1),
        Padding::Valid => Err(Error::shape_mismatch(
            &[window, window],
            &[input.height, input.width],
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub filters: usize,
    pub kernel: usize,
    /// Number of pooling stages in the encoder, each matched by an upsampling stage.
    pub depth: usize,
    pub activation: Activation,
    pub output_channels: usize,
    pub output_activation: Activation,
    pub interpolation: Interpolation,
}

impl Default for TopologyConfig {
    fn default() -> TopologyConfig {
        TopologyConfig {
            filters: 32,
            kernel: 3,
            depth: 2,
            activation: Activation::LeakyRelu { alpha: 0.1 },
            output_channels: 1,
            output_activation: Activation::Sigmoid,
            interpolation: Interpolation::Nearest,
        }
    }
}

// The encoder shrinks the image with repeated convolution + max pooling, and the decoder grows it
// back with convolution + upsampling before a final convolution maps it down to the output
// channels. Construction rejects any stage list whose total downscale differs from its total
// upscale, since the reconstruction could then never line up with the input pixel for pixel.
// Deserializing goes through the same check, so a hand-edited plan cannot sneak past it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StageLists")]
pub struct AutoencoderTopology {
    encoder: Vec<Stage>,
    decoder: Vec<Stage>,
}

// The unchecked shape a topology takes on disk.
#[derive(Deserialize)]
struct StageLists {
    encoder: Vec<Stage>,
    decoder: Vec<Stage>,
}

impl TryFrom<StageLists> for AutoencoderTopology {
    type Error = Error;

    fn try_from(lists: StageLists) -> Result<AutoencoderTopology> {
        AutoencoderTopology::from_stages(lists.encoder, lists.decoder)
    }
}

impl AutoencoderTopology {
    pub fn new(config: &TopologyConfig) -> Result<AutoencoderTopology> {
        const POOL_SIZE: usize = 2;

        let encoder = (0..config.depth)
            .flat_map(|_| {
                [
                    Stage::conv(config.filters, config.kernel, config.activation),
                    Stage::max_pool(POOL_SIZE),
                ]
            })
            .collect();

        let mut decoder: Vec<Stage> = (0..config.depth)
            .flat_map(|_| {
                [
                    Stage::conv(config.filters, config.kernel, config.activation),
                    Stage::up_sample(POOL_SIZE, config.interpolation),
                ]
            })
            .collect();
        decoder.push(Stage::conv(
            config.output_channels,
            config.kernel,
            config.output_activation,
        ));

        AutoencoderTopology::from_stages(encoder, decoder)
    }

    pub fn from_stages(encoder: Vec<Stage>, decoder: Vec<Stage>) -> Result<AutoencoderTopology> {
        for stage in encoder.iter().chain(&decoder) {
            stage.validate()?;
        }

        // Multiply the per-stage factors out axis by axis. Absurd factors can overflow, which is
        // reported as a bad stage rather than left to wrap around.
        let product = |scales: Vec<(usize, usize)>| {
            scales
                .into_iter()
                .try_fold((1usize, 1usize), |(h, w), (sh, sw)| {
                    h.checked_mul(sh).zip(w.checked_mul(sw))
                })
                .ok_or_else(|| {
                    Error::InvalidStage("combined scale factor overflows".to_string())
                })
        };
        let stages = || encoder.iter().chain(&decoder);
        let downscale = product(stages().map(Stage::downscale).collect())?;
        let upscale = product(stages().map(Stage::upscale).collect())?;

        if downscale != upscale {
            return Err(Error::ShapeInvariantViolation { downscale, upscale });
        }

        debug!(
            encoder_stages = encoder.len(),
            decoder_stages = decoder.len(),
            ?downscale,
            "autoencoder topology validated"
        );
        Ok(AutoencoderTopology { encoder, decoder })
    }

    pub fn encoder_stages(&self) -> &[Stage] {
        &self.encoder
    }

    pub fn decoder_stages(&self) -> &[Stage] {
        &self.decoder
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.encoder.iter().chain(&self.decoder)
    }

    pub fn output_shape(&self, input: ImageShape) -> Result<ImageShape> {
        self.stages()
            .try_fold(input, |shape, stage| stage.output_shape(shape))
    }

    /// Fails unless an image of shape `input` comes out of the network with that same shape.
    pub fn check_input(&self, input: ImageShape) -> Result<()> {
        let output = self.output_shape(input)?;
        if output != input {
            return Err(Error::shape_mismatch(&input.to_vec(), &output.to_vec()));
        }
        Ok(())
    }

    pub fn summary(&self, input: ImageShape) -> Result<Summary> {
        let mut rows = Vec::with_capacity(self.encoder.len() + self.decoder.len());
        let mut shape = input;

        for (prefix, stages) in [("en", &self.encoder), ("de", &self.decoder)] {
            let (mut convs, mut pools, mut upsamples) = (0, 0, 0);
            for stage in stages {
                let name = match stage {
                    Stage::Conv2d { .. } => {
                        convs += 1;
                        format!("{prefix}_conv{convs}")
                    }
                    Stage::MaxPool2d { .. } => {
                        pools += 1;
                        format!("{prefix}_pool{pools}")
                    }
                    Stage::UpSample2d { .. } => {
                        upsamples += 1;
                        format!("upsampling{upsamples}")
                    }
                };
                let parameters = stage.parameter_count(shape.channels);
                shape = stage.output_shape(shape)?;
                rows.push(SummaryRow {
                    name,
                    output_shape: shape,
                    parameters,
                });
            }
        }

        Ok(Summary { input, rows })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub name: String,
    pub output_shape: ImageShape,
    pub parameters: usize,
}

/// Per-stage output shapes and parameter counts for a given input shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub input: ImageShape,
    pub rows: Vec<SummaryRow>,
}

impl Summary {
    pub fn total_parameters(&self) -> usize {
        self.rows.iter().map(|row| row.parameters).sum()
    }

    pub fn output_shape(&self) -> ImageShape {
        self.rows.last().map_or(self.input, |row| row.output_shape)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<16}{:<20}{:>10}", "Layer", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(46))?;
        writeln!(f, "{:<16}{:<20}{:>10}", "inputs", self.input.to_string(), 0)?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<16}{:<20}{:>10}",
                row.name,
                row.output_shape.to_string(),
                row.parameters
            )?;
        }
        writeln!(f, "{}", "=".repeat(46))?;
        write!(f, "Total params: {}", self.total_parameters())
    }
}
