//! Classifier Model
//!
//! The network has a fixed topology. Only its constants change:
//!
//! ```text
//! Image (H, W, 3)
//!     ↓  pad 1 → conv 3×3 (first_conv)  → relu → maxpool 2×2
//!     ↓  pad 1 → conv 3×3 (second_conv) → relu → maxpool 2×2
//!     ↓  pad 1 → conv 3×3 (third_conv)  → relu → maxpool 2×2
//!     ↓  pad 1 → conv 3×3 (fourth_conv) → relu → maxpool 2×2
//!     ↓  flatten
//!     ↓  dense (first_dense) → relu
//!     ↓  dense (labeller)    → softmax
//! Probabilities [labels.len()]
//! ```
//!
//! Stage names match the layer names the weights were trained under.
//!
//! A [`Model`] is built once, validated, and then only read. It is `Send +
//! Sync`, so any number of threads can classify images against one shared
//! `&Model`.
//!
//! ## Weight File Format
//!
//! ```text
//! "PETAL_WTS"              9 bytes magic
//! version                  1 byte, currently 1
//! config_len: u32          little-endian
//! config                   JSON-encoded Config
//! 12 tensors               first_conv kernels, first_conv bias, ...,
//!                          first_dense weights, first_dense bias,
//!                          labeller weights, labeller bias
//! ```
//!
//! Each tensor is `rank: u32`, `rank × dim: u32`, `count: u32`, then `count`
//! little-endian `f32` values. Kernel banks are HWCK, dense weights are
//! `[inputs, outputs]`.
//!
//! ## Example
//!
//! ```rust
//! use petal::{Config, Model};
//!
//! let model = Model::random(Config::tiny(), 42).unwrap();
//! assert_eq!(model.config.flattened_len().unwrap(), 2);
//! ```

use crate::error::{PetalError, Result};
use crate::layers::{Conv2d, Dense, DenseWeights, KernelBank};
use crate::tensor::Shape;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

const MAGIC: &[u8; 9] = b"PETAL_WTS";
const VERSION: u8 = 1;
/// Upper bound on elements in a single stored tensor
const MAX_TENSOR_ELEMENTS: usize = 1 << 26;
const MAX_CONFIG_BYTES: usize = 1 << 16;

/// Model configuration
///
/// Describes the sizes that vary between trained variants of the network.
/// The sequence of stages itself is fixed.
///
/// # Fields
///
/// - `image_height`, `image_width`, `image_channels`: required input shape
/// - `kernel_size`: square convolution kernel side
/// - `padding`: zero padding applied on every side before each convolution
/// - `conv_filters`: output channels of the four convolutions
/// - `pool_size`: square max-pool window (and stride)
/// - `dense_units`: width of the hidden dense layer
/// - `labels`: category names, in the labeller's output order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub image_height: usize,
    pub image_width: usize,
    pub image_channels: usize,
    pub kernel_size: usize,
    pub padding: usize,
    pub conv_filters: [usize; 4],
    pub pool_size: usize,
    pub dense_units: usize,
    pub labels: Vec<String>,
}

impl Default for Config {
    /// The five-class flower classifier: 128×128 RGB input
    fn default() -> Self {
        Self {
            image_height: 128,
            image_width: 128,
            image_channels: 3,
            kernel_size: 3,
            padding: 1,
            conv_filters: [32, 16, 16, 8],
            pool_size: 2,
            dense_units: 256,
            labels: ["daisy", "dandelion", "roses", "sunflowers", "tulips"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// A tiny variant for quick tests: 16×16 input, a handful of filters
    ///
    /// Four 2×2 pools take 16 down to 1, so the dense layer sees
    /// `1 × 1 × 2 = 2` features.
    pub fn tiny() -> Self {
        Self {
            image_height: 16,
            image_width: 16,
            conv_filters: [4, 4, 4, 2],
            dense_units: 8,
            ..Self::default()
        }
    }

    pub fn input_shape(&self) -> Shape {
        Shape::new(self.image_height, self.image_width, self.image_channels)
    }

    /// Input channel count of convolution `stage` (0-based)
    pub fn conv_in_channels(&self, stage: usize) -> usize {
        if stage == 0 {
            self.image_channels
        } else {
            self.conv_filters[stage - 1]
        }
    }

    /// Feature map shape entering flatten
    ///
    /// # Errors
    ///
    /// - [`PetalError::InputTooSmall`] if the image is too small to survive
    ///   the four convolution and pooling stages
    /// - [`PetalError::InvalidInput`] if any intermediate feature map would
    ///   have more elements than fit in `usize`
    pub fn feature_shape(&self) -> Result<Shape> {
        let (mut h, mut w) = (self.image_height, self.image_width);
        let pool = self.pool_size.max(1);
        for stage in 0..self.conv_filters.len() {
            let padded = self
                .padding
                .checked_mul(2)
                .and_then(|border| {
                    let shape = Shape::new(
                        h.checked_add(border)?,
                        w.checked_add(border)?,
                        self.conv_in_channels(stage),
                    );
                    shape.checked_len().map(|_| shape)
                })
                .ok_or_else(|| oversized(stage, "padded input"))?;

            if padded.height < self.kernel_size || padded.width < self.kernel_size {
                return Err(PetalError::too_small(
                    "config",
                    format!(
                        "stage {} input {}x{} is smaller than kernel {}",
                        stage + 1,
                        padded.height,
                        padded.width,
                        self.kernel_size
                    ),
                ));
            }
            let conv_h = padded.height - self.kernel_size + 1;
            let conv_w = padded.width - self.kernel_size + 1;
            if Shape::new(conv_h, conv_w, self.conv_filters[stage])
                .checked_len()
                .is_none()
            {
                return Err(oversized(stage, "convolution output"));
            }

            h = conv_h / pool;
            w = conv_w / pool;
            if h == 0 || w == 0 {
                return Err(PetalError::too_small(
                    "config",
                    format!("stage {} pools the feature map away", stage + 1),
                ));
            }
        }
        Ok(Shape::new(h, w, self.conv_filters[3]))
    }

    /// Length of the flattened feature vector (512 for the default config)
    pub fn flattened_len(&self) -> Result<usize> {
        // Pooled maps are never larger than the checked convolution outputs
        Ok(self.feature_shape()?.len())
    }

    /// Number of trained constants (weights and biases) the config describes
    ///
    /// # Errors
    ///
    /// Whatever [`Config::feature_shape`] reports, or
    /// [`PetalError::InvalidInput`] if the count doesn't fit in `usize`.
    pub fn parameter_count(&self) -> Result<usize> {
        let flat = self.flattened_len()?;
        let k = self.kernel_size;
        let mut stages = Vec::with_capacity(6);
        for stage in 0..self.conv_filters.len() {
            stages.push((
                [k, k, self.conv_in_channels(stage)],
                self.conv_filters[stage],
            ));
        }
        stages.push(([flat, 1, 1], self.dense_units));
        stages.push(([self.dense_units, 1, 1], self.labels.len()));

        stages
            .iter()
            .try_fold(0usize, |total, &([a, b, c], outputs)| {
                let weights = a.checked_mul(b)?.checked_mul(c)?.checked_mul(outputs)?;
                total.checked_add(weights)?.checked_add(outputs)
            })
            .ok_or_else(|| {
                PetalError::InvalidInput("model has more parameters than fit in usize".to_string())
            })
    }

    /// Reject configurations no model could satisfy
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("image_height", self.image_height),
            ("image_width", self.image_width),
            ("image_channels", self.image_channels),
            ("kernel_size", self.kernel_size),
            ("pool_size", self.pool_size),
            ("dense_units", self.dense_units),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(PetalError::InvalidInput(format!("{} must be non-zero", name)));
            }
        }
        if self.conv_filters.contains(&0) {
            return Err(PetalError::InvalidInput(format!(
                "conv_filters must be non-zero, got {:?}",
                self.conv_filters
            )));
        }
        if self.labels.is_empty() {
            return Err(PetalError::InvalidInput("label set is empty".to_string()));
        }
        if self.input_shape().checked_len().is_none() {
            return Err(PetalError::InvalidInput(format!(
                "input shape {} has too many elements",
                self.input_shape()
            )));
        }
        self.parameter_count()?;
        Ok(())
    }
}

fn oversized(stage: usize, what: &str) -> PetalError {
    PetalError::InvalidInput(format!(
        "stage {} {} has too many elements",
        stage + 1,
        what
    ))
}

/// The complete set of trained constants plus the config they belong to
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub config: Config,
    pub first_conv: Conv2d,
    pub second_conv: Conv2d,
    pub third_conv: Conv2d,
    pub fourth_conv: Conv2d,
    pub first_dense: Dense,
    pub labeller: Dense,
}

impl Model {
    /// Assemble and validate a model
    ///
    /// # Errors
    ///
    /// [`PetalError::ShapeMismatch`] naming the first stage whose constants
    /// don't fit the config.
    pub fn new(config: Config, convs: [Conv2d; 4], first_dense: Dense, labeller: Dense) -> Result<Self> {
        let [first_conv, second_conv, third_conv, fourth_conv] = convs;
        let model = Self {
            config,
            first_conv,
            second_conv,
            third_conv,
            fourth_conv,
            first_dense,
            labeller,
        };
        model.validate()?;
        Ok(model)
    }

    /// Randomly initialised model, deterministic for a given seed
    ///
    /// Weights are drawn from N(0, √(2 / fan_in)) (He initialisation), biases
    /// are zero. Useful for tests, benchmarks and smoke runs; predictions are
    /// meaningless.
    pub fn random(config: Config, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut sample = |count: usize, fan_in: usize| -> Result<Vec<f32>> {
            let std = (2.0 / fan_in as f32).sqrt();
            let normal = Normal::new(0.0f32, std)
                .map_err(|e| PetalError::InvalidInput(format!("bad init scale: {}", e)))?;
            Ok((0..count).map(|_| normal.sample(&mut rng)).collect())
        };

        let k = config.kernel_size;
        let mut convs = Vec::with_capacity(4);
        for stage in 0..4 {
            let c = config.conv_in_channels(stage);
            let n = config.conv_filters[stage];
            let kernels = KernelBank::new(sample(k * k * c * n, k * k * c)?, k, k, c, n)?;
            convs.push(Conv2d::new(kernels, vec![0.0; n])?);
        }
        let convs: [Conv2d; 4] = convs
            .try_into()
            .map_err(|_| PetalError::InvalidInput("expected four conv stages".to_string()))?;

        let flat = config.flattened_len()?;
        let hidden = config.dense_units;
        let classes = config.labels.len();
        let first_dense = Dense::new(
            DenseWeights::new(sample(flat * hidden, flat)?, flat, hidden)?,
            vec![0.0; hidden],
        )?;
        let labeller = Dense::new(
            DenseWeights::new(sample(hidden * classes, hidden)?, hidden, classes)?,
            vec![0.0; classes],
        )?;

        Self::new(config, convs, first_dense, labeller)
    }

    pub fn convs(&self) -> [&Conv2d; 4] {
        [
            &self.first_conv,
            &self.second_conv,
            &self.third_conv,
            &self.fourth_conv,
        ]
    }

    pub fn labels(&self) -> &[String] {
        &self.config.labels
    }

    /// Check that every stage's constants chain with the next
    pub fn validate(&self) -> Result<()> {
        let config = &self.config;
        config.validate()?;

        let k = config.kernel_size;
        for (stage, conv) in self.convs().into_iter().enumerate() {
            let expected = [k, k, config.conv_in_channels(stage), config.conv_filters[stage]];
            if conv.kernels.dims() != expected {
                return Err(PetalError::shape_mismatch(
                    STAGE_NAMES[stage],
                    format!("kernel bank {:?}", expected),
                    format!("kernel bank {:?}", conv.kernels.dims()),
                ));
            }
            if conv.bias.len() != expected[3] {
                return Err(PetalError::shape_mismatch(
                    STAGE_NAMES[stage],
                    format!("{} biases", expected[3]),
                    format!("{} biases", conv.bias.len()),
                ));
            }
        }

        let flat = config.flattened_len()?;
        check_dense("first_dense", &self.first_dense, flat, config.dense_units)?;
        check_dense(
            "labeller",
            &self.labeller,
            config.dense_units,
            config.labels.len(),
        )?;
        Ok(())
    }

    /// Write the model in the binary weight file format
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&[VERSION])?;

        let config_json = serde_json::to_string(&self.config)?;
        write_u32(writer, config_json.len())?;
        writer.write_all(config_json.as_bytes())?;

        for conv in self.convs() {
            write_tensor(writer, &conv.kernels.dims(), &conv.kernels.data)?;
            write_tensor(writer, &[conv.bias.len()], &conv.bias)?;
        }
        for dense in [&self.first_dense, &self.labeller] {
            let w = &dense.weights;
            write_tensor(writer, &[w.inputs, w.outputs], &w.data)?;
            write_tensor(writer, &[dense.bias.len()], &dense.bias)?;
        }
        Ok(())
    }

    /// Read and validate a model from the binary weight file format
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 9];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(PetalError::InvalidFormat(
                "invalid header - expected PETAL_WTS".to_string(),
            ));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != VERSION {
            return Err(PetalError::InvalidFormat(format!(
                "unsupported weight file version: {}",
                version[0]
            )));
        }

        let config_len = read_u32(reader)?;
        if config_len > MAX_CONFIG_BYTES {
            return Err(PetalError::InvalidFormat(format!(
                "config section of {} bytes is too large",
                config_len
            )));
        }
        let mut config_bytes = vec![0u8; config_len];
        reader.read_exact(&mut config_bytes)?;
        let config: Config = serde_json::from_slice(&config_bytes)?;
        config.validate()?;

        let k = config.kernel_size;
        let mut convs = Vec::with_capacity(4);
        for (stage, name) in STAGE_NAMES.iter().enumerate() {
            let c = config.conv_in_channels(stage);
            let n = config.conv_filters[stage];
            let kernels = read_expected(reader, *name, &[k, k, c, n])?;
            let bias = read_expected(reader, *name, &[n])?;
            convs.push(Conv2d::new(KernelBank::new(kernels, k, k, c, n)?, bias)?);
        }
        let convs: [Conv2d; 4] = convs
            .try_into()
            .map_err(|_| PetalError::InvalidFormat("expected four conv stages".to_string()))?;

        let flat = config.flattened_len()?;
        let hidden = config.dense_units;
        let classes = config.labels.len();
        let first_dense = read_dense(reader, "first_dense", flat, hidden)?;
        let labeller = read_dense(reader, "labeller", hidden, classes)?;

        Self::new(config, convs, first_dense, labeller)
    }

    /// Save to a weight file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), labels = self.config.labels.len(), "saved weights");
        Ok(())
    }

    /// Load from a weight file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let model = Self::read_from(&mut reader)?;
        info!(
            path = %path.display(),
            input = %model.config.input_shape(),
            labels = model.config.labels.len(),
            "loaded weights"
        );
        Ok(model)
    }
}

const STAGE_NAMES: [&str; 4] = ["first_conv", "second_conv", "third_conv", "fourth_conv"];

fn check_dense(name: &'static str, dense: &Dense, inputs: usize, outputs: usize) -> Result<()> {
    let w = &dense.weights;
    if w.inputs != inputs || w.outputs != outputs || dense.bias.len() != outputs {
        return Err(PetalError::shape_mismatch(
            name,
            format!("weights [{}, {}] and {} biases", inputs, outputs, outputs),
            format!(
                "weights [{}, {}] and {} biases",
                w.inputs,
                w.outputs,
                dense.bias.len()
            ),
        ));
    }
    Ok(())
}

fn write_u32<W: Write>(writer: &mut W, value: usize) -> Result<()> {
    let value = u32::try_from(value)
        .map_err(|_| PetalError::InvalidFormat(format!("{} does not fit in u32", value)))?;
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<usize> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

fn write_tensor<W: Write>(writer: &mut W, dims: &[usize], data: &[f32]) -> Result<()> {
    write_u32(writer, dims.len())?;
    for &dim in dims {
        write_u32(writer, dim)?;
    }
    write_u32(writer, data.len())?;
    for &val in data {
        writer.write_all(&val.to_le_bytes())?;
    }
    Ok(())
}

fn read_tensor<R: Read>(reader: &mut R) -> Result<(Vec<usize>, Vec<f32>)> {
    let rank = read_u32(reader)?;
    if rank > 4 {
        return Err(PetalError::InvalidFormat(format!("tensor rank {} too large", rank)));
    }
    let dims = (0..rank)
        .map(|_| read_u32(reader))
        .collect::<Result<Vec<usize>>>()?;

    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .filter(|&n| n <= MAX_TENSOR_ELEMENTS)
        .ok_or_else(|| {
            PetalError::InvalidFormat(format!("tensor dims {:?} are too large", dims))
        })?;

    let count = read_u32(reader)?;
    if count != expected {
        return Err(PetalError::InvalidFormat(format!(
            "tensor with dims {:?} declares {} elements",
            dims, count
        )));
    }

    let mut bytes = vec![0u8; count * 4];
    reader.read_exact(&mut bytes)?;
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((dims, data))
}

fn read_expected<R: Read>(reader: &mut R, stage: &'static str, expected: &[usize]) -> Result<Vec<f32>> {
    let (dims, data) = read_tensor(reader)?;
    if dims != expected {
        return Err(PetalError::shape_mismatch(
            stage,
            format!("{:?}", expected),
            format!("{:?}", dims),
        ));
    }
    Ok(data)
}

fn read_dense<R: Read>(
    reader: &mut R,
    stage: &'static str,
    inputs: usize,
    outputs: usize,
) -> Result<Dense> {
    let weights = read_expected(reader, stage, &[inputs, outputs])?;
    let bias = read_expected(reader, stage, &[outputs])?;
    Dense::new(DenseWeights::new(weights, inputs, outputs)?, bias)
}
