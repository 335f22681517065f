//! Layer Configuration
//!
//! Hyperparameters for every layer in this crate, deserializable from JSON so
//! that a network description can be stored next to its weights.
//!
//! ## Example
//!
//! ```rust
//! use gatenet::{Layer, LayerConfig};
//!
//! let config = LayerConfig::from_json(r#"{ "type": "dropout", "in_dim": 128, "rate": 0.1 }"#).unwrap();
//! let layer = config.build().unwrap();
//! assert_eq!(layer.layer_type(), "dropout");
//! ```
//!
//! Every config has a `validate()` that reports bad hyperparameters before a
//! layer is built, and a `build()` that constructs it.

use crate::error::LayerError;
use crate::layers::connectivity::{BiasLink, WeightLink};
use crate::layers::dropout::Dropout;
use crate::layers::layer::{Layer, NetPhase};
use crate::layers::partial_connected::PartialConnected;
use crate::parallel::Parallelism;
use serde::{Deserialize, Serialize};

/// Dropout configuration
///
/// # Fields
///
/// - `in_dim`: Units per sample
/// - `rate`: Fraction of units dropped during training, strictly inside (0, 1)
/// - `phase`: Initial phase (default: train)
/// - `seed`: Fixed mask seed; drawn from entropy when absent
/// - `parallelism`: Execution strategy across samples
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropoutConfig {
    pub in_dim: usize,
    pub rate: f32,
    #[serde(default)]
    pub phase: NetPhase,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub parallelism: Parallelism,
}

impl DropoutConfig {
    pub fn new(in_dim: usize, rate: f32) -> Self {
        Self {
            in_dim,
            rate,
            phase: NetPhase::Train,
            seed: None,
            parallelism: Parallelism::default(),
        }
    }

    pub fn validate(&self) -> Result<(), LayerError> {
        self.build().map(|_| ())
    }

    pub fn build(&self) -> Result<Dropout, LayerError> {
        let dropout = Dropout::new(self.in_dim, self.rate, self.phase)?.with_parallelism(self.parallelism);
        Ok(match self.seed {
            Some(seed) => dropout.with_seed(seed),
            None => dropout,
        })
    }
}

fn unit_scale() -> f32 {
    1.0
}

/// Partially connected layer configuration
///
/// The topology is given as explicit weight and bias links. A config with
/// empty link lists describes a layer whose connections are registered in
/// code after `build()`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartialConnectedConfig {
    pub in_dim: usize,
    pub out_dim: usize,
    pub weight_dim: usize,
    pub bias_dim: usize,
    #[serde(default = "unit_scale")]
    pub scale_factor: f32,
    #[serde(default)]
    pub weights: Vec<WeightLink>,
    #[serde(default)]
    pub biases: Vec<BiasLink>,
    #[serde(default)]
    pub parallelism: Parallelism,
}

impl PartialConnectedConfig {
    pub fn new(in_dim: usize, out_dim: usize, weight_dim: usize, bias_dim: usize) -> Self {
        Self {
            in_dim,
            out_dim,
            weight_dim,
            bias_dim,
            scale_factor: unit_scale(),
            weights: Vec::new(),
            biases: Vec::new(),
            parallelism: Parallelism::default(),
        }
    }

    pub fn validate(&self) -> Result<(), LayerError> {
        self.build().map(|_| ())
    }

    pub fn build(&self) -> Result<PartialConnected, LayerError> {
        let mut layer = PartialConnected::new(
            self.in_dim,
            self.out_dim,
            self.weight_dim,
            self.bias_dim,
            self.scale_factor,
        )?
        .with_parallelism(self.parallelism);
        for link in &self.weights {
            layer.connect_weight(link.input, link.output, link.weight)?;
        }
        for link in &self.biases {
            layer.connect_bias(link.bias, link.output)?;
        }
        Ok(layer)
    }
}

fn pooled_len(len: usize, pool_size: usize, stride: usize) -> Option<usize> {
    Some(len.checked_sub(pool_size)?.checked_div(stride)? + 1)
}

/// Average pooling configuration
///
/// # Fields
///
/// - `in_width`, `in_height`: Spatial size of each input channel
/// - `channels`: Number of channels (one weight and one bias each)
/// - `pool_size`: Side length of the square pooling window
/// - `stride`: Window step, defaults to `pool_size` (non-overlapping)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolingConfig {
    pub in_width: usize,
    pub in_height: usize,
    pub channels: usize,
    pub pool_size: usize,
    #[serde(default)]
    pub stride: Option<usize>,
    #[serde(default)]
    pub parallelism: Parallelism,
}

impl PoolingConfig {
    pub fn new(in_width: usize, in_height: usize, channels: usize, pool_size: usize) -> Self {
        Self {
            in_width,
            in_height,
            channels,
            pool_size,
            stride: None,
            parallelism: Parallelism::default(),
        }
    }

    pub fn stride(&self) -> usize {
        self.stride.unwrap_or(self.pool_size)
    }

    /// Output width, `(in_width - pool_size) / stride + 1`
    ///
    /// `None` when the window does not fit or the stride is zero.
    pub fn out_width(&self) -> Option<usize> {
        pooled_len(self.in_width, self.pool_size, self.stride())
    }

    /// Output height, `(in_height - pool_size) / stride + 1`
    pub fn out_height(&self) -> Option<usize> {
        pooled_len(self.in_height, self.pool_size, self.stride())
    }

    pub fn validate(&self) -> Result<(), LayerError> {
        let invalid = |msg: String| Err(LayerError::InvalidConfig(msg));
        if self.in_width == 0 || self.in_height == 0 || self.channels == 0 {
            return invalid(format!(
                "pooling input {}x{}x{} has an empty dimension",
                self.in_width, self.in_height, self.channels
            ));
        }
        if self.pool_size == 0 || self.stride() == 0 {
            return invalid("pooling window and stride must be non-zero".to_string());
        }
        if self.out_width().is_none() || self.out_height().is_none() {
            return invalid(format!(
                "pooling window {} does not fit input {}x{}",
                self.pool_size, self.in_width, self.in_height
            ));
        }
        Ok(())
    }

    pub fn build(&self) -> Result<PartialConnected, LayerError> {
        PartialConnected::average_pooling(self)
    }
}

/// Configuration of any layer, tagged by `"type"`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerConfig {
    Dropout(DropoutConfig),
    PartialConnected(PartialConnectedConfig),
    AveragePooling(PoolingConfig),
}

impl LayerConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, LayerError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), LayerError> {
        match self {
            LayerConfig::Dropout(config) => config.validate(),
            LayerConfig::PartialConnected(config) => config.validate(),
            LayerConfig::AveragePooling(config) => config.validate(),
        }
    }

    pub fn build(&self) -> Result<Box<dyn Layer>, LayerError> {
        Ok(match self {
            LayerConfig::Dropout(config) => Box::new(config.build()?),
            LayerConfig::PartialConnected(config) => Box::new(config.build()?),
            LayerConfig::AveragePooling(config) => Box::new(config.build()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropout_defaults() {
        let config = LayerConfig::from_json(r#"{ "type": "dropout", "in_dim": 8, "rate": 0.2 }"#).unwrap();
        assert_eq!(config, LayerConfig::Dropout(DropoutConfig::new(8, 0.2)));
    }

    #[test]
    fn test_dropout_rate_validated() {
        let config = DropoutConfig::new(8, 1.0);
        assert!(matches!(
            config.validate(),
            Err(LayerError::InvalidDropoutRate { .. })
        ));
    }

    #[test]
    fn test_dropout_seed_and_phase() {
        let config = LayerConfig::from_json(
            r#"{ "type": "dropout", "in_dim": 4, "rate": 0.5, "phase": "test", "seed": 9, "parallelism": "sequential" }"#,
        )
        .unwrap();
        let LayerConfig::Dropout(dropout) = &config else {
            panic!("expected dropout config, got {:?}", config);
        };
        assert_eq!(dropout.phase, NetPhase::Test);
        assert_eq!(dropout.seed, Some(9));
        assert_eq!(dropout.parallelism, Parallelism::Sequential);
        assert_eq!(dropout.build().unwrap().phase(), NetPhase::Test);
    }

    #[test]
    fn test_partial_connected_links() {
        let config = LayerConfig::from_json(
            r#"{
                "type": "partial_connected",
                "in_dim": 2, "out_dim": 1, "weight_dim": 1, "bias_dim": 1,
                "weights": [
                    { "input": 0, "output": 0, "weight": 0 },
                    { "input": 1, "output": 0, "weight": 0 }
                ],
                "biases": [{ "bias": 0, "output": 0 }]
            }"#,
        )
        .unwrap();
        let layer = config.build().unwrap();
        assert_eq!(layer.layer_type(), "partial_connected");
        assert_eq!(layer.fan_in_size(), 2);
        assert_eq!(layer.param_size(), 2);

        let LayerConfig::PartialConnected(inner) = config else {
            panic!("expected partial connected config");
        };
        assert_eq!(inner.scale_factor, 1.0);
    }

    #[test]
    fn test_partial_connected_bad_link() {
        let mut config = PartialConnectedConfig::new(2, 1, 1, 1);
        config.weights.push(WeightLink {
            input: 0,
            output: 0,
            weight: 3,
        });
        assert!(matches!(
            config.validate(),
            Err(LayerError::IndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_pooling_stride_defaults_to_window() {
        let config = PoolingConfig::new(6, 4, 1, 2);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.out_width(), Some(3));
        assert_eq!(config.out_height(), Some(2));

        let overlapping = PoolingConfig {
            stride: Some(1),
            ..config
        };
        assert_eq!(overlapping.out_width(), Some(5));
        assert_eq!(overlapping.out_height(), Some(3));
    }

    #[test]
    fn test_pooling_window_larger_than_input_has_no_output_size() {
        let config = PoolingConfig::new(2, 2, 1, 3);
        assert_eq!(config.out_width(), None);
        assert_eq!(config.out_height(), None);
        assert!(matches!(config.validate(), Err(LayerError::InvalidConfig(_))));

        let zero_stride = PoolingConfig {
            stride: Some(0),
            ..PoolingConfig::new(4, 4, 1, 2)
        };
        assert_eq!(zero_stride.out_width(), None);
    }

    #[test]
    fn test_partial_connected_rejects_unallocatable_dimension() {
        let config = LayerConfig::from_json(
            r#"{
                "type": "partial_connected",
                "in_dim": 1000000000000000000, "out_dim": 1, "weight_dim": 1, "bias_dim": 1
            }"#,
        )
        .unwrap();
        assert!(matches!(config.build(), Err(LayerError::InvalidConfig(_))));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pooling_validation() {
        assert!(PoolingConfig::new(4, 4, 1, 0).validate().is_err());
        assert!(PoolingConfig::new(4, 4, 0, 2).validate().is_err());
        assert!(PoolingConfig::new(4, 1, 1, 2).validate().is_err());
        let zero_stride = PoolingConfig {
            stride: Some(0),
            ..PoolingConfig::new(4, 4, 1, 2)
        };
        assert!(zero_stride.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            LayerConfig::from_json(r#"{ "type": "convolution" }"#),
            Err(LayerError::Config(_))
        ));
    }
}
