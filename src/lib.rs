//! Gatenet: Dropout and Partially Connected Layers
//!
//! Two neural network layers with hand-written forward and backward passes,
//! designed to be driven by an external network container:
//!
//! - [`Dropout`] randomly gates units during training and replays the same
//!   gate on the backward pass
//! - [`PartialConnected`] is a linear map over an explicit list of
//!   `(input, output, weight)` connections, the building block of pooling and
//!   convolution layers
//!
//! # Modules
//!
//! - [`tensor`] - Batched row-major tensors
//! - [`layers`] - The [`Layer`] trait and its implementations
//! - [`config`] - Serde-backed layer configuration
//! - [`parallel`] - Parallel-for over index-disjoint work
//! - [`random`] - Per-sample random streams and Bernoulli draws
//! - [`error`] - [`LayerError`]
//!
//! # Example
//!
//! ```rust
//! use gatenet::{Layer, NetPhase, PartialConnected, PoolingConfig, Tensor};
//!
//! // 2x2 average pooling over a single 4x4 channel
//! let mut pool = PartialConnected::average_pooling(&PoolingConfig::new(4, 4, 1, 2)).unwrap();
//! pool.set_context(NetPhase::Test);
//!
//! let input = Tensor::new((0..16).map(|v| v as f32).collect(), vec![1, 16]);
//! let weight = Tensor::new(vec![1.0], vec![1]);
//! let bias = Tensor::new(vec![0.0], vec![1]);
//! let mut output = Tensor::zeros(vec![1, 4]);
//! pool.forward(&[&input, &weight, &bias], &mut [&mut output]).unwrap();
//! assert_eq!(output.data, vec![2.5, 4.5, 10.5, 12.5]);
//! ```

pub mod config;
pub mod error;
pub mod layers;
pub mod parallel;
pub mod random;
pub mod tensor;

// Re-export main types for convenience
pub use config::{DropoutConfig, LayerConfig, PartialConnectedConfig, PoolingConfig};
pub use error::{IndexKind, LayerError};
pub use layers::{
    BiasLink, ConnectionTable, Dropout, Layer, MaskStore, NetPhase, PartialConnected, Slot, SlotKind,
    WeightLink,
};
pub use parallel::Parallelism;
pub use tensor::Tensor;
