//! Neural Network Layers
//!
//! This module contains the layer implementations and the contract they
//! share. Each layer provides both forward and backward passes.
//!
//! ## Layers
//!
//! - **layer**: The [`Layer`] trait, phases and slot shapes
//! - **dropout**: Dropout regularization with a replayable per-sample mask
//! - **connectivity**: Adjacency tables of a sparse linear map
//! - **partial_connected**: Linear layer over explicitly registered connections
//! - **pooling**: Average pooling built on the partially connected layer
//!
//! ## Design Pattern
//!
//! Layers do not own activations or parameters. The caller hands in every
//! tensor and the layer writes results into caller-owned buffers:
//!
//! ```rust,ignore
//! impl Layer for SomeLayer {
//!     fn forward(&mut self, in_data: &[&Tensor], out_data: &mut [&mut Tensor]) -> Result<(), LayerError>;
//!     fn backward(
//!         &mut self,
//!         in_data: &[&Tensor],
//!         out_data: &[&Tensor],
//!         out_grad: &[&Tensor],
//!         in_grad: &mut [&mut Tensor],
//!     ) -> Result<(), LayerError>;
//! }
//! ```
//!
//! The only state a layer keeps between calls is what it needs to replay the
//! forward pass: the dropout mask, or the connection tables.

pub mod connectivity;
pub mod dropout;
pub mod layer;
pub mod partial_connected;
pub mod pooling;

// Re-export main types for convenience
pub use connectivity::{BiasLink, ConnectionTable, WeightLink};
pub use dropout::{Dropout, MaskStore};
pub use layer::{Layer, NetPhase, Slot, SlotKind};
pub use partial_connected::PartialConnected;
