//! Layer Contract
//!
//! The interface a network container uses to drive any layer. It is a flat
//! capability trait: shape declaration, phase switching, connectivity
//! statistics, and the two propagation entry points.
//!
//! ## Tensor Lists
//!
//! Propagation takes lists of tensors rather than single tensors so that
//! parameters travel next to the data they act on:
//!
//! ```text
//! forward:   in_data  = [input, (weight), (bias)]     out_data = [output]
//! backward:  in_data  = [input, (weight), (bias)]     out_data = [output]
//!            out_grad = [d output]
//!            in_grad  = [d input, (d weight), (d bias)]
//! ```
//!
//! Slots in parentheses exist only for layers that declare them in
//! [`Layer::in_shape`].

use crate::error::LayerError;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Whether the network is training or evaluating
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetPhase {
    #[default]
    Train,
    Test,
}

/// Role of one tensor slot in a layer's in/out list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Data,
    Weight,
    Bias,
}

/// Declared shape of one tensor slot
///
/// `len` is the per-sample element count for data slots and the total
/// parameter count for weight and bias slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub kind: SlotKind,
    pub len: usize,
}

impl Slot {
    pub fn data(len: usize) -> Self {
        Self {
            kind: SlotKind::Data,
            len,
        }
    }

    pub fn weight(len: usize) -> Self {
        Self {
            kind: SlotKind::Weight,
            len,
        }
    }

    pub fn bias(len: usize) -> Self {
        Self {
            kind: SlotKind::Bias,
            len,
        }
    }
}

/// Common interface for network layers
pub trait Layer: Send {
    /// Short identifier of the layer variant (e.g. `"dropout"`)
    fn layer_type(&self) -> &'static str;

    /// Shapes of the tensors expected in `in_data`
    fn in_shape(&self) -> Vec<Slot>;

    /// Shapes of the tensors written to `out_data`
    fn out_shape(&self) -> Vec<Slot>;

    /// Switch between training and evaluation behaviour
    ///
    /// Takes effect on the next forward call.
    fn set_context(&mut self, phase: NetPhase);

    /// Number of incoming connections of the most connected output unit
    fn fan_in_size(&self) -> usize;

    /// Number of outgoing connections of the most connected input unit
    fn fan_out_size(&self) -> usize;

    /// Number of trainable parameters actually in use
    fn param_size(&self) -> usize {
        0
    }

    /// Compute `out_data` from `in_data`
    fn forward(&mut self, in_data: &[&Tensor], out_data: &mut [&mut Tensor]) -> Result<(), LayerError>;

    /// Propagate `out_grad` back into `in_grad`
    ///
    /// Parameter gradient slots are accumulated into, never overwritten.
    fn backward(
        &mut self,
        in_data: &[&Tensor],
        out_data: &[&Tensor],
        out_grad: &[&Tensor],
        in_grad: &mut [&mut Tensor],
    ) -> Result<(), LayerError>;
}
