//! Partially Connected Layer
//!
//! A linear layer whose connectivity is an explicit list of
//! `(input, output, weight)` triples instead of a dense `in × out` matrix.
//! Weights may be shared by many connections, which is what pooling and
//! convolution layers are built from.
//!
//! ## Forward Pass
//!
//! ```text
//! y[o] = scale · Σ_{(w,i) ∈ out2wi[o]} W[w] · x[i]  +  b[out2bias[o]]
//! ```
//!
//! ## Backward Pass
//!
//! ```text
//! dx[i]  = scale · Σ_{(w,o) ∈ in2wo[i]}     W[w] · dy[o]
//! dW[w] += scale · Σ_{(i,o) ∈ weight2io[w]} x[i] · dy[o]     (summed over the batch)
//! db[b] +=         Σ_{o ∈ bias2out[b]}      dy[o]            (summed over the batch)
//! ```
//!
//! `dW` and `db` are accumulated into, so callers zero them before a batch
//! if they want per-batch rather than running gradients.
//!
//! ## Parallelism
//!
//! Within one sample, every output (forward), input (`dx`), weight id (`dW`)
//! and bias id (`db`) is an independent unit of work with its own target
//! slot. Samples are processed one after another because all of them add
//! into the same `dW` and `db` slots.

use crate::error::{check_count, check_size, LayerError};
use crate::layers::connectivity::ConnectionTable;
use crate::layers::layer::{Layer, NetPhase, Slot};
use crate::parallel::{for_each_index_mut, Parallelism};
use crate::tensor::Tensor;
use tracing::{trace, warn};

/// Layer with explicitly registered sparse connectivity
///
/// # Example
///
/// ```rust
/// use gatenet::{PartialConnected, Tensor};
///
/// // Two inputs share one weight into a single output
/// let mut layer = PartialConnected::new(2, 1, 1, 1, 1.0).unwrap();
/// layer.connect_weight(0, 0, 0).unwrap();
/// layer.connect_weight(1, 0, 0).unwrap();
/// layer.connect_bias(0, 0).unwrap();
///
/// let input = Tensor::from_rows(&[&[3.0, 5.0]]);
/// let weight = Tensor::new(vec![2.0], vec![1]);
/// let bias = Tensor::new(vec![1.0], vec![1]);
/// let mut output = Tensor::zeros(vec![1, 1]);
/// layer.forward_batch(&input, &weight, &bias, &mut output).unwrap();
/// assert_eq!(output.data, vec![17.0]);
/// ```
#[derive(Clone, Debug)]
pub struct PartialConnected {
    table: ConnectionTable,
    scale_factor: f32,
    frozen: bool,
    parallelism: Parallelism,
}

fn validate_scale(factor: f32) -> Result<f32, LayerError> {
    if factor.is_finite() {
        Ok(factor)
    } else {
        Err(LayerError::InvalidScaleFactor { factor })
    }
}

impl PartialConnected {
    /// Create a layer with no connections
    ///
    /// # Arguments
    ///
    /// * `in_dim` - Input units per sample
    /// * `out_dim` - Output units per sample
    /// * `weight_dim` - Number of weight parameters
    /// * `bias_dim` - Number of bias parameters
    /// * `scale_factor` - Constant multiplier applied to every weighted sum
    pub fn new(
        in_dim: usize,
        out_dim: usize,
        weight_dim: usize,
        bias_dim: usize,
        scale_factor: f32,
    ) -> Result<Self, LayerError> {
        let table = ConnectionTable::try_new(in_dim, out_dim, weight_dim, bias_dim)?;
        Self::from_table(table, scale_factor)
    }

    /// Create a layer around an existing connection table
    pub fn from_table(table: ConnectionTable, scale_factor: f32) -> Result<Self, LayerError> {
        Ok(Self {
            table,
            scale_factor: validate_scale(scale_factor)?,
            frozen: false,
            parallelism: Parallelism::default(),
        })
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Register `input → output` through `weight`
    ///
    /// Only allowed before the first forward or backward pass.
    pub fn connect_weight(&mut self, input: usize, output: usize, weight: usize) -> Result<(), LayerError> {
        if self.frozen {
            return Err(LayerError::ConnectionsFrozen);
        }
        self.table.connect_weight(input, output, weight)
    }

    /// Make `bias` the bias source of `output`
    ///
    /// Outputs never registered here get no bias term. Only allowed before
    /// the first forward or backward pass.
    pub fn connect_bias(&mut self, bias: usize, output: usize) -> Result<(), LayerError> {
        if self.frozen {
            return Err(LayerError::ConnectionsFrozen);
        }
        self.table.connect_bias(bias, output)
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Whether the connection table can no longer change
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn freeze(&mut self) {
        if !self.frozen && cfg!(debug_assertions) && self.table.connection_count() == 0 {
            warn!(
                out_dim = self.table.out_dim(),
                "partial connected layer propagates without weight connections, outputs are bias only"
            );
        }
        self.frozen = true;
    }

    fn check_params(&self, weight: &Tensor, bias: &Tensor) -> Result<(), LayerError> {
        check_size("partial connected weight", self.table.weight_dim(), weight.data.len())?;
        check_size("partial connected bias", self.table.bias_dim(), bias.data.len())
    }

    /// Forward pass
    ///
    /// An output with no registered bias gets no bias term; it does not fall
    /// back to bias 0.
    ///
    /// # Arguments
    ///
    /// * `input` - Input tensor [batch, in_dim]
    /// * `weight` - Weight parameters, `weight_dim` elements
    /// * `bias` - Bias parameters, `bias_dim` elements
    /// * `output` - Output tensor [batch, out_dim], overwritten
    pub fn forward_batch(
        &mut self,
        input: &Tensor,
        weight: &Tensor,
        bias: &Tensor,
        output: &mut Tensor,
    ) -> Result<(), LayerError> {
        check_size("partial connected input features", self.table.in_dim(), input.features())?;
        self.check_params(weight, bias)?;
        let sample_count = input.batch_size();
        check_size(
            "partial connected output",
            sample_count * self.table.out_dim(),
            output.data.len(),
        )?;
        self.freeze();
        trace!(sample_count, "partial connected forward");

        let table = &self.table;
        let scale = self.scale_factor;
        for sample in 0..sample_count {
            let x = input.sample(sample);
            let y = &mut output.data[sample * table.out_dim()..(sample + 1) * table.out_dim()];

            for_each_index_mut(self.parallelism, y, |o, y_o| {
                let sum: f32 = table
                    .output_connections(o)
                    .iter()
                    .map(|&(w, i)| weight.data[w] * x[i])
                    .sum();
                let b = table.output_bias(o).map_or(0.0, |b| bias.data[b]);
                *y_o = sum * scale + b;
            });
        }

        Ok(())
    }

    /// Backward pass
    ///
    /// Overwrites `prev_delta` and accumulates into `weight_grad` and
    /// `bias_grad`.
    ///
    /// # Arguments
    ///
    /// * `prev_out` - Input of the forward pass [batch, in_dim]
    /// * `weight` - Weight parameters, `weight_dim` elements
    /// * `curr_delta` - Gradient of the output [batch, out_dim]
    /// * `prev_delta` - Gradient of the input [batch, in_dim]
    /// * `weight_grad` - Weight gradient accumulator, `weight_dim` elements
    /// * `bias_grad` - Bias gradient accumulator, `bias_dim` elements
    pub fn backward_batch(
        &mut self,
        prev_out: &Tensor,
        weight: &Tensor,
        curr_delta: &Tensor,
        prev_delta: &mut Tensor,
        weight_grad: &mut Tensor,
        bias_grad: &mut Tensor,
    ) -> Result<(), LayerError> {
        let in_dim = self.table.in_dim();
        let out_dim = self.table.out_dim();
        check_size("partial connected input features", in_dim, prev_out.features())?;
        let sample_count = prev_out.batch_size();
        check_size("partial connected output gradient", sample_count * out_dim, curr_delta.data.len())?;
        check_size("partial connected input gradient", sample_count * in_dim, prev_delta.data.len())?;
        check_size("partial connected weight", self.table.weight_dim(), weight.data.len())?;
        self.check_params(weight_grad, bias_grad)?;
        self.freeze();
        trace!(sample_count, "partial connected backward");

        let table = &self.table;
        let scale = self.scale_factor;
        for sample in 0..sample_count {
            let x = prev_out.sample(sample);
            let dy = &curr_delta.data[sample * out_dim..(sample + 1) * out_dim];
            let dx = &mut prev_delta.data[sample * in_dim..(sample + 1) * in_dim];

            for_each_index_mut(self.parallelism, dx, |i, dx_i| {
                let sum: f32 = table
                    .input_connections(i)
                    .iter()
                    .map(|&(w, o)| weight.data[w] * dy[o])
                    .sum();
                *dx_i = sum * scale;
            });

            for_each_index_mut(self.parallelism, &mut weight_grad.data, |w, dw| {
                let sum: f32 = table
                    .weight_connections(w)
                    .iter()
                    .map(|&(i, o)| x[i] * dy[o])
                    .sum();
                *dw += sum * scale;
            });

            for_each_index_mut(self.parallelism, &mut bias_grad.data, |b, db| {
                *db += table.bias_outputs(b).iter().map(|&o| dy[o]).sum::<f32>();
            });
        }

        Ok(())
    }
}

impl Layer for PartialConnected {
    fn layer_type(&self) -> &'static str {
        "partial_connected"
    }

    fn in_shape(&self) -> Vec<Slot> {
        vec![
            Slot::data(self.table.in_dim()),
            Slot::weight(self.table.weight_dim()),
            Slot::bias(self.table.bias_dim()),
        ]
    }

    fn out_shape(&self) -> Vec<Slot> {
        vec![Slot::data(self.table.out_dim())]
    }

    // Propagation is identical in both phases
    fn set_context(&mut self, _phase: NetPhase) {}

    fn fan_in_size(&self) -> usize {
        self.table.fan_in_size()
    }

    fn fan_out_size(&self) -> usize {
        self.table.fan_out_size()
    }

    fn param_size(&self) -> usize {
        self.table.param_size()
    }

    fn forward(&mut self, in_data: &[&Tensor], out_data: &mut [&mut Tensor]) -> Result<(), LayerError> {
        check_count("partial connected in_data", 3, in_data.len())?;
        check_count("partial connected out_data", 1, out_data.len())?;
        self.forward_batch(in_data[0], in_data[1], in_data[2], out_data[0])
    }

    fn backward(
        &mut self,
        in_data: &[&Tensor],
        out_data: &[&Tensor],
        out_grad: &[&Tensor],
        in_grad: &mut [&mut Tensor],
    ) -> Result<(), LayerError> {
        check_count("partial connected in_data", 3, in_data.len())?;
        check_count("partial connected out_data", 1, out_data.len())?;
        check_count("partial connected out_grad", 1, out_grad.len())?;
        match in_grad {
            [prev_delta, weight_grad, bias_grad] => self.backward_batch(
                in_data[0],
                in_data[1],
                out_grad[0],
                prev_delta,
                weight_grad,
                bias_grad,
            ),
            _ => Err(LayerError::TensorCount {
                what: "partial connected in_grad",
                expected: 3,
                actual: in_grad.len(),
            }),
        }
    }
}
