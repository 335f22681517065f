//! Connection Tables
//!
//! A partially connected layer is a sparse linear map. Instead of storing a
//! sparse matrix, it keeps the same set of connections indexed three ways,
//! one per contraction it has to perform:
//!
//! ```text
//! weight2io[w] = [(input, output), ...]    weight gradient  (dW)
//! out2wi[o]    = [(weight, input), ...]    forward          (y)
//! in2wo[i]     = [(weight, output), ...]   input gradient   (dx)
//! bias2out[b]  = [output, ...]             bias gradient    (db)
//! out2bias[o]  = bias                      forward          (y)
//! ```
//!
//! All views are written together by [`ConnectionTable::connect_weight`] and
//! [`ConnectionTable::connect_bias`]; none is ever derived from another, so a
//! registered triple appears in every view or in none.
//!
//! ## Serialization
//!
//! The serialized form is the flat list of registrations. Deserializing
//! replays them through the same registration calls, so a table read from
//! disk is range-checked and consistent by construction. Dimensions too
//! large to allocate are reported as errors rather than aborting.

use crate::error::{IndexKind, LayerError};
use serde::{Deserialize, Serialize};

/// One weighted connection from an input unit to an output unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightLink {
    pub input: usize,
    pub output: usize,
    pub weight: usize,
}

/// Assignment of a bias parameter to an output unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasLink {
    pub bias: usize,
    pub output: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ConnectionRecord {
    in_dim: usize,
    out_dim: usize,
    weight_dim: usize,
    bias_dim: usize,
    weights: Vec<WeightLink>,
    biases: Vec<BiasLink>,
}

/// Adjacency lists of a partially connected layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ConnectionRecord", into = "ConnectionRecord")]
pub struct ConnectionTable {
    weight2io: Vec<Vec<(usize, usize)>>,
    out2wi: Vec<Vec<(usize, usize)>>,
    in2wo: Vec<Vec<(usize, usize)>>,
    bias2out: Vec<Vec<usize>>,
    out2bias: Vec<Option<usize>>,
}

fn check_index(kind: IndexKind, index: usize, max: usize) -> Result<(), LayerError> {
    if index >= max {
        return Err(LayerError::IndexOutOfRange { kind, index, max });
    }
    Ok(())
}

/// Allocate `len` copies of `empty`, reporting sizes the allocator refuses
fn try_lists<T: Clone>(what: &'static str, len: usize, empty: T) -> Result<Vec<T>, LayerError> {
    let mut lists = Vec::new();
    lists.try_reserve_exact(len).map_err(|_| {
        LayerError::InvalidConfig(format!("{} dimension {} is too large to allocate", what, len))
    })?;
    lists.resize(len, empty);
    Ok(lists)
}

fn max_len<T>(lists: &[Vec<T>]) -> usize {
    lists.iter().map(Vec::len).max().unwrap_or(0)
}

impl ConnectionTable {
    /// Create an empty table for the given id spaces
    ///
    /// # Panics
    ///
    /// Panics if the lists cannot be allocated. Use [`ConnectionTable::try_new`]
    /// for dimensions that come from untrusted input.
    pub fn new(in_dim: usize, out_dim: usize, weight_dim: usize, bias_dim: usize) -> Self {
        Self {
            weight2io: vec![Vec::new(); weight_dim],
            out2wi: vec![Vec::new(); out_dim],
            in2wo: vec![Vec::new(); in_dim],
            bias2out: vec![Vec::new(); bias_dim],
            out2bias: vec![None; out_dim],
        }
    }

    /// Create an empty table, returning `InvalidConfig` instead of aborting
    /// when a dimension is too large to allocate
    pub fn try_new(
        in_dim: usize,
        out_dim: usize,
        weight_dim: usize,
        bias_dim: usize,
    ) -> Result<Self, LayerError> {
        Ok(Self {
            weight2io: try_lists("weight", weight_dim, Vec::new())?,
            out2wi: try_lists("output", out_dim, Vec::new())?,
            in2wo: try_lists("input", in_dim, Vec::new())?,
            bias2out: try_lists("bias", bias_dim, Vec::new())?,
            out2bias: try_lists("output", out_dim, None)?,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in2wo.len()
    }

    pub fn out_dim(&self) -> usize {
        self.out2wi.len()
    }

    pub fn weight_dim(&self) -> usize {
        self.weight2io.len()
    }

    pub fn bias_dim(&self) -> usize {
        self.bias2out.len()
    }

    /// Register `input → output` through `weight`
    ///
    /// Duplicates are not detected; each registration adds one more term to
    /// every sum it takes part in.
    pub fn connect_weight(&mut self, input: usize, output: usize, weight: usize) -> Result<(), LayerError> {
        check_index(IndexKind::Input, input, self.in_dim())?;
        check_index(IndexKind::Output, output, self.out_dim())?;
        check_index(IndexKind::Weight, weight, self.weight_dim())?;

        self.weight2io[weight].push((input, output));
        self.out2wi[output].push((weight, input));
        self.in2wo[input].push((weight, output));
        Ok(())
    }

    /// Make `bias` the bias source of `output`
    ///
    /// An output has at most one bias. Registering a second one re-points
    /// the output and removes it from the previous bias's output list.
    pub fn connect_bias(&mut self, bias: usize, output: usize) -> Result<(), LayerError> {
        check_index(IndexKind::Bias, bias, self.bias_dim())?;
        check_index(IndexKind::Output, output, self.out_dim())?;

        if let Some(previous) = self.out2bias[output].replace(bias) {
            self.bias2out[previous].retain(|&o| o != output);
        }
        self.bias2out[bias].push(output);
        Ok(())
    }

    /// `(input, output)` pairs sharing `weight`
    pub fn weight_connections(&self, weight: usize) -> &[(usize, usize)] {
        &self.weight2io[weight]
    }

    /// `(weight, input)` pairs feeding `output`
    pub fn output_connections(&self, output: usize) -> &[(usize, usize)] {
        &self.out2wi[output]
    }

    /// `(weight, output)` pairs fed by `input`
    pub fn input_connections(&self, input: usize) -> &[(usize, usize)] {
        &self.in2wo[input]
    }

    /// Outputs whose bias is `bias`
    pub fn bias_outputs(&self, bias: usize) -> &[usize] {
        &self.bias2out[bias]
    }

    /// Bias feeding `output`, if one is registered
    pub fn output_bias(&self, output: usize) -> Option<usize> {
        self.out2bias[output]
    }

    /// Total number of registered weight connections
    pub fn connection_count(&self) -> usize {
        self.weight2io.iter().map(Vec::len).sum()
    }

    /// Largest number of connections into a single output
    pub fn fan_in_size(&self) -> usize {
        max_len(&self.out2wi)
    }

    /// Largest number of connections out of a single input
    pub fn fan_out_size(&self) -> usize {
        max_len(&self.in2wo)
    }

    /// Number of weight and bias ids used by at least one connection
    pub fn param_size(&self) -> usize {
        let weights = self.weight2io.iter().filter(|io| !io.is_empty()).count();
        let biases = self.bias2out.iter().filter(|outs| !outs.is_empty()).count();
        weights + biases
    }

    /// Flat list of weight registrations, grouped by weight id
    pub fn weight_links(&self) -> Vec<WeightLink> {
        self.weight2io
            .iter()
            .enumerate()
            .flat_map(|(weight, io)| {
                io.iter().map(move |&(input, output)| WeightLink {
                    input,
                    output,
                    weight,
                })
            })
            .collect()
    }

    /// Flat list of bias registrations, in output order
    pub fn bias_links(&self) -> Vec<BiasLink> {
        self.out2bias
            .iter()
            .enumerate()
            .filter_map(|(output, bias)| bias.map(|bias| BiasLink { bias, output }))
            .collect()
    }
}

impl From<ConnectionTable> for ConnectionRecord {
    fn from(table: ConnectionTable) -> Self {
        Self {
            in_dim: table.in_dim(),
            out_dim: table.out_dim(),
            weight_dim: table.weight_dim(),
            bias_dim: table.bias_dim(),
            weights: table.weight_links(),
            biases: table.bias_links(),
        }
    }
}

impl TryFrom<ConnectionRecord> for ConnectionTable {
    type Error = LayerError;

    fn try_from(record: ConnectionRecord) -> Result<Self, Self::Error> {
        let mut table = ConnectionTable::try_new(
            record.in_dim,
            record.out_dim,
            record.weight_dim,
            record.bias_dim,
        )?;
        for link in &record.weights {
            table.connect_weight(link.input, link.output, link.weight)?;
        }
        for link in &record.biases {
            table.connect_bias(link.bias, link.output)?;
        }
        Ok(table)
    }
}
