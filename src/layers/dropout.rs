//! Dropout Layer
//!
//! Dropout is a regularization technique that randomly zeros out activations
//! during training to prevent overfitting. During inference, it passes values
//! through unchanged.
//!
//! ## Inverted Dropout
//!
//! Each unit is dropped with probability `p`. Surviving units are scaled by
//! `1/(1-p)` so the expected activation is the same in both phases:
//!
//! ```text
//! train:  y = keep · x / (1 - p)      keep ~ Bernoulli(1 - p)
//! test:   y = x
//! ```
//!
//! ## Mask Lifetime
//!
//! The keep flags of the last training pass are stored per sample in a
//! [`MaskStore`] and replayed by the backward pass:
//!
//! ```text
//! d x = keep · d y
//! ```
//!
//! Inference forward calls and backward calls never modify the mask. The
//! store grows when a batch larger than any previous one arrives and never
//! shrinks, so rows written for earlier samples stay valid.

use crate::error::{check_count, check_size, LayerError};
use crate::layers::layer::{Layer, NetPhase, Slot};
use crate::parallel::{for_each_index_mut, Parallelism};
use crate::random::{BernoulliSampler, SeedStream};
use crate::tensor::Tensor;
use tracing::{debug, trace, warn};

/// Keep flags of one sample
#[derive(Clone, Debug, PartialEq, Eq)]
struct MaskRow {
    keep: Vec<bool>,
    filled: bool,
}

impl MaskRow {
    fn dropped(width: usize) -> Self {
        Self {
            keep: vec![false; width],
            filled: false,
        }
    }
}

/// Growable sequence of fixed-width per-sample masks
///
/// `false` is the dropped sentinel. A row is *filled* once a training pass
/// has written it; freshly allocated, grown and cleared rows are all-dropped
/// and unfilled, which lets callers tell "never computed" apart from
/// "computed as dropped".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaskStore {
    width: usize,
    rows: Vec<MaskRow>,
}

impl MaskStore {
    /// Create a store holding a single all-dropped row
    pub fn new(width: usize) -> Self {
        Self {
            width,
            rows: vec![MaskRow::dropped(width)],
        }
    }

    /// Units per sample
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of sample rows currently stored
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ensure at least `samples` rows exist
    ///
    /// New rows replicate the width of row 0 and start dropped and unfilled.
    /// Existing rows are never touched. Returns `true` if the store grew.
    pub fn grow_to(&mut self, samples: usize) -> bool {
        if samples <= self.rows.len() {
            return false;
        }
        let width = self.rows.first().map_or(self.width, |row| row.keep.len());
        self.rows.resize(samples, MaskRow::dropped(width));
        true
    }

    /// Keep flags of `sample`, if a row exists for it
    pub fn row(&self, sample: usize) -> Option<&[bool]> {
        self.rows.get(sample).map(|row| row.keep.as_slice())
    }

    /// Whether a training pass wrote `sample` since creation or the last clear
    pub fn is_filled(&self, sample: usize) -> bool {
        self.rows.get(sample).is_some_and(|row| row.filled)
    }

    /// Reset every entry to dropped and every row to unfilled
    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.keep.iter_mut().for_each(|k| *k = false);
            row.filled = false;
        }
    }
}

/// Dropout layer
///
/// Randomly drops units during training and replays the same mask on the
/// backward pass.
///
/// # Example
///
/// ```rust
/// use gatenet::{Dropout, NetPhase, Tensor};
///
/// let mut dropout = Dropout::new(4, 0.5, NetPhase::Train).unwrap().with_seed(42);
/// let input = Tensor::new(vec![1.0; 8], vec![2, 4]);
/// let mut output = Tensor::zeros(vec![1, 4]);
/// dropout.forward_batch(&input, &mut output).unwrap();
///
/// // Every unit is either dropped or doubled
/// assert!(output.data.iter().all(|&y| y == 0.0 || y == 2.0));
/// ```
#[derive(Clone, Debug)]
pub struct Dropout {
    in_dim: usize,
    rate: f32,
    scale: f32,
    phase: NetPhase,
    mask: MaskStore,
    seeds: SeedStream,
    parallelism: Parallelism,
}

/// Check that a dropout rate leaves a finite scale factor
fn validate_rate(rate: f32) -> Result<f32, LayerError> {
    if rate > 0.0 && rate < 1.0 {
        Ok(rate)
    } else {
        Err(LayerError::InvalidDropoutRate { rate })
    }
}

impl Dropout {
    /// Create a new dropout layer
    ///
    /// # Arguments
    ///
    /// * `in_dim` - Number of units per sample
    /// * `rate` - Fraction of units to drop, strictly between 0 and 1
    /// * `phase` - Initial phase
    ///
    /// # Errors
    ///
    /// `InvalidDropoutRate` if `rate` is outside (0, 1), `InvalidConfig` if
    /// `in_dim` is zero.
    pub fn new(in_dim: usize, rate: f32, phase: NetPhase) -> Result<Self, LayerError> {
        let rate = validate_rate(rate)?;
        if in_dim == 0 {
            return Err(LayerError::InvalidConfig(
                "dropout input dimension must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            in_dim,
            rate,
            scale: 1.0 / (1.0 - rate),
            phase,
            mask: MaskStore::new(in_dim),
            seeds: SeedStream::from_entropy(),
            parallelism: Parallelism::default(),
        })
    }

    /// Use a fixed seed so that masks are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeds = SeedStream::from_seed(seed);
        self
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Change the drop probability and the matching scale factor
    pub fn set_rate(&mut self, rate: f32) -> Result<(), LayerError> {
        self.rate = validate_rate(rate)?;
        self.scale = 1.0 / (1.0 - rate);
        Ok(())
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Factor applied to surviving units, `1/(1 - rate)`
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn phase(&self) -> NetPhase {
        self.phase
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Keep flags used for `sample` by the last training pass
    pub fn mask(&self, sample: usize) -> Option<&[bool]> {
        self.mask.row(sample)
    }

    pub fn mask_store(&self) -> &MaskStore {
        &self.mask
    }

    /// Reset the stored masks, e.g. between independent evaluation runs
    pub fn clear_mask(&mut self) {
        self.mask.clear();
    }

    /// Forward pass
    ///
    /// `output` is reshaped to match `input`. In the training phase a fresh
    /// mask is drawn for every sample; in the test phase the input is copied
    /// and the mask is left untouched.
    ///
    /// # Arguments
    ///
    /// * `input` - Input tensor [batch, in_dim]
    /// * `output` - Output tensor, resized to [batch, in_dim]
    pub fn forward_batch(&mut self, input: &Tensor, output: &mut Tensor) -> Result<(), LayerError> {
        check_size("dropout input features", self.in_dim, input.features())?;
        let sample_count = input.batch_size();
        trace!(sample_count, phase = ?self.phase, "dropout forward");

        output.resize_like(input);

        let previous = self.mask.len();
        if self.mask.grow_to(sample_count) {
            debug!(previous, current = sample_count, "grew dropout mask store");
        }

        if self.phase == NetPhase::Test {
            output.data.copy_from_slice(&input.data);
            return Ok(());
        }

        let sampler =
            BernoulliSampler::new(self.rate).ok_or(LayerError::InvalidDropoutRate { rate: self.rate })?;
        let scale = self.scale;
        let rngs = self.seeds.split(sample_count);

        // One unit of work per sample: its mask row, output row, input row and generator
        let mut samples: Vec<_> = self.mask.rows[..sample_count]
            .iter_mut()
            .zip(output.data.chunks_mut(self.in_dim))
            .zip(input.data.chunks(self.in_dim))
            .zip(rngs)
            .map(|(((row, out), inp), rng)| (row, out, inp, rng))
            .collect();

        for_each_index_mut(self.parallelism, &mut samples, |_, (row, out, inp, rng)| {
            for ((keep, y), &x) in row.keep.iter_mut().zip(out.iter_mut()).zip(inp.iter()) {
                *keep = !sampler.draw(rng);
                *y = if *keep { x * scale } else { 0.0 };
            }
            row.filled = true;
        });

        Ok(())
    }

    /// Backward pass
    ///
    /// Writes `prev_delta = keep · curr_delta` using the stored mask of each
    /// sample.
    ///
    /// # Arguments
    ///
    /// * `curr_delta` - Gradient of the output [batch, in_dim]
    /// * `prev_delta` - Gradient of the input, same size as `curr_delta`
    pub fn backward_batch(&self, curr_delta: &Tensor, prev_delta: &mut Tensor) -> Result<(), LayerError> {
        check_size("dropout output gradient features", self.in_dim, curr_delta.features())?;
        check_size(
            "dropout input gradient",
            curr_delta.data.len(),
            prev_delta.data.len(),
        )?;
        let sample_count = curr_delta.batch_size();
        if sample_count > self.mask.len() {
            return Err(LayerError::ShapeMismatch {
                what: "dropout mask rows",
                expected: self.mask.len(),
                actual: sample_count,
            });
        }
        trace!(sample_count, "dropout backward");

        let rows = &self.mask.rows[..sample_count];
        if cfg!(debug_assertions) && rows.iter().any(|row| !row.filled) {
            warn!("dropout backward replays mask rows no training pass has written");
        }

        let mut samples: Vec<_> = prev_delta
            .data
            .chunks_mut(self.in_dim)
            .zip(curr_delta.data.chunks(self.in_dim))
            .zip(rows)
            .map(|((prev, curr), row)| (prev, curr, row))
            .collect();

        for_each_index_mut(self.parallelism, &mut samples, |_, (prev, curr, row)| {
            for ((dx, &dy), &keep) in prev.iter_mut().zip(curr.iter()).zip(row.keep.iter()) {
                *dx = if keep { dy } else { 0.0 };
            }
        });

        Ok(())
    }
}

impl Layer for Dropout {
    fn layer_type(&self) -> &'static str {
        "dropout"
    }

    fn in_shape(&self) -> Vec<Slot> {
        vec![Slot::data(self.in_dim)]
    }

    fn out_shape(&self) -> Vec<Slot> {
        vec![Slot::data(self.in_dim)]
    }

    fn set_context(&mut self, phase: NetPhase) {
        if self.phase != phase {
            debug!(?phase, "dropout phase changed");
        }
        self.phase = phase;
    }

    fn fan_in_size(&self) -> usize {
        1
    }

    fn fan_out_size(&self) -> usize {
        1
    }

    fn forward(&mut self, in_data: &[&Tensor], out_data: &mut [&mut Tensor]) -> Result<(), LayerError> {
        check_count("dropout in_data", 1, in_data.len())?;
        check_count("dropout out_data", 1, out_data.len())?;
        self.forward_batch(in_data[0], out_data[0])
    }

    fn backward(
        &mut self,
        in_data: &[&Tensor],
        out_data: &[&Tensor],
        out_grad: &[&Tensor],
        in_grad: &mut [&mut Tensor],
    ) -> Result<(), LayerError> {
        check_count("dropout in_data", 1, in_data.len())?;
        check_count("dropout out_data", 1, out_data.len())?;
        check_count("dropout out_grad", 1, out_grad.len())?;
        check_count("dropout in_grad", 1, in_grad.len())?;
        self.backward_batch(out_grad[0], in_grad[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(samples: usize, width: usize) -> Tensor {
        let data = (0..samples * width).map(|i| i as f32 + 1.0).collect();
        Tensor::new(data, vec![samples, width])
    }

    #[test]
    fn test_rejects_degenerate_rates() {
        for rate in [0.0, 1.0, -0.5, 1.5, f32::NAN] {
            assert!(
                matches!(
                    Dropout::new(4, rate, NetPhase::Train),
                    Err(LayerError::InvalidDropoutRate { .. })
                ),
                "rate {} should be rejected",
                rate
            );
        }
        assert!(matches!(
            Dropout::new(0, 0.5, NetPhase::Train),
            Err(LayerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_set_rate_updates_scale() {
        let mut dropout = Dropout::new(3, 0.5, NetPhase::Train).unwrap();
        assert_eq!(dropout.scale(), 2.0);
        dropout.set_rate(0.75).unwrap();
        assert_eq!(dropout.rate(), 0.75);
        assert_eq!(dropout.scale(), 4.0);

        assert!(dropout.set_rate(1.0).is_err());
        assert_eq!(dropout.rate(), 0.75, "failed update must not change the rate");
    }

    #[test]
    fn test_mask_store_starts_with_one_unfilled_row() {
        let dropout = Dropout::new(5, 0.3, NetPhase::Train).unwrap();
        let store = dropout.mask_store();
        assert_eq!(store.len(), 1);
        assert_eq!(store.width(), 5);
        assert_eq!(dropout.mask(0), Some(&[false; 5][..]));
        assert!(!store.is_filled(0));
        assert!(dropout.mask(1).is_none());
    }

    #[test]
    fn test_mask_store_growth_keeps_existing_rows() {
        let mut store = MaskStore::new(3);
        store.rows[0].keep = vec![true, false, true];
        store.rows[0].filled = true;

        assert!(store.grow_to(4));
        assert_eq!(store.len(), 4);
        assert_eq!(store.row(0), Some(&[true, false, true][..]));
        assert!(store.is_filled(0));
        for sample in 1..4 {
            assert_eq!(store.row(sample), Some(&[false, false, false][..]));
            assert!(!store.is_filled(sample));
        }

        assert!(!store.grow_to(2), "store never shrinks");
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_forward_test_phase_is_identity() {
        let mut dropout = Dropout::new(4, 0.5, NetPhase::Test).unwrap().with_seed(1);
        let input = ramp(3, 4);
        let mut output = Tensor::zeros(vec![1, 4]);
        dropout.forward_batch(&input, &mut output).unwrap();

        assert_eq!(output, input);
        assert!(!dropout.mask_store().is_filled(0), "mask untouched in test phase");
    }

    #[test]
    fn test_forward_train_scales_survivors() {
        let mut dropout = Dropout::new(16, 0.25, NetPhase::Train).unwrap().with_seed(9);
        let input = ramp(4, 16);
        let mut output = Tensor::zeros(vec![4, 16]);
        dropout.forward_batch(&input, &mut output).unwrap();

        for sample in 0..4 {
            let mask = dropout.mask(sample).unwrap();
            for unit in 0..16 {
                let expected = if mask[unit] {
                    input.at(sample, unit) * dropout.scale()
                } else {
                    0.0
                };
                assert_eq!(output.at(sample, unit), expected);
            }
            assert!(dropout.mask_store().is_filled(sample));
        }
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let mut dropout = Dropout::new(4, 0.5, NetPhase::Train).unwrap();
        let input = ramp(2, 3);
        let mut output = Tensor::zeros(vec![2, 3]);
        assert!(matches!(
            dropout.forward_batch(&input, &mut output),
            Err(LayerError::ShapeMismatch { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn test_same_seed_same_mask_regardless_of_parallelism() {
        let input = ramp(200, 8);
        let mut masks = Vec::new();
        for parallelism in [Parallelism::Sequential, Parallelism::Rayon] {
            let mut dropout = Dropout::new(8, 0.5, NetPhase::Train)
                .unwrap()
                .with_seed(1234)
                .with_parallelism(parallelism);
            let mut output = Tensor::zeros(vec![200, 8]);
            dropout.forward_batch(&input, &mut output).unwrap();
            masks.push(dropout.mask_store().clone());
        }
        assert_eq!(masks[0], masks[1]);
    }

    #[test]
    fn test_backward_replays_mask() {
        let mut dropout = Dropout::new(6, 0.5, NetPhase::Train).unwrap().with_seed(77);
        let input = ramp(2, 6);
        let mut output = Tensor::zeros(vec![2, 6]);
        dropout.forward_batch(&input, &mut output).unwrap();

        let curr_delta = Tensor::new(vec![0.5; 12], vec![2, 6]);
        let mut prev_delta = Tensor::zeros(vec![2, 6]);
        dropout.backward_batch(&curr_delta, &mut prev_delta).unwrap();

        for sample in 0..2 {
            let mask = dropout.mask(sample).unwrap();
            for unit in 0..6 {
                let expected = if mask[unit] { 0.5 } else { 0.0 };
                assert_eq!(prev_delta.at(sample, unit), expected);
            }
        }
    }

    #[test]
    fn test_backward_does_not_change_mask() {
        let mut dropout = Dropout::new(6, 0.5, NetPhase::Train).unwrap().with_seed(5);
        let input = ramp(2, 6);
        let mut output = Tensor::zeros(vec![2, 6]);
        dropout.forward_batch(&input, &mut output).unwrap();
        let before = dropout.mask_store().clone();

        let curr_delta = Tensor::new(vec![1.0; 12], vec![2, 6]);
        let mut prev_delta = Tensor::zeros(vec![2, 6]);
        dropout.backward_batch(&curr_delta, &mut prev_delta).unwrap();
        dropout.backward_batch(&curr_delta, &mut prev_delta).unwrap();

        assert_eq!(dropout.mask_store(), &before);
    }

    #[test]
    fn test_backward_rejects_batch_beyond_mask() {
        let dropout = Dropout::new(2, 0.5, NetPhase::Train).unwrap();
        let curr_delta = Tensor::zeros(vec![3, 2]);
        let mut prev_delta = Tensor::zeros(vec![3, 2]);
        assert!(matches!(
            dropout.backward_batch(&curr_delta, &mut prev_delta),
            Err(LayerError::ShapeMismatch { what: "dropout mask rows", .. })
        ));
    }

    #[test]
    fn test_clear_mask_resets_rows() {
        let mut dropout = Dropout::new(32, 0.1, NetPhase::Train).unwrap().with_seed(3);
        let input = ramp(2, 32);
        let mut output = Tensor::zeros(vec![2, 32]);
        dropout.forward_batch(&input, &mut output).unwrap();
        assert!(dropout.mask(0).unwrap().iter().any(|&k| k));

        dropout.clear_mask();
        for sample in 0..2 {
            assert!(dropout.mask(sample).unwrap().iter().all(|&k| !k));
            assert!(!dropout.mask_store().is_filled(sample));
        }
    }

    #[test]
    fn test_backward_over_cleared_rows_is_zero() {
        let mut dropout = Dropout::new(8, 0.5, NetPhase::Train).unwrap().with_seed(1);
        let input = ramp(2, 8);
        let mut output = Tensor::zeros(vec![2, 8]);
        dropout.forward_batch(&input, &mut output).unwrap();
        dropout.clear_mask();

        let curr_delta = Tensor::new(vec![1.0; 16], vec![2, 8]);
        let mut prev_delta = Tensor::new(vec![7.0; 16], vec![2, 8]);
        dropout.backward_batch(&curr_delta, &mut prev_delta).unwrap();
        assert_eq!(prev_delta.data, vec![0.0; 16]);
    }

    #[test]
    fn test_backward_over_grown_rows_is_zero() {
        let mut dropout = Dropout::new(4, 0.25, NetPhase::Train).unwrap().with_seed(2);
        let input = ramp(1, 4);
        let mut output = Tensor::zeros(vec![1, 4]);
        dropout.forward_batch(&input, &mut output).unwrap();
        let trained = dropout.mask(0).unwrap().to_vec();

        // Inference on a larger batch grows the store without filling new rows
        dropout.set_context(NetPhase::Test);
        let wide = ramp(3, 4);
        dropout.forward_batch(&wide, &mut output).unwrap();
        assert_eq!(dropout.mask_store().len(), 3);

        let curr_delta = Tensor::new(vec![1.0; 12], vec![3, 4]);
        let mut prev_delta = Tensor::new(vec![7.0; 12], vec![3, 4]);
        dropout.backward_batch(&curr_delta, &mut prev_delta).unwrap();

        for unit in 0..4 {
            let expected = if trained[unit] { 1.0 } else { 0.0 };
            assert_eq!(prev_delta.at(0, unit), expected);
        }
        assert_eq!(&prev_delta.data[4..], &[0.0; 8]);
    }

    #[test]
    fn test_set_context_switches_next_forward() {
        let mut dropout = Dropout::new(64, 0.5, NetPhase::Train).unwrap().with_seed(8);
        let input = ramp(1, 64);
        let mut output = Tensor::zeros(vec![1, 64]);

        dropout.forward_batch(&input, &mut output).unwrap();
        assert_ne!(output, input);

        dropout.set_context(NetPhase::Test);
        assert_eq!(dropout.phase(), NetPhase::Test);
        dropout.forward_batch(&input, &mut output).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_layer_contract() {
        let mut dropout = Dropout::new(3, 0.5, NetPhase::Test).unwrap();
        assert_eq!(dropout.layer_type(), "dropout");
        assert_eq!(dropout.in_shape(), vec![Slot::data(3)]);
        assert_eq!(dropout.out_shape(), vec![Slot::data(3)]);
        assert_eq!(dropout.fan_in_size(), 1);
        assert_eq!(dropout.fan_out_size(), 1);
        assert_eq!(dropout.param_size(), 0);

        let input = Tensor::from_rows(&[&[1.0, 2.0, 3.0]]);
        let mut output = Tensor::zeros(vec![1, 3]);
        Layer::forward(&mut dropout, &[&input], &mut [&mut output]).unwrap();
        assert_eq!(output, input);

        assert!(matches!(
            Layer::forward(&mut dropout, &[&input, &input], &mut [&mut output]),
            Err(LayerError::TensorCount { expected: 1, actual: 2, .. })
        ));
    }
}
