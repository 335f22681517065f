//! Average Pooling Topology
//!
//! Average pooling is a partially connected layer with heavy weight sharing:
//! every input cell of a pooling window connects to the window's output, all
//! connections of one channel share a single weight, and all outputs of one
//! channel share a single bias.
//!
//! ```text
//! channel c, window (oy, ox):
//!     y[c, oy, ox] = (1/k²) · W[c] · Σ_{dy,dx < k} x[c, oy·s + dy, ox·s + dx]  +  b[c]
//! ```
//!
//! With `W[c] = 1` and `b[c] = 0` this is the plain window mean; training the
//! per-channel weight and bias gives the learnable variant.
//!
//! Inputs and outputs are laid out channel-major: `c · h · w + y · w + x`.

use crate::config::PoolingConfig;
use crate::error::LayerError;
use crate::layers::partial_connected::PartialConnected;

fn volume(channels: usize, width: usize, height: usize) -> Option<usize> {
    channels.checked_mul(width)?.checked_mul(height)
}

impl PartialConnected {
    /// Build an average pooling layer
    ///
    /// Uses one weight and one bias per channel and a scale factor of
    /// `1 / pool_size²`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use gatenet::{PartialConnected, PoolingConfig};
    ///
    /// let config = PoolingConfig::new(4, 4, 2, 2);
    /// let layer = PartialConnected::average_pooling(&config).unwrap();
    /// assert_eq!(layer.table().out_dim(), 2 * 2 * 2);
    /// assert_eq!(layer.table().fan_in_size(), 4);
    /// ```
    pub fn average_pooling(config: &PoolingConfig) -> Result<Self, LayerError> {
        config.validate()?;

        let (in_w, in_h) = (config.in_width, config.in_height);
        let (Some(out_w), Some(out_h)) = (config.out_width(), config.out_height()) else {
            return Err(LayerError::InvalidConfig(
                "pooling window does not fit the input".to_string(),
            ));
        };
        let pool = config.pool_size;
        let stride = config.stride();

        let (Some(in_dim), Some(out_dim)) = (
            volume(config.channels, in_w, in_h),
            volume(config.channels, out_w, out_h),
        ) else {
            return Err(LayerError::InvalidConfig(format!(
                "pooling input {}x{}x{} overflows the index space",
                in_w, in_h, config.channels
            )));
        };

        let mut layer = PartialConnected::new(
            in_dim,
            out_dim,
            config.channels,
            config.channels,
            1.0 / (pool as f32 * pool as f32),
        )?
        .with_parallelism(config.parallelism);

        for c in 0..config.channels {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let output = (c * out_h + oy) * out_w + ox;
                    for dy in 0..pool {
                        for dx in 0..pool {
                            let input = (c * in_h + oy * stride + dy) * in_w + ox * stride + dx;
                            layer.connect_weight(input, output, c)?;
                        }
                    }
                    layer.connect_bias(c, output)?;
                }
            }
        }

        Ok(layer)
    }
}
