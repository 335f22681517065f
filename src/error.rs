//! Layer Errors
//!
//! Every failure in this crate is a caller precondition violation: a bad
//! hyperparameter, a connection id outside the declared dimensions, or a
//! tensor whose size does not fit the layer. They are reported as
//! [`LayerError`] before any tensor element is touched.

use std::fmt;

/// Which id space a connection index belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    Input,
    Output,
    Weight,
    Bias,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Input => "input",
            IndexKind::Output => "output",
            IndexKind::Weight => "weight",
            IndexKind::Bias => "bias",
        };
        f.write_str(name)
    }
}

/// Error returned by layer construction, configuration and propagation
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// Dropout rate outside (0, 1)
    #[error("dropout rate must lie strictly between 0 and 1, got {rate}")]
    InvalidDropoutRate { rate: f32 },
    /// Non-finite scale factor of a partially connected layer
    #[error("scale factor must be finite, got {factor}")]
    InvalidScaleFactor { factor: f32 },
    /// Connection id outside its declared id space
    #[error("{kind} index {index} is out of range 0..{max}")]
    IndexOutOfRange {
        kind: IndexKind,
        index: usize,
        max: usize,
    },
    /// Tensor size that does not fit the layer
    #[error("{what}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Wrong number of tensors in an in/out list
    #[error("{what}: expected {expected} tensors, got {actual}")]
    TensorCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Returned when connections are registered after the layer has
    /// already propagated data
    #[error("connections cannot be registered after the first forward or backward pass")]
    ConnectionsFrozen,
    /// Hyperparameters that cannot describe a layer
    #[error("invalid layer configuration: {0}")]
    InvalidConfig(String),
    /// Configuration text that is not valid JSON for a layer
    #[error("malformed layer configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Check that a tensor list has exactly `expected` entries
pub(crate) fn check_count(what: &'static str, expected: usize, actual: usize) -> Result<(), LayerError> {
    if expected != actual {
        return Err(LayerError::TensorCount {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Check that a size matches the size the layer expects
pub(crate) fn check_size(what: &'static str, expected: usize, actual: usize) -> Result<(), LayerError> {
    if expected != actual {
        return Err(LayerError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = LayerError::IndexOutOfRange {
            kind: IndexKind::Weight,
            index: 7,
            max: 4,
        };
        assert_eq!(err.to_string(), "weight index 7 is out of range 0..4");

        let err = LayerError::InvalidDropoutRate { rate: 1.0 };
        assert_eq!(
            err.to_string(),
            "dropout rate must lie strictly between 0 and 1, got 1"
        );
    }

    #[test]
    fn test_checks() {
        assert!(check_count("in_data", 3, 3).is_ok());
        assert!(matches!(
            check_count("in_data", 3, 1),
            Err(LayerError::TensorCount { expected: 3, actual: 1, .. })
        ));
        assert!(matches!(
            check_size("bias", 2, 5),
            Err(LayerError::ShapeMismatch { expected: 2, actual: 5, .. })
        ));
    }
}
