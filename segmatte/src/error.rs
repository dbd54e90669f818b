use std::path::PathBuf;

use thiserror::Error;

/// The error type for `segmatte` operations.
///
/// Covers everything from unreadable source images to malformed tensors and
/// weight files that do not fit the network.
#[derive(Error, Debug)]
pub enum SegMatteError {
    /// A source image could not be opened or decoded.
    #[error("failed to open image at '{}': {source}", path.display())]
    ImageLoad {
        /// Path of the image.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// A tensor did not have the expected shape.
    #[error("invalid tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected shape.
        expected: String,
        /// The actual shape.
        actual: String,
    },

    /// Two grids that must line up pixel for pixel do not.
    #[error("dimension mismatch: {left} is {left_dims:?}, {right} is {right_dims:?}")]
    DimensionMismatch {
        /// Name of the first grid.
        left: &'static str,
        /// Dimensions of the first grid.
        left_dims: [usize; 3],
        /// Name of the second grid.
        right: &'static str,
        /// Dimensions of the second grid.
        right_dims: [usize; 3],
    },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A model name did not match any known network.
    #[error("unknown model '{name}' - available models: {available}")]
    UnknownModel {
        /// The requested name.
        name: String,
        /// Comma separated list of supported names.
        available: String,
    },

    /// Tensor data could not be read back into host memory.
    #[error("failed to convert tensor data: {reason}")]
    TensorConversion {
        /// Description of the failure.
        reason: String,
    },

    /// A weight file has an extension no recorder understands.
    #[error("unsupported weight file format: {}", path.display())]
    UnsupportedWeightFormat {
        /// Path of the weight file.
        path: PathBuf,
    },

    /// Loading weights into a network failed.
    #[error("failed to load weights from '{}': {reason}", path.display())]
    WeightLoading {
        /// Path of the weight file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}

/// A specialized `Result` type for `segmatte` operations.
pub type SegMatteResult<T> = Result<T, SegMatteError>;
