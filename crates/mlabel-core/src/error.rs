//! Error types for the multi-label benchmark.

use thiserror::Error;

/// Main error type shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Dataset error (bad manifest, unknown label, empty split)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model construction or forward error
    #[error("Model error: {0}")]
    Model(String),

    /// Training error
    #[error("Training error: {0}")]
    Training(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checkpoint save/load error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported loss: {0} (expected one of bce, focal, asl)")]
    UnsupportedLoss(String),

    #[error("Unsupported optimizer: {0} (expected one of adam, adamw, sgd, rmsprop)")]
    UnsupportedOptimizer(String),

    #[error("Unsupported model: {0} (expected resnet, resnet_modified, effnet or transformer)")]
    UnsupportedModel(String),

    /// Loss parameters that cannot be parsed or do not fit the selected loss
    #[error("Invalid loss parameters: {0}")]
    InvalidLossParams(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Specialized Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, Error>;
