use thiserror::Error;

/// Errors raised by trainable models and their fitted snapshots.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Model has not been trained")]
    NotTrained,

    #[error("{algorithm} does not support {capability}")]
    Unsupported {
        algorithm: String,
        capability: String,
    },

    #[error("{kind} index {index} out of range (size {size})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        size: usize,
    },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
