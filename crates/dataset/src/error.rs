//! Error types for dataset construction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    /// Too few interactions to fit anything meaningful
    #[error("Insufficient data: {found} interactions, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    #[error("Invalid split fraction: {0} (expected 0.0 <= fraction < 1.0)")]
    InvalidSplit(f32),
}

pub type Result<T> = std::result::Result<T, DatasetError>;
