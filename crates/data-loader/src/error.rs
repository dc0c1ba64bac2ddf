//! Errors raised while reading, validating or writing the interaction store.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataLoadError {
    /// A required `.dat` file is absent
    #[error("Missing data file {0:?}")]
    MissingFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row that does not split into the expected `::` fields
    #[error("{file}:{line}: {reason}")]
    Malformed {
        file: &'static str,
        line: usize,
        reason: String,
    },

    /// Rating or feature intensity outside [1, 5]
    #[error("{field} {value} is outside [1, 5]")]
    OutOfRange { field: &'static str, value: f32 },

    /// Row pointing at a user, item or feature the catalog does not have
    #[error("Unknown {entity} {id}")]
    UnknownReference { entity: &'static str, id: u32 },
}

pub type Result<T> = std::result::Result<T, DataLoadError>;
