use crate::types::RunId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Training run {0} not found")]
    RunNotFound(RunId),

    #[error("Training run {0} has not completed")]
    RunNotCompleted(RunId),

    #[error("Training run {0} is already finished")]
    RunAlreadyFinished(RunId),

    #[error("Registry changed concurrently (expected generation {expected}, found {found})")]
    PromotionConflict { expected: u64, found: u64 },

    #[error("Promotion still conflicting after {0} attempts")]
    RetriesExhausted(usize),

    #[error("Artifact for run {0} not found")]
    ArtifactNotFound(RunId),

    #[error("Registry lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
