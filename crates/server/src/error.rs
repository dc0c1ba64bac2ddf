//! Errors surfaced to callers of the prediction engine and service.

use data_loader::DataLoadError;
use dataset::DatasetError;
use models::ModelError;
use pipeline::PipelineError;
use registry::RegistryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not enough data to train: {found} interactions, {required} required")]
    InsufficientData { found: usize, required: usize },

    #[error("Unknown {kind} {id}")]
    UnknownEntity { kind: &'static str, id: u32 },

    #[error("No trained model is active")]
    ModelNotTrained,

    #[error("{operation} is not supported by {algorithm}; use {alternative} instead")]
    UnsupportedOperation {
        operation: String,
        algorithm: String,
        alternative: &'static str,
    },

    #[error("Concurrent promotion kept conflicting")]
    PromotionConflict,

    #[error("Prediction timed out after {0:?}")]
    PredictionTimeout(Duration),

    #[error("Data error: {0}")]
    Data(#[from] DataLoadError),

    #[error("Dataset error: {0}")]
    Dataset(DatasetError),

    #[error("Model error: {0}")]
    Model(ModelError),

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    pub fn unknown_user(id: u32) -> Self {
        EngineError::UnknownEntity { kind: "user", id }
    }

    pub fn unknown_item(id: u32) -> Self {
        EngineError::UnknownEntity { kind: "item", id }
    }
}

impl From<DatasetError> for EngineError {
    fn from(e: DatasetError) -> Self {
        match e {
            DatasetError::InsufficientData { found, required } => {
                EngineError::InsufficientData { found, required }
            }
            other => EngineError::Dataset(other),
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::NotTrained => EngineError::ModelNotTrained,
            ModelError::Unsupported {
                algorithm,
                capability,
            } => EngineError::UnsupportedOperation {
                operation: capability,
                algorithm,
                alternative: "the popularity fallback",
            },
            other => EngineError::Model(other),
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::PromotionConflict { .. } | RegistryError::RetriesExhausted(_) => {
                EngineError::PromotionConflict
            }
            other => EngineError::Registry(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
