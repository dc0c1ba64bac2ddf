//! # Registry Crate
//!
//! Durable history of training runs and the single active model per family.
//!
//! ## Components
//!
//! - **types**: `TrainingRun`, `ModelRegistryEntry`, `RegistryState`
//! - **store**: `RegistryStore` with generation-checked commits
//!   (`InMemoryStore`, `JsonFileStore`)
//! - **selector**: `PromotionPolicy`, the pure promote/reject decision
//! - **registry**: `ModelRegistry` (run lifecycle, evaluate-and-promote,
//!   force promote, promote best, inspection)
//! - **artifact**: `ArtifactStore` for per-run `ModelBundle`s
//!
//! Registry metadata and model artifacts are stored separately, so listing
//! runs never deserializes a model.

pub mod artifact;
pub mod error;
pub mod registry;
pub mod selector;
pub mod store;
pub mod types;

pub use artifact::{ArtifactStore, ModelBundle};
pub use error::{RegistryError, Result};
pub use registry::{DEFAULT_MAX_RETRIES, ModelRegistry};
pub use selector::{Decision, PromotionPolicy, PromotionReason, PromotionResult, RejectionReason};
pub use store::{InMemoryStore, JsonFileStore, REGISTRY_FILE, RegistryStore};
pub use types::{MetricSnapshot, ModelRegistryEntry, RegistryState, RunId, RunStatus, TrainingRun};
