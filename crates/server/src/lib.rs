//! Serving and training for the recommendation engine.
//!
//! - [`PredictionEngine`]: warm, cold-start, similarity, diversified and
//!   contextual predictions over the active model snapshot
//! - [`Trainer`]: dataset build, fit, evaluation, artifact and promotion
//! - [`RecommendationService`]: async facade with prediction timeouts
//! - [`compare::compare_runs`]: two runs' rankings for one user, side by side

pub mod active;
pub mod cold_start;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod strategies;
pub mod training;

pub use active::{ActiveModelSlot, LoadedModel};
pub use cold_start::OverlapScoring;
pub use compare::{RunComparison, RunRanking};
pub use config::{EngineConfig, TrainingConfig};
pub use engine::{ItemReadiness, Neighbour, Prediction, PredictionEngine, PredictionMode};
pub use error::{EngineError, Result};
pub use service::RecommendationService;
pub use strategies::PredictRequest;
pub use training::{Trainer, TrainingOutcome};
