//! Training hyperparameters and the algorithm identifier.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FAMILY: &str = "default";
pub const DEFAULT_EPOCHS: usize = 30;
pub const DEFAULT_LEARNING_RATE: f32 = 0.05;
pub const DEFAULT_EMBEDDING_DIM: usize = 30;
pub const DEFAULT_REGULARIZATION: f32 = 0.0001;
pub const DEFAULT_NEIGHBOURS: usize = 20;
pub const DEFAULT_SEED: u64 = 42;

/// Identifier of a concrete trainable algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Hybrid factorization: id embeddings plus feature embeddings, BPR loss
    MatrixFactorization,
    /// Item-based nearest neighbours over interaction columns
    ItemKnn,
    /// Damped per-item mean, not personalised
    Baseline,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::MatrixFactorization,
        Algorithm::ItemKnn,
        Algorithm::Baseline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::MatrixFactorization => "matrix_factorization",
            Algorithm::ItemKnn => "item_knn",
            Algorithm::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "matrix_factorization" | "mf" | "hybrid" => Ok(Algorithm::MatrixFactorization),
            "item_knn" | "knn" => Ok(Algorithm::ItemKnn),
            "baseline" | "popularity" => Ok(Algorithm::Baseline),
            other => Err(ModelError::Unsupported {
                algorithm: other.to_string(),
                capability: "training".to_string(),
            }),
        }
    }
}

/// Everything needed to reproduce one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    /// Model family the run competes in for promotion
    pub family: String,
    pub algorithm: Algorithm,
    pub use_features: bool,
    pub epochs: usize,
    pub learning_rate: f32,
    pub embedding_dim: usize,
    pub regularization: f32,
    /// Neighbourhood size for `ItemKnn`
    pub neighbours: usize,
    pub seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            family: DEFAULT_FAMILY.to_string(),
            algorithm: Algorithm::MatrixFactorization,
            use_features: true,
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            regularization: DEFAULT_REGULARIZATION,
            neighbours: DEFAULT_NEIGHBOURS,
            seed: DEFAULT_SEED,
        }
    }
}

impl TrainParams {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    pub fn with_features(mut self, use_features: bool) -> Self {
        self.use_features = use_features;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    pub fn with_regularization(mut self, regularization: f32) -> Self {
        self.regularization = regularization;
        self
    }

    pub fn with_neighbours(mut self, neighbours: usize) -> Self {
        self.neighbours = neighbours;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject values no algorithm can train with.
    pub fn validate(&self) -> Result<()> {
        if self.family.trim().is_empty() {
            return Err(invalid("family", "must not be empty"));
        }
        if self.embedding_dim == 0 {
            return Err(invalid("embedding_dim", "must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", "must be a positive number"));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(invalid("regularization", "must be zero or positive"));
        }
        if self.neighbours == 0 {
            return Err(invalid("neighbours", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ModelError {
    ModelError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}
