//! Engine and training configuration.

use crate::cold_start::OverlapScoring;
use dataset::{DEFAULT_MIN_INTERACTIONS, DEFAULT_SPLIT_SEED, DEFAULT_TEST_FRACTION};
use models::params::DEFAULT_FAMILY;
use pipeline::{DEFAULT_EXPLORATION_RATE, NEUTRAL_SCORE};
use std::time::Duration;

pub const DEFAULT_PREDICTION_TIMEOUT: Duration = Duration::from_millis(800);
pub const DEFAULT_POPULARITY_MIN_COUNT: u32 = 2;
pub const READINESS_MIN_FEATURES: usize = 3;
pub const READINESS_MIN_INTERACTIONS: u32 = 5;

/// Serving-side settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model family whose active run is served
    pub family: String,
    pub prediction_timeout: Duration,
    pub exploration_rate: f64,
    pub neutral_score: f32,
    /// Items with fewer interactions are left out of the popularity fallback
    pub popularity_min_count: u32,
    pub overlap_scoring: OverlapScoring,
    /// Candidate pool for contextual re-ranking, as a multiple of `k`
    pub contextual_pool_factor: usize,
    pub readiness_min_features: usize,
    pub readiness_min_interactions: u32,
    /// Fixed seed for the exploration coin; `None` draws from the OS
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            family: DEFAULT_FAMILY.to_string(),
            prediction_timeout: DEFAULT_PREDICTION_TIMEOUT,
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            neutral_score: NEUTRAL_SCORE,
            popularity_min_count: DEFAULT_POPULARITY_MIN_COUNT,
            overlap_scoring: OverlapScoring::default(),
            contextual_pool_factor: 2,
            readiness_min_features: READINESS_MIN_FEATURES,
            readiness_min_interactions: READINESS_MIN_INTERACTIONS,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    pub fn with_prediction_timeout(mut self, timeout: Duration) -> Self {
        self.prediction_timeout = timeout;
        self
    }

    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate;
        self
    }

    pub fn with_popularity_min_count(mut self, count: u32) -> Self {
        self.popularity_min_count = count;
        self
    }

    pub fn with_overlap_scoring(mut self, scoring: OverlapScoring) -> Self {
        self.overlap_scoring = scoring;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

/// Training-side settings that are not model hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub min_interactions: usize,
    pub test_fraction: f32,
    pub split_seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_interactions: DEFAULT_MIN_INTERACTIONS,
            test_fraction: DEFAULT_TEST_FRACTION,
            split_seed: DEFAULT_SPLIT_SEED,
        }
    }
}

impl TrainingConfig {
    pub fn with_min_interactions(mut self, min: usize) -> Self {
        self.min_interactions = min;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f32) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = seed;
        self
    }
}
