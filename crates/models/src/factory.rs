//! Algorithm identifier → trainable model constructor.

use crate::baseline::BaselineTrainer;
use crate::error::{ModelError, Result};
use crate::factorization::FactorizationTrainer;
use crate::knn::ItemKnnTrainer;
use crate::model::{FittedModel, TrainableModel};
use crate::params::{Algorithm, TrainParams};
use dataset::{FeatureMatrix, InteractionMatrix};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

type Constructor = Arc<dyn Fn() -> Box<dyn TrainableModel> + Send + Sync>;

/// Registry of trainable algorithms.
///
/// Call sites pick an algorithm through `TrainParams::algorithm` only; the
/// factory is the single place that maps it to an implementation.
#[derive(Clone, Default)]
pub struct ModelFactory {
    constructors: BTreeMap<Algorithm, Constructor>,
}

impl ModelFactory {
    /// An empty factory; see `with_defaults` for the built-in algorithms.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self::new()
            .register(Algorithm::MatrixFactorization, || Box::new(FactorizationTrainer))
            .register(Algorithm::ItemKnn, || Box::new(ItemKnnTrainer))
            .register(Algorithm::Baseline, || Box::new(BaselineTrainer))
    }

    /// Add or replace the constructor for `algorithm`.
    pub fn register<F>(mut self, algorithm: Algorithm, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn TrainableModel> + Send + Sync + 'static,
    {
        self.constructors.insert(algorithm, Arc::new(constructor));
        self
    }

    pub fn algorithms(&self) -> Vec<Algorithm> {
        self.constructors.keys().copied().collect()
    }

    pub fn create(&self, algorithm: Algorithm) -> Result<Box<dyn TrainableModel>> {
        self.constructors
            .get(&algorithm)
            .map(|constructor| constructor())
            .ok_or_else(|| ModelError::Unsupported {
                algorithm: algorithm.to_string(),
                capability: "training".to_string(),
            })
    }

    /// Create the configured algorithm and fit it.
    #[instrument(skip_all, fields(algorithm = %params.algorithm))]
    pub fn fit(
        &self,
        params: &TrainParams,
        interactions: &InteractionMatrix,
        user_features: Option<&FeatureMatrix>,
        item_features: Option<&FeatureMatrix>,
    ) -> Result<FittedModel> {
        params.validate()?;
        let model = self.create(params.algorithm)?;
        info!("Fitting {} on {} interactions", params.algorithm, interactions.nnz());
        model.fit(interactions, user_features, item_features, params)
    }
}

impl std::fmt::Debug for ModelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelFactory")
            .field("algorithms", &self.algorithms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_algorithm() {
        let factory = ModelFactory::with_defaults();
        assert_eq!(factory.algorithms().len(), Algorithm::ALL.len());
        for algorithm in Algorithm::ALL {
            assert_eq!(factory.create(algorithm).unwrap().algorithm(), algorithm);
        }
    }

    #[test]
    fn test_unregistered_algorithm() {
        let factory = ModelFactory::new().register(Algorithm::Baseline, || Box::new(BaselineTrainer));
        assert!(matches!(
            factory.create(Algorithm::ItemKnn),
            Err(ModelError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_register_replaces() {
        let factory = ModelFactory::with_defaults()
            .register(Algorithm::ItemKnn, || Box::new(BaselineTrainer));
        assert_eq!(
            factory.create(Algorithm::ItemKnn).unwrap().algorithm(),
            Algorithm::Baseline
        );
    }
}
