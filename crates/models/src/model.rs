//! The trainable-model capability and the fitted snapshot it produces.

use crate::baseline::BaselineModel;
use crate::error::{ModelError, Result};
use crate::factorization::FactorizationModel;
use crate::knn::KnnModel;
use crate::params::{Algorithm, TrainParams};
use dataset::{FeatureMatrix, InteractionMatrix};
use serde::{Deserialize, Serialize};

/// Something that can be fitted to an interaction matrix.
///
/// Implementations are stateless: all configuration arrives through
/// `TrainParams`, and everything learned lives in the returned `FittedModel`.
pub trait TrainableModel: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn fit(
        &self,
        interactions: &InteractionMatrix,
        user_features: Option<&FeatureMatrix>,
        item_features: Option<&FeatureMatrix>,
        params: &TrainParams,
    ) -> Result<FittedModel>;
}

/// Read interface of a fitted model, in dense index space.
pub trait Recommender {
    fn num_users(&self) -> usize;

    fn num_items(&self) -> usize;

    /// Scores for `items`, in the same order.
    fn score(&self, user: usize, items: &[usize]) -> Result<Vec<f32>>;

    /// Learned representation of a user.
    fn user_vector(&self, user: usize) -> Result<Vec<f32>>;

    /// Learned representation of an item.
    fn item_vector(&self, item: usize) -> Result<Vec<f32>>;

    /// Scores for every indexed item.
    fn score_all(&self, user: usize) -> Result<Vec<f32>> {
        let items: Vec<usize> = (0..self.num_items()).collect();
        self.score(user, &items)
    }
}

/// Serializable fitted model, one variant per algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum FittedModel {
    MatrixFactorization(FactorizationModel),
    ItemKnn(KnnModel),
    Baseline(BaselineModel),
}

impl FittedModel {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            FittedModel::MatrixFactorization(_) => Algorithm::MatrixFactorization,
            FittedModel::ItemKnn(_) => Algorithm::ItemKnn,
            FittedModel::Baseline(_) => Algorithm::Baseline,
        }
    }

    /// Whether `user_vector` / `item_vector` can succeed.
    pub fn has_vectors(&self) -> bool {
        !matches!(self, FittedModel::Baseline(_))
    }

    fn inner(&self) -> &dyn Recommender {
        match self {
            FittedModel::MatrixFactorization(m) => m,
            FittedModel::ItemKnn(m) => m,
            FittedModel::Baseline(m) => m,
        }
    }
}

impl Recommender for FittedModel {
    fn num_users(&self) -> usize {
        self.inner().num_users()
    }

    fn num_items(&self) -> usize {
        self.inner().num_items()
    }

    fn score(&self, user: usize, items: &[usize]) -> Result<Vec<f32>> {
        self.inner().score(user, items)
    }

    fn user_vector(&self, user: usize) -> Result<Vec<f32>> {
        self.inner().user_vector(user)
    }

    fn item_vector(&self, item: usize) -> Result<Vec<f32>> {
        self.inner().item_vector(item)
    }
}

pub(crate) fn check_index(kind: &'static str, index: usize, size: usize) -> Result<()> {
    if index < size {
        Ok(())
    } else {
        Err(ModelError::IndexOutOfRange { kind, index, size })
    }
}

pub(crate) fn check_items(items: &[usize], size: usize) -> Result<()> {
    items.iter().try_for_each(|&item| check_index("item", item, size))
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
