//! Non-personalised baseline: every user gets the damped item mean.

use crate::error::{ModelError, Result};
use crate::model::{FittedModel, Recommender, TrainableModel, check_index, check_items};
use crate::params::{Algorithm, TrainParams};
use dataset::{FeatureMatrix, InteractionMatrix};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Pseudo-count pulling sparsely rated items towards the global mean.
pub const BASELINE_DAMPING: f32 = 5.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineTrainer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineModel {
    num_users: usize,
    global_mean: f32,
    item_scores: Vec<f32>,
}

impl BaselineModel {
    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }
}

impl TrainableModel for BaselineTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Baseline
    }

    #[instrument(skip_all, fields(nnz = interactions.nnz()))]
    fn fit(
        &self,
        interactions: &InteractionMatrix,
        _user_features: Option<&FeatureMatrix>,
        _item_features: Option<&FeatureMatrix>,
        _params: &TrainParams,
    ) -> Result<FittedModel> {
        if interactions.nnz() == 0 {
            return Err(ModelError::NotTrained);
        }

        let mut totals = vec![(0.0f32, 0u32); interactions.num_items()];
        let mut sum = 0.0f32;
        for (_, item, weight) in interactions.triples() {
            totals[item].0 += weight;
            totals[item].1 += 1;
            sum += weight;
        }
        let global_mean = sum / interactions.nnz() as f32;

        let item_scores = totals
            .iter()
            .map(|&(total, count)| {
                (total + BASELINE_DAMPING * global_mean) / (count as f32 + BASELINE_DAMPING)
            })
            .collect();

        debug!("Baseline global mean {:.3}", global_mean);
        Ok(FittedModel::Baseline(BaselineModel {
            num_users: interactions.num_users(),
            global_mean,
            item_scores,
        }))
    }
}

impl Recommender for BaselineModel {
    fn num_users(&self) -> usize {
        self.num_users
    }

    fn num_items(&self) -> usize {
        self.item_scores.len()
    }

    fn score(&self, user: usize, items: &[usize]) -> Result<Vec<f32>> {
        check_index("user", user, self.num_users)?;
        check_items(items, self.item_scores.len())?;
        Ok(items.iter().map(|&i| self.item_scores[i]).collect())
    }

    fn user_vector(&self, _user: usize) -> Result<Vec<f32>> {
        Err(unsupported())
    }

    fn item_vector(&self, _item: usize) -> Result<Vec<f32>> {
        Err(unsupported())
    }
}

fn unsupported() -> ModelError {
    ModelError::Unsupported {
        algorithm: Algorithm::Baseline.to_string(),
        capability: "vector representations".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> InteractionMatrix {
        // users 1,2 / items 10,11,12 from the canonical example
        InteractionMatrix::from_triples(
            2,
            3,
            [(0, 0, 5.0), (0, 1, 3.0), (1, 0, 4.0), (1, 1, 5.0), (1, 2, 2.0)],
        )
    }

    #[test]
    fn test_damped_means() {
        let model = BaselineTrainer
            .fit(&matrix(), None, None, &TrainParams::default())
            .unwrap();
        let scores = model.score(0, &[0, 1, 2]).unwrap();

        assert!((scores[0] - 4.0).abs() < 1e-5);
        assert!(scores[0] > scores[1]);
        assert!(scores[1] > scores[2]);
    }

    #[test]
    fn test_vectors_unsupported() {
        let model = BaselineTrainer
            .fit(&matrix(), None, None, &TrainParams::default())
            .unwrap();
        assert!(!model.has_vectors());
        assert!(matches!(model.item_vector(0), Err(ModelError::Unsupported { .. })));
    }

    #[test]
    fn test_empty_matrix() {
        let empty = InteractionMatrix::new(1, 1);
        assert!(BaselineTrainer.fit(&empty, None, None, &TrainParams::default()).is_err());
    }
}
