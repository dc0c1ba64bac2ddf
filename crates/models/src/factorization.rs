//! Hybrid matrix factorization.
//!
//! Each user (item) is represented by its id embedding plus the sum of the
//! embeddings of its declared features, weighted by normalised intensity.
//! Entities sharing features therefore start close together, which is what
//! lets the model say something about sparsely observed entities.
//!
//! Training optimises a BPR objective with plain SGD: for every observed
//! `(user, item)` a random unobserved item is sampled and the pair is pushed
//! apart. Observations are weighted by `rating / 5`.

use crate::error::{ModelError, Result};
use crate::model::{FittedModel, Recommender, TrainableModel, check_index, check_items, dot};
use crate::params::{Algorithm, TrainParams};
use data_loader::MAX_WEIGHT;
use dataset::{FeatureMatrix, InteractionMatrix};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Attempts at drawing an unobserved item before skipping a sample.
const NEGATIVE_SAMPLE_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct FactorizationTrainer;

/// Final user / item representations, with feature contributions folded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorizationModel {
    dim: usize,
    user_repr: Vec<Vec<f32>>,
    item_repr: Vec<Vec<f32>>,
    item_bias: Vec<f32>,
}

/// Mutable parameters while training.
struct Embeddings {
    dim: usize,
    user_ids: Vec<Vec<f32>>,
    item_ids: Vec<Vec<f32>>,
    user_features: Vec<Vec<f32>>,
    item_features: Vec<Vec<f32>>,
    item_bias: Vec<f32>,
    /// Normalised feature rows per entity (empty when features are off)
    user_rows: Vec<Vec<(usize, f32)>>,
    item_rows: Vec<Vec<(usize, f32)>>,
}

impl Embeddings {
    fn init(
        num_users: usize,
        num_items: usize,
        user_features: Option<&FeatureMatrix>,
        item_features: Option<&FeatureMatrix>,
        dim: usize,
        rng: &mut StdRng,
    ) -> Self {
        let scale = 1.0 / dim as f32;
        let mut random_table = |rows: usize| -> Vec<Vec<f32>> {
            (0..rows)
                .map(|_| (0..dim).map(|_| rng.random_range(-scale..scale)).collect())
                .collect()
        };

        let user_ids = random_table(num_users);
        let item_ids = random_table(num_items);
        let user_features_emb = random_table(user_features.map_or(0, |m| m.num_columns()));
        let item_features_emb = random_table(item_features.map_or(0, |m| m.num_columns()));

        let rows = |matrix: Option<&FeatureMatrix>, count: usize| -> Vec<Vec<(usize, f32)>> {
            match matrix {
                Some(m) => (0..count).map(|r| m.normalized_row(r)).collect(),
                None => vec![Vec::new(); count],
            }
        };

        Self {
            dim,
            user_ids,
            item_ids,
            user_features: user_features_emb,
            item_features: item_features_emb,
            item_bias: vec![0.0; num_items],
            user_rows: rows(user_features, num_users),
            item_rows: rows(item_features, num_items),
        }
    }

    fn user_repr(&self, user: usize) -> Vec<f32> {
        compose(&self.user_ids[user], &self.user_rows[user], &self.user_features, self.dim)
    }

    fn item_repr(&self, item: usize) -> Vec<f32> {
        compose(&self.item_ids[item], &self.item_rows[item], &self.item_features, self.dim)
    }

    /// One BPR step on `(user, positive, negative)`; returns the pair margin.
    fn step(&mut self, user: usize, pos: usize, neg: usize, weight: f32, lr: f32, reg: f32) -> f32 {
        let u = self.user_repr(user);
        let p = self.item_repr(pos);
        let n = self.item_repr(neg);

        let margin = dot(&u, &p) - dot(&u, &n) + self.item_bias[pos] - self.item_bias[neg];
        let g = weight * sigmoid(-margin);

        let diff: Vec<f32> = p.iter().zip(&n).map(|(a, b)| a - b).collect();
        let neg_u: Vec<f32> = u.iter().map(|x| -x).collect();

        update(&mut self.user_ids[user], &diff, g, lr, reg);
        for &(c, share) in &self.user_rows[user] {
            update(&mut self.user_features[c], &diff, g * share, lr, reg);
        }

        update(&mut self.item_ids[pos], &u, g, lr, reg);
        for &(c, share) in &self.item_rows[pos] {
            update(&mut self.item_features[c], &u, g * share, lr, reg);
        }

        update(&mut self.item_ids[neg], &neg_u, g, lr, reg);
        for &(c, share) in &self.item_rows[neg] {
            update(&mut self.item_features[c], &neg_u, g * share, lr, reg);
        }

        self.item_bias[pos] += lr * (g - reg * self.item_bias[pos]);
        self.item_bias[neg] += lr * (-g - reg * self.item_bias[neg]);

        margin
    }

    fn freeze(self) -> FactorizationModel {
        let user_repr = (0..self.user_ids.len()).map(|u| self.user_repr(u)).collect();
        let item_repr = (0..self.item_ids.len()).map(|i| self.item_repr(i)).collect();
        FactorizationModel {
            dim: self.dim,
            user_repr,
            item_repr,
            item_bias: self.item_bias,
        }
    }
}

fn compose(id: &[f32], row: &[(usize, f32)], table: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let mut repr = id.to_vec();
    for &(column, share) in row {
        for (r, f) in repr.iter_mut().zip(&table[column]).take(dim) {
            *r += share * f;
        }
    }
    repr
}

fn update(target: &mut [f32], direction: &[f32], scale: f32, lr: f32, reg: f32) {
    for (t, d) in target.iter_mut().zip(direction) {
        *t += lr * (scale * d - reg * *t);
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl TrainableModel for FactorizationTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::MatrixFactorization
    }

    #[instrument(skip_all, fields(
        nnz = interactions.nnz(),
        epochs = params.epochs,
        dim = params.embedding_dim,
        use_features = params.use_features
    ))]
    fn fit(
        &self,
        interactions: &InteractionMatrix,
        user_features: Option<&FeatureMatrix>,
        item_features: Option<&FeatureMatrix>,
        params: &TrainParams,
    ) -> Result<FittedModel> {
        params.validate()?;
        if interactions.nnz() == 0 {
            return Err(ModelError::NotTrained);
        }
        let (user_features, item_features) = if params.use_features {
            (user_features, item_features)
        } else {
            (None, None)
        };
        check_feature_rows("user", user_features, interactions.num_users())?;
        check_feature_rows("item", item_features, interactions.num_items())?;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut embeddings = Embeddings::init(
            interactions.num_users(),
            interactions.num_items(),
            user_features,
            item_features,
            params.embedding_dim,
            &mut rng,
        );

        let mut samples: Vec<(usize, usize, f32)> = interactions.triples().collect();
        let num_items = interactions.num_items();

        for epoch in 0..params.epochs {
            samples.shuffle(&mut rng);
            let mut correct = 0usize;
            let mut seen = 0usize;

            for &(user, pos, rating) in &samples {
                let Some(neg) = sample_negative(interactions, user, num_items, &mut rng) else {
                    continue;
                };
                let weight = rating / MAX_WEIGHT;
                let margin = embeddings.step(
                    user,
                    pos,
                    neg,
                    weight,
                    params.learning_rate,
                    params.regularization,
                );
                seen += 1;
                if margin > 0.0 {
                    correct += 1;
                }
            }

            if seen > 0 {
                debug!(
                    "Epoch {}: {:.1}% of sampled pairs ordered correctly",
                    epoch + 1,
                    100.0 * correct as f64 / seen as f64
                );
            }
        }

        info!(
            "Trained factorization model: {} users, {} items",
            interactions.num_users(),
            num_items
        );
        Ok(FittedModel::MatrixFactorization(embeddings.freeze()))
    }
}

fn sample_negative(
    interactions: &InteractionMatrix,
    user: usize,
    num_items: usize,
    rng: &mut StdRng,
) -> Option<usize> {
    if interactions.user_items(user).len() >= num_items {
        return None;
    }
    (0..NEGATIVE_SAMPLE_ATTEMPTS)
        .map(|_| rng.random_range(0..num_items))
        .find(|&item| !interactions.contains(user, item))
}

fn check_feature_rows(kind: &'static str, matrix: Option<&FeatureMatrix>, expected: usize) -> Result<()> {
    match matrix {
        Some(m) if m.num_rows() != expected => Err(ModelError::InvalidParameter {
            name: "features",
            reason: format!("{} feature matrix has {} rows, expected {}", kind, m.num_rows(), expected),
        }),
        _ => Ok(()),
    }
}

impl Recommender for FactorizationModel {
    fn num_users(&self) -> usize {
        self.user_repr.len()
    }

    fn num_items(&self) -> usize {
        self.item_repr.len()
    }

    fn score(&self, user: usize, items: &[usize]) -> Result<Vec<f32>> {
        check_index("user", user, self.user_repr.len())?;
        check_items(items, self.item_repr.len())?;
        let u = &self.user_repr[user];
        Ok(items
            .iter()
            .map(|&i| dot(u, &self.item_repr[i]) + self.item_bias[i])
            .collect())
    }

    fn user_vector(&self, user: usize) -> Result<Vec<f32>> {
        check_index("user", user, self.user_repr.len())?;
        Ok(self.user_repr[user].clone())
    }

    fn item_vector(&self, item: usize) -> Result<Vec<f32>> {
        check_index("item", item, self.item_repr.len())?;
        Ok(self.item_repr[item].clone())
    }
}

impl FactorizationModel {
    pub fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two taste groups: users 0-9 like items 0-4, users 10-19 like items 5-9.
    fn block_matrix() -> InteractionMatrix {
        let cells = (0..20usize).flat_map(|u| {
            let offset = if u < 10 { 0 } else { 5 };
            (0..5usize).map(move |i| (u, i + offset, 4.0))
        });
        InteractionMatrix::from_triples(20, 10, cells)
    }

    fn params() -> TrainParams {
        TrainParams::default()
            .with_embedding_dim(8)
            .with_epochs(60)
            .with_learning_rate(0.1)
            .with_features(false)
    }

    fn mean(values: &[f32]) -> f32 {
        values.iter().sum::<f32>() / values.len() as f32
    }

    #[test]
    fn test_learns_block_structure() {
        let model = FactorizationTrainer
            .fit(&block_matrix(), None, None, &params())
            .unwrap();

        let own = model.score(0, &[0, 1, 2, 3, 4]).unwrap();
        let other = model.score(0, &[5, 6, 7, 8, 9]).unwrap();
        assert!(mean(&own) > mean(&other));

        let own = model.score(15, &[5, 6, 7, 8, 9]).unwrap();
        let other = model.score(15, &[0, 1, 2, 3, 4]).unwrap();
        assert!(mean(&own) > mean(&other));
    }

    #[test]
    fn test_same_seed_same_model() {
        let a = FactorizationTrainer.fit(&block_matrix(), None, None, &params()).unwrap();
        let b = FactorizationTrainer.fit(&block_matrix(), None, None, &params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_feature_embeddings_shape_vectors() {
        let mut items = FeatureMatrix::new(10, 2);
        for i in 0..10 {
            items.set(i, if i < 5 { 0 } else { 1 }, 3.0);
        }
        let model = FactorizationTrainer
            .fit(&block_matrix(), None, Some(&items), &params().with_features(true))
            .unwrap();

        assert_eq!(model.item_vector(3).unwrap().len(), 8);
        assert_eq!(model.num_items(), 10);
    }

    #[test]
    fn test_mismatched_feature_rows_rejected() {
        let items = FeatureMatrix::new(3, 2);
        let result = FactorizationTrainer.fit(
            &block_matrix(),
            None,
            Some(&items),
            &params().with_features(true),
        );
        assert!(matches!(result, Err(ModelError::InvalidParameter { .. })));
    }
}
