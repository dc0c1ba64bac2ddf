//! Item-based k-nearest-neighbours.
//!
//! Item similarity is the cosine between interaction columns. A user's score
//! for item `i` is the similarity-weighted mean of that user's ratings over
//! the `k` items most similar to `i` (including `i` itself).

use crate::error::{ModelError, Result};
use crate::model::{FittedModel, Recommender, TrainableModel, check_index, check_items};
use crate::params::{Algorithm, TrainParams};
use dataset::{FeatureMatrix, InteractionMatrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, Default)]
pub struct ItemKnnTrainer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    num_users: usize,
    num_items: usize,
    /// Training rows, `(item_idx, rating)` per user
    user_rows: Vec<Vec<(usize, f32)>>,
    /// Training columns, `(user_idx, rating)` per item
    item_columns: Vec<Vec<(usize, f32)>>,
    /// Top-k `(item_idx, similarity)` per item, descending
    neighbours: Vec<Vec<(usize, f32)>>,
}

impl TrainableModel for ItemKnnTrainer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::ItemKnn
    }

    #[instrument(skip_all, fields(nnz = interactions.nnz(), k = params.neighbours))]
    fn fit(
        &self,
        interactions: &InteractionMatrix,
        _user_features: Option<&FeatureMatrix>,
        _item_features: Option<&FeatureMatrix>,
        params: &TrainParams,
    ) -> Result<FittedModel> {
        if interactions.nnz() == 0 {
            return Err(ModelError::NotTrained);
        }

        let item_columns = interactions.item_columns();
        let norms: Vec<f32> = item_columns.iter().map(|c| norm(c)).collect();
        let user_rows: Vec<Vec<(usize, f32)>> = (0..interactions.num_users())
            .map(|u| interactions.user_items(u).to_vec())
            .collect();

        let neighbours: Vec<Vec<(usize, f32)>> = (0..interactions.num_items())
            .into_par_iter()
            .map(|item| {
                top_neighbours(item, &item_columns, &user_rows, &norms, params.neighbours)
            })
            .collect();

        debug!(
            "Precomputed neighbourhoods for {} items",
            interactions.num_items()
        );

        Ok(FittedModel::ItemKnn(KnnModel {
            num_users: interactions.num_users(),
            num_items: interactions.num_items(),
            user_rows,
            item_columns,
            neighbours,
        }))
    }
}

/// Cosine similarity of `item` to every co-rated item, truncated to `k`.
fn top_neighbours(
    item: usize,
    columns: &[Vec<(usize, f32)>],
    rows: &[Vec<(usize, f32)>],
    norms: &[f32],
    k: usize,
) -> Vec<(usize, f32)> {
    if norms[item] == 0.0 {
        return Vec::new();
    }

    let mut dots: HashMap<usize, f32> = HashMap::new();
    for &(user, weight) in &columns[item] {
        for &(other, other_weight) in &rows[user] {
            *dots.entry(other).or_insert(0.0) += weight * other_weight;
        }
    }

    let mut sims: Vec<(usize, f32)> = dots
        .into_iter()
        .filter(|&(other, _)| norms[other] > 0.0)
        .map(|(other, dot)| (other, dot / (norms[item] * norms[other])))
        .collect();
    sims.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    sims.truncate(k);
    sims
}

fn norm(cells: &[(usize, f32)]) -> f32 {
    cells.iter().map(|&(_, w)| w * w).sum::<f32>().sqrt()
}

impl KnnModel {
    fn predict(&self, user: usize, item: usize) -> f32 {
        let row = &self.user_rows[user];
        let mut numerator = 0.0f32;
        let mut denominator = 0.0f32;
        for &(other, sim) in &self.neighbours[item] {
            if let Ok(pos) = row.binary_search_by_key(&other, |&(i, _)| i) {
                numerator += sim * row[pos].1;
                denominator += sim.abs();
            }
        }
        if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    }

    fn dense(cells: &[(usize, f32)], len: usize) -> Vec<f32> {
        let mut vector = vec![0.0; len];
        for &(i, w) in cells {
            vector[i] = w;
        }
        vector
    }
}

impl Recommender for KnnModel {
    fn num_users(&self) -> usize {
        self.num_users
    }

    fn num_items(&self) -> usize {
        self.num_items
    }

    fn score(&self, user: usize, items: &[usize]) -> Result<Vec<f32>> {
        check_index("user", user, self.num_users)?;
        check_items(items, self.num_items)?;
        Ok(items.iter().map(|&item| self.predict(user, item)).collect())
    }

    /// The user's interaction row over all items.
    fn user_vector(&self, user: usize) -> Result<Vec<f32>> {
        check_index("user", user, self.num_users)?;
        Ok(Self::dense(&self.user_rows[user], self.num_items))
    }

    /// The item's interaction column over all users.
    fn item_vector(&self, item: usize) -> Result<Vec<f32>> {
        check_index("item", item, self.num_items)?;
        Ok(Self::dense(&self.item_columns[item], self.num_users))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> InteractionMatrix {
        InteractionMatrix::from_triples(
            2,
            3,
            [(0, 0, 5.0), (0, 1, 3.0), (1, 0, 4.0), (1, 1, 5.0), (1, 2, 2.0)],
        )
    }

    fn fit(k: usize) -> FittedModel {
        let params = TrainParams::new(Algorithm::ItemKnn).with_neighbours(k);
        ItemKnnTrainer.fit(&matrix(), None, None, &params).unwrap()
    }

    #[test]
    fn test_ranks_denser_item_first() {
        let model = fit(20);
        let scores = model.score(0, &[0, 1]).unwrap();
        // (5 + 0.937*3) / 1.937 vs (0.937*5 + 3) / 1.937
        assert!((scores[0] - 4.032).abs() < 1e-2);
        assert!((scores[1] - 3.968).abs() < 1e-2);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_neighbourhood_is_truncated() {
        let model = fit(1);
        let FittedModel::ItemKnn(knn) = &model else {
            panic!("wrong variant");
        };
        assert!(knn.neighbours.iter().all(|n| n.len() <= 1));
        // with only itself as neighbour the score is the user's own rating
        assert!((model.score(0, &[1]).unwrap()[0] - 3.0).abs() < 1e-5);
        assert_eq!(model.score(0, &[2]).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_vectors_are_interaction_rows_and_columns() {
        let model = fit(20);
        assert_eq!(model.user_vector(1).unwrap(), vec![4.0, 5.0, 2.0]);
        assert_eq!(model.item_vector(2).unwrap(), vec![0.0, 2.0]);
        assert!(matches!(
            model.item_vector(7),
            Err(ModelError::IndexOutOfRange { kind: "item", .. })
        ));
    }
}
