//! Sparse matrices handed to the trainable models.

use data_loader::FeatureId;
use serde::{Deserialize, Serialize};

/// User × item interaction weights, stored as one sorted sparse row per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionMatrix {
    num_users: usize,
    num_items: usize,
    rows: Vec<Vec<(usize, f32)>>,
}

impl InteractionMatrix {
    pub fn new(num_users: usize, num_items: usize) -> Self {
        Self {
            num_users,
            num_items,
            rows: vec![Vec::new(); num_users],
        }
    }

    /// Build from `(user_idx, item_idx, weight)` triples.
    ///
    /// Out-of-range indices are ignored; a repeated pair keeps the last weight.
    pub fn from_triples(
        num_users: usize,
        num_items: usize,
        triples: impl IntoIterator<Item = (usize, usize, f32)>,
    ) -> Self {
        let mut matrix = Self::new(num_users, num_items);
        for (user, item, weight) in triples {
            matrix.insert(user, item, weight);
        }
        matrix
    }

    /// Set a cell, overwriting an existing weight.
    pub fn insert(&mut self, user: usize, item: usize, weight: f32) {
        if user >= self.num_users || item >= self.num_items {
            return;
        }
        let row = &mut self.rows[user];
        match row.binary_search_by_key(&item, |&(i, _)| i) {
            Ok(pos) => row[pos].1 = weight,
            Err(pos) => row.insert(pos, (item, weight)),
        }
    }

    pub fn num_users(&self) -> usize {
        self.num_users
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Number of stored (non-zero) cells
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    pub fn get(&self, user: usize, item: usize) -> Option<f32> {
        let row = self.rows.get(user)?;
        row.binary_search_by_key(&item, |&(i, _)| i)
            .ok()
            .map(|pos| row[pos].1)
    }

    pub fn contains(&self, user: usize, item: usize) -> bool {
        self.get(user, item).is_some()
    }

    /// The `(item_idx, weight)` cells of one user, ordered by item index.
    pub fn user_items(&self, user: usize) -> &[(usize, f32)] {
        self.rows.get(user).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// All cells as `(user_idx, item_idx, weight)`, row-major.
    pub fn triples(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(user, row)| row.iter().map(move |&(item, w)| (user, item, w)))
    }

    /// Transposed view: for each item, its `(user_idx, weight)` cells.
    pub fn item_columns(&self) -> Vec<Vec<(usize, f32)>> {
        let mut columns = vec![Vec::new(); self.num_items];
        for (user, item, weight) in self.triples() {
            columns[item].push((user, weight));
        }
        columns
    }

    /// Users with at least one stored cell.
    pub fn active_users(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.is_empty())
            .map(|(user, _)| user)
    }
}

/// Shared column space for user and item feature matrices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVocabulary {
    feature_ids: Vec<FeatureId>,
}

impl FeatureVocabulary {
    pub fn from_ids(ids: impl IntoIterator<Item = FeatureId>) -> Self {
        let mut feature_ids: Vec<FeatureId> = ids.into_iter().collect();
        feature_ids.sort_unstable();
        feature_ids.dedup();
        Self { feature_ids }
    }

    pub fn len(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_ids.is_empty()
    }

    pub fn column(&self, feature_id: FeatureId) -> Option<usize> {
        self.feature_ids.binary_search(&feature_id).ok()
    }

    pub fn feature_ids(&self) -> &[FeatureId] {
        &self.feature_ids
    }
}

/// Entity × feature intensities; one sparse row per indexed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    num_columns: usize,
    rows: Vec<Vec<(usize, f32)>>,
}

impl FeatureMatrix {
    pub fn new(num_rows: usize, num_columns: usize) -> Self {
        Self {
            num_columns,
            rows: vec![Vec::new(); num_rows],
        }
    }

    pub fn set(&mut self, row: usize, column: usize, weight: f32) {
        if row >= self.rows.len() || column >= self.num_columns {
            return;
        }
        let cells = &mut self.rows[row];
        match cells.binary_search_by_key(&column, |&(c, _)| c) {
            Ok(pos) => cells[pos].1 = weight,
            Err(pos) => cells.insert(pos, (column, weight)),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn row(&self, row: usize) -> &[(usize, f32)] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Weight of a cell; zero when the entity did not declare the feature.
    pub fn get(&self, row: usize, column: usize) -> f32 {
        let cells = self.row(row);
        cells
            .binary_search_by_key(&column, |&(c, _)| c)
            .map(|pos| cells[pos].1)
            .unwrap_or(0.0)
    }

    /// Row scaled so its weights sum to one (empty rows stay empty).
    pub fn normalized_row(&self, row: usize) -> Vec<(usize, f32)> {
        let cells = self.row(row);
        let total: f32 = cells.iter().map(|&(_, w)| w).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        cells.iter().map(|&(c, w)| (c, w / total)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites() {
        let mut m = InteractionMatrix::new(2, 3);
        m.insert(0, 2, 1.0);
        m.insert(0, 0, 4.0);
        m.insert(0, 2, 5.0);

        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 2), Some(5.0));
        assert_eq!(m.user_items(0), &[(0, 4.0), (2, 5.0)]);
        assert!(m.user_items(1).is_empty());
    }

    #[test]
    fn test_out_of_range_ignored() {
        let m = InteractionMatrix::from_triples(1, 1, [(0, 0, 1.0), (3, 0, 1.0), (0, 9, 1.0)]);
        assert_eq!(m.nnz(), 1);
    }

    #[test]
    fn test_item_columns() {
        let m = InteractionMatrix::from_triples(2, 2, [(0, 1, 3.0), (1, 1, 2.0), (1, 0, 1.0)]);
        let cols = m.item_columns();
        assert_eq!(cols[0], vec![(1, 1.0)]);
        assert_eq!(cols[1], vec![(0, 3.0), (1, 2.0)]);
    }

    #[test]
    fn test_feature_matrix_missing_is_zero() {
        let mut fm = FeatureMatrix::new(2, 3);
        fm.set(0, 1, 4.0);
        fm.set(0, 2, 1.0);

        assert_eq!(fm.get(0, 0), 0.0);
        assert_eq!(fm.get(1, 1), 0.0);
        let norm = fm.normalized_row(0);
        assert!((norm[0].1 - 0.8).abs() < 1e-6);
        assert!(fm.normalized_row(1).is_empty());
    }
}
