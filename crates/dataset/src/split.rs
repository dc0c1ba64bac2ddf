//! Seeded random train/test split of an interaction matrix.

use crate::error::{DatasetError, Result};
use crate::matrix::InteractionMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Default share of interactions held out for evaluation.
pub const DEFAULT_TEST_FRACTION: f32 = 0.2;

/// Default seed so repeated trainings on the same data split identically.
pub const DEFAULT_SPLIT_SEED: u64 = 42;

/// Randomly move `test_fraction` of the cells into a test matrix.
///
/// Both halves keep the full shape so indices stay valid across them. At
/// least one cell always stays in the training half.
pub fn train_test_split(
    matrix: &InteractionMatrix,
    test_fraction: f32,
    seed: u64,
) -> Result<(InteractionMatrix, InteractionMatrix)> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(DatasetError::InvalidSplit(test_fraction));
    }

    let mut cells: Vec<(usize, usize, f32)> = matrix.triples().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    cells.shuffle(&mut rng);

    let total = cells.len();
    let test_len = ((total as f32 * test_fraction).round() as usize).min(total.saturating_sub(1));

    let (test_cells, train_cells) = cells.split_at(test_len);
    let train = InteractionMatrix::from_triples(
        matrix.num_users(),
        matrix.num_items(),
        train_cells.iter().copied(),
    );
    let test = InteractionMatrix::from_triples(
        matrix.num_users(),
        matrix.num_items(),
        test_cells.iter().copied(),
    );
    Ok((train, test))
}

/// Number of (user, item) cells present in both matrices.
pub fn overlap(train: &InteractionMatrix, test: &InteractionMatrix) -> usize {
    test.triples()
        .filter(|&(user, item, _)| train.contains(user, item))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> InteractionMatrix {
        let cells = (0..10).flat_map(|u| (0..5).map(move |i| (u, i, 1.0 + (u + i) as f32 % 5.0)));
        InteractionMatrix::from_triples(10, 5, cells)
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let m = matrix();
        let (train, test) = train_test_split(&m, 0.2, 42).unwrap();

        assert_eq!(test.nnz(), 10);
        assert_eq!(train.nnz(), 40);
        assert_eq!(overlap(&train, &test), 0);
        assert_eq!(train.num_items(), 5);
    }

    #[test]
    fn test_split_is_deterministic_per_seed() {
        let m = matrix();
        let (_, a) = train_test_split(&m, 0.3, 7).unwrap();
        let (_, b) = train_test_split(&m, 0.3, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_training_half_never_empty() {
        let m = InteractionMatrix::from_triples(1, 1, [(0, 0, 3.0)]);
        let (train, test) = train_test_split(&m, 0.9, 1).unwrap();
        assert_eq!(train.nnz(), 1);
        assert_eq!(test.nnz(), 0);
    }

    #[test]
    fn test_invalid_fraction() {
        assert!(train_test_split(&matrix(), 1.0, 1).is_err());
        assert!(train_test_split(&matrix(), -0.1, 1).is_err());
    }

    #[test]
    fn test_overlap_detected() {
        let a = InteractionMatrix::from_triples(2, 2, [(0, 0, 1.0), (1, 1, 1.0)]);
        let b = InteractionMatrix::from_triples(2, 2, [(0, 0, 2.0)]);
        assert_eq!(overlap(&a, &b), 1);
    }
}
