//! Turning raw interaction / feature rows into a training dataset.

use crate::error::{DatasetError, Result};
use crate::index_space::IndexSpace;
use crate::matrix::{FeatureMatrix, FeatureVocabulary, InteractionMatrix};
use data_loader::{FeatureId, FeatureTable, Interaction, InteractionStore, ItemId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Default minimum number of distinct (user, item) pairs to train on.
pub const DEFAULT_MIN_INTERACTIONS: usize = 5;

/// Everything a trainable model needs for one run.
///
/// The `index` must be persisted next to the fitted model: without it scores
/// cannot be mapped back to external ids.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub index: IndexSpace,
    pub interactions: InteractionMatrix,
    pub user_features: Option<FeatureMatrix>,
    pub item_features: Option<FeatureMatrix>,
    pub vocabulary: Option<FeatureVocabulary>,
}

/// Size summary recorded on each training run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub num_users: usize,
    pub num_items: usize,
    pub num_interactions: usize,
    pub train_interactions: usize,
    pub test_interactions: usize,
}

impl Dataset {
    pub fn stats(&self) -> DatasetStats {
        DatasetStats {
            num_users: self.index.num_users(),
            num_items: self.index.num_items(),
            num_interactions: self.interactions.nnz(),
            ..DatasetStats::default()
        }
    }

    pub fn has_features(&self) -> bool {
        self.vocabulary.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// Configurable, side-effect free dataset builder.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    min_interactions: usize,
    use_features: bool,
    catalog_features: Vec<FeatureId>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self {
            min_interactions: DEFAULT_MIN_INTERACTIONS,
            use_features: true,
            catalog_features: Vec::new(),
        }
    }

    /// Configure the minimum number of interactions (default: 5)
    pub fn with_min_interactions(mut self, min: usize) -> Self {
        self.min_interactions = min;
        self
    }

    /// Whether to build user/item feature matrices (default: true)
    pub fn with_features(mut self, use_features: bool) -> Self {
        self.use_features = use_features;
        self
    }

    /// Declared catalog features that belong in the vocabulary even when no
    /// entity references them yet.
    pub fn with_vocabulary(mut self, feature_ids: impl IntoIterator<Item = FeatureId>) -> Self {
        self.catalog_features = feature_ids.into_iter().collect();
        self
    }

    pub fn min_interactions(&self) -> usize {
        self.min_interactions
    }

    /// Build straight from a loaded store, using its feature catalog.
    pub fn build_from_store(&self, store: &InteractionStore) -> Result<Dataset> {
        let builder = self.clone().with_vocabulary(
            self.catalog_features
                .iter()
                .copied()
                .chain(store.feature_ids()),
        );
        builder.build(
            &store.interactions(),
            Some(store.user_feature_rows()),
            Some(store.item_feature_rows()),
        )
    }

    /// Build the index space, interaction matrix and (optionally) the feature
    /// matrices.
    ///
    /// Fails with `InsufficientData` when fewer than `min_interactions`
    /// distinct pairs remain after collapsing repeated writes.
    #[instrument(skip_all, fields(rows = interactions.len(), use_features = self.use_features))]
    pub fn build(
        &self,
        interactions: &[Interaction],
        user_features: Option<&FeatureTable>,
        item_features: Option<&FeatureTable>,
    ) -> Result<Dataset> {
        let latest = collapse_latest(interactions);
        if latest.len() < self.min_interactions {
            return Err(DatasetError::InsufficientData {
                found: latest.len(),
                required: self.min_interactions,
            });
        }

        let index = IndexSpace::from_ids(
            latest.iter().map(|r| r.user_id),
            latest.iter().map(|r| r.item_id),
        );

        // Every id came from `latest`, so the lookups below always succeed.
        let matrix = InteractionMatrix::from_triples(
            index.num_users(),
            index.num_items(),
            latest.iter().filter_map(|r| {
                Some((index.user_index(r.user_id)?, index.item_index(r.item_id)?, r.rating))
            }),
        );

        let (user_matrix, item_matrix, vocabulary) = if self.use_features {
            let empty = FeatureTable::new();
            let users = user_features.unwrap_or(&empty);
            let items = item_features.unwrap_or(&empty);

            let vocabulary = FeatureVocabulary::from_ids(
                self.catalog_features
                    .iter()
                    .copied()
                    .chain(referenced_features(users))
                    .chain(referenced_features(items)),
            );
            let user_matrix = feature_matrix(index.user_ids(), users, &vocabulary);
            let item_matrix = feature_matrix(index.item_ids(), items, &vocabulary);
            debug!("Feature vocabulary has {} columns", vocabulary.len());
            (Some(user_matrix), Some(item_matrix), Some(vocabulary))
        } else {
            (None, None, None)
        };

        info!(
            "Built dataset: {} users, {} items, {} interactions",
            index.num_users(),
            index.num_items(),
            matrix.nnz()
        );

        Ok(Dataset {
            index,
            interactions: matrix,
            user_features: user_matrix,
            item_features: item_matrix,
            vocabulary,
        })
    }
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep one row per (user, item): the latest timestamp, later rows on ties.
fn collapse_latest(interactions: &[Interaction]) -> Vec<Interaction> {
    let mut latest: HashMap<(UserId, ItemId), Interaction> = HashMap::new();
    for row in interactions {
        latest
            .entry((row.user_id, row.item_id))
            .and_modify(|existing| {
                if row.timestamp >= existing.timestamp {
                    *existing = *row;
                }
            })
            .or_insert(*row);
    }
    latest.into_values().collect()
}

fn referenced_features(table: &FeatureTable) -> impl Iterator<Item = FeatureId> + '_ {
    table.values().flatten().map(|f| f.feature_id)
}

fn feature_matrix(entity_ids: &[u32], table: &FeatureTable, vocabulary: &FeatureVocabulary) -> FeatureMatrix {
    let mut matrix = FeatureMatrix::new(entity_ids.len(), vocabulary.len());
    for (row, entity_id) in entity_ids.iter().enumerate() {
        let Some(declared) = table.get(entity_id) else {
            continue;
        };
        for feature in declared {
            if let Some(column) = vocabulary.column(feature.feature_id) {
                matrix.set(row, column, feature.weight);
            }
        }
    }
    matrix
}
