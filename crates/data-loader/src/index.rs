//! Building the InteractionStore from a data directory.
//!
//! Files are parsed in parallel, interactions are applied through
//! `upsert_interaction` (so a later row for the same pair wins), item
//! statistics are rebuilt and the result is validated.

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

const USERS_FILE: &str = "users.dat";
const ITEMS_FILE: &str = "items.dat";
const FEATURES_FILE: &str = "features.dat";
const USER_FEATURES_FILE: &str = "user_features.dat";
const ITEM_FEATURES_FILE: &str = "item_features.dat";
const INTERACTIONS_FILE: &str = "interactions.dat";
const ITEM_PLACES_FILE: &str = "item_places.dat";

impl InteractionStore {
    /// Load the store from a directory of `.dat` files.
    ///
    /// `features.dat`, `user_features.dat` and `item_features.dat` are
    /// optional; everything else must exist.
    pub fn load_from_files(data_dir: &Path) -> Result<Self> {
        info!("Loading interaction store from {:?}", data_dir);

        let users_path = data_dir.join(USERS_FILE);
        let items_path = data_dir.join(ITEMS_FILE);
        let interactions_path = data_dir.join(INTERACTIONS_FILE);

        // Catalog files and the interaction log in parallel, features alongside.
        let (((users, items), interactions), (features, (user_features, item_features))) =
            rayon::join(
                || {
                    rayon::join(
                        || {
                            rayon::join(
                                || parser::parse_users(&users_path),
                                || parser::parse_items(&items_path),
                            )
                        },
                        || parser::parse_interactions(&interactions_path),
                    )
                },
                || {
                    rayon::join(
                        || parse_optional(data_dir, FEATURES_FILE, parser::parse_features),
                        || {
                            rayon::join(
                                || {
                                    parse_optional(data_dir, USER_FEATURES_FILE, |p| {
                                        parser::parse_feature_weights(p, USER_FEATURES_FILE)
                                    })
                                },
                                || {
                                    parse_optional(data_dir, ITEM_FEATURES_FILE, |p| {
                                        parser::parse_feature_weights(p, ITEM_FEATURES_FILE)
                                    })
                                },
                            )
                        },
                    )
                },
            );

        let users = users?;
        let items = items?;
        let interactions = interactions?;
        let features = features?;
        let user_features = user_features?;
        let item_features = item_features?;

        info!(
            "Parsed {} users, {} items, {} features, {} interaction rows",
            users.len(),
            items.len(),
            features.len(),
            interactions.len()
        );

        let mut store = InteractionStore::new();
        for user in users {
            store.insert_user(user);
        }
        for item in items {
            store.insert_item(item);
        }
        for feature in features {
            store.insert_feature(feature);
        }
        for (user_id, feature) in user_features {
            store.set_user_feature(user_id, feature)?;
        }
        for (item_id, feature) in item_features {
            store.set_item_feature(item_id, feature)?;
        }

        // The log may contain repeated writes for a pair; the latest timestamp wins.
        let mut ordered = interactions;
        ordered.sort_by_key(|r| r.timestamp);
        let rows = ordered.len();
        for row in ordered {
            store.upsert_interaction(row.user_id, row.item_id, row.rating, row.timestamp)?;
        }
        debug!(
            "Collapsed {} interaction rows into {} pairs",
            rows,
            store.interactions.len()
        );

        store.compute_item_stats();
        store.validate()?;

        info!("Interaction store loaded and validated");
        Ok(store)
    }

    /// Write the interaction log back to `data_dir/interactions.dat`.
    pub fn save_interactions(&self, data_dir: &Path) -> Result<()> {
        parser::write_interactions(&data_dir.join(INTERACTIONS_FILE), &self.interactions())
    }

    /// Upsert a rating and write the log back to `data_dir`.
    ///
    /// The file is written from a snapshot that already holds the new row,
    /// and memory is only updated once that write succeeded: a failed save
    /// leaves both the file and the store as they were.
    pub fn upsert_and_save(
        &mut self,
        data_dir: &Path,
        user_id: UserId,
        item_id: ItemId,
        rating: f32,
        timestamp: i64,
    ) -> Result<Option<Interaction>> {
        let row = self.checked_row(user_id, item_id, rating, timestamp)?;
        let mut rows = self.interactions();
        match rows.binary_search_by_key(&(user_id, item_id), |r| (r.user_id, r.item_id)) {
            Ok(pos) => rows[pos] = row,
            Err(pos) => rows.insert(pos, row),
        }
        parser::write_interactions(&data_dir.join(INTERACTIONS_FILE), &rows)?;
        self.upsert_interaction(user_id, item_id, rating, timestamp)
    }

    /// Rebuild the per-item running totals from the interaction rows.
    pub fn compute_item_stats(&mut self) {
        let mut grouped: HashMap<ItemId, Vec<f32>> = HashMap::new();
        for row in self.interactions.values() {
            grouped.entry(row.item_id).or_default().push(row.rating);
        }

        self.item_totals = grouped
            .par_iter()
            .map(|(&item_id, ratings)| {
                let sum: f64 = ratings.iter().map(|&r| f64::from(r)).sum();
                (item_id, (sum, ratings.len() as u32))
            })
            .collect();
    }

    /// Validate data integrity
    ///
    /// Every interaction and feature association must reference a known
    /// entity, and every rating / intensity must lie in [1, 5].
    pub fn validate(&self) -> Result<()> {
        for row in self.interactions.values() {
            if !self.users.contains_key(&row.user_id) {
                return Err(DataLoadError::UnknownReference {
                    entity: "user",
                    id: row.user_id,
                });
            }
            if !self.items.contains_key(&row.item_id) {
                return Err(DataLoadError::UnknownReference {
                    entity: "item",
                    id: row.item_id,
                });
            }
            if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&row.rating) {
                return Err(DataLoadError::OutOfRange {
                    field: "rating",
                    value: row.rating,
                });
            }
        }

        self.validate_feature_table(&self.user_features, "user", |id| self.users.contains_key(&id))?;
        self.validate_feature_table(&self.item_features, "item", |id| self.items.contains_key(&id))?;
        Ok(())
    }

    fn validate_feature_table(
        &self,
        table: &FeatureTable,
        entity: &'static str,
        exists: impl Fn(u32) -> bool,
    ) -> Result<()> {
        for (&entity_id, declared) in table {
            if !exists(entity_id) {
                return Err(DataLoadError::UnknownReference {
                    entity,
                    id: entity_id,
                });
            }
            for feature in declared {
                // Without a features.dat the vocabulary is implied by the associations.
                if !self.features.is_empty() && !self.features.contains_key(&feature.feature_id) {
                    return Err(DataLoadError::UnknownReference {
                        entity: "feature",
                        id: feature.feature_id,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Read the optional `item_places.dat` next to the store's files.
///
/// Places live outside the store: only contextual re-ranking reads them.
pub fn load_item_places(data_dir: &Path) -> Result<Vec<ItemPlace>> {
    let places = parse_optional(data_dir, ITEM_PLACES_FILE, parser::parse_item_places)?;
    debug!("Loaded {} item places", places.len());
    Ok(places)
}

fn parse_optional<T>(
    data_dir: &Path,
    file: &str,
    parse: impl Fn(&Path) -> Result<Vec<T>>,
) -> Result<Vec<T>> {
    let path = data_dir.join(file);
    if path.exists() {
        parse(&path)
    } else {
        debug!("Optional file {} not present, skipping", file);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_dataset(dir: &Path) {
        fs::write(dir.join(USERS_FILE), "1\n2\n3\n").unwrap();
        fs::write(dir.join(ITEMS_FILE), "10::Bar Azul\n11::Pizzaria\n12::Museu\n").unwrap();
        fs::write(dir.join(FEATURES_FILE), "1::ambience\n2::price\n").unwrap();
        fs::write(dir.join(USER_FEATURES_FILE), "3::1::4\n").unwrap();
        fs::write(dir.join(ITEM_FEATURES_FILE), "10::1::5\n12::2::2\n").unwrap();
        fs::write(
            dir.join(INTERACTIONS_FILE),
            "1::10::5::100\n1::11::3::101\n2::10::4::102\n2::11::5::103\n2::12::2::104\n1::11::4::200\n",
        )
        .unwrap();
    }

    #[test]
    fn test_load_collapses_repeated_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());

        let store = InteractionStore::load_from_files(dir.path()).unwrap();
        let (users, items, interactions) = store.counts();
        assert_eq!((users, items, interactions), (3, 3, 5));

        // The later write for (1, 11) replaced the earlier one
        assert_eq!(store.get_interaction(1, 11).unwrap().rating, 4.0);

        let stats = store.item_stats(11).unwrap();
        assert_eq!(stats.rating_count, 2);
        assert!((stats.avg_rating - 4.5).abs() < 1e-6);
    }

    #[test]
    fn test_optional_feature_files() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        fs::remove_file(dir.path().join(FEATURES_FILE)).unwrap();
        fs::remove_file(dir.path().join(USER_FEATURES_FILE)).unwrap();

        let store = InteractionStore::load_from_files(dir.path()).unwrap();
        assert!(store.feature_ids().is_empty());
        assert!(store.user_features(3).is_empty());
        assert_eq!(store.item_features(10).len(), 1);
    }

    #[test]
    fn test_validation_rejects_unknown_item() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        fs::write(dir.path().join(INTERACTIONS_FILE), "1::99::5::100\n").unwrap();

        let err = InteractionStore::load_from_files(dir.path()).unwrap_err();
        assert!(matches!(err, DataLoadError::UnknownReference { id: 99, .. }));
    }

    #[test]
    fn test_validation_rejects_unknown_feature() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        fs::write(dir.path().join(ITEM_FEATURES_FILE), "10::7::5\n").unwrap();

        let err = InteractionStore::load_from_files(dir.path()).unwrap_err();
        assert!(matches!(err, DataLoadError::UnknownReference { id: 7, .. }));
    }

    #[test]
    fn test_save_interactions() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let mut store = InteractionStore::load_from_files(dir.path()).unwrap();

        store.upsert_interaction(3, 12, 5.0, 300).unwrap();
        store.save_interactions(dir.path()).unwrap();

        let reloaded = InteractionStore::load_from_files(dir.path()).unwrap();
        assert_eq!(reloaded.counts().2, 6);
        assert_eq!(reloaded.get_interaction(3, 12).unwrap().rating, 5.0);
    }

    #[test]
    fn test_upsert_and_save_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let mut store = InteractionStore::load_from_files(dir.path()).unwrap();

        let previous = store.upsert_and_save(dir.path(), 1, 10, 2.0, 400).unwrap();
        assert_eq!(previous.unwrap().rating, 5.0);

        let reloaded = InteractionStore::load_from_files(dir.path()).unwrap();
        assert_eq!(reloaded.counts().2, 5);
        assert_eq!(reloaded.get_interaction(1, 10).unwrap().rating, 2.0);
        assert_eq!(store.get_interaction(1, 10).unwrap().rating, 2.0);
    }

    #[test]
    fn test_failed_save_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let mut store = InteractionStore::load_from_files(dir.path()).unwrap();
        let stats_before = store.item_stats(12).unwrap();

        let missing = dir.path().join("no-such-dir");
        assert!(store.upsert_and_save(&missing, 3, 12, 5.0, 300).is_err());
        assert!(store.upsert_and_save(&missing, 2, 12, 5.0, 300).is_err());

        assert!(store.get_interaction(3, 12).is_none());
        assert_eq!(store.get_interaction(2, 12).unwrap().rating, 2.0);
        assert_eq!(store.item_stats(12).unwrap(), stats_before);
        assert_eq!(store.counts().2, 5);
    }
}
