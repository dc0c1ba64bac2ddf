//! Core domain types for the interaction store.
//!
//! Users, items and features are owned by an external record-keeping system;
//! this crate only mirrors them so the recommender can read them. The only
//! write this side performs is `upsert_interaction`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{DataLoadError, Result};

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for an item (a place, product, ...)
pub type ItemId = u32;

/// Unique identifier for a feature in the shared user/item vocabulary
pub type FeatureId = u32;

/// Declared feature weights keyed by entity id (user or item).
pub type FeatureTable = HashMap<u32, Vec<FeatureWeight>>;

/// Lowest accepted rating / feature intensity.
pub const MIN_WEIGHT: f32 = 1.0;

/// Highest accepted rating / feature intensity.
pub const MAX_WEIGHT: f32 = 5.0;

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
}

/// A trait in the shared vocabulary, e.g. `(3, "ambience")`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feature {
    pub id: FeatureId,
    pub category: String,
}

/// "This entity exhibits/wants feature `feature_id` with intensity `weight`".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureWeight {
    pub feature_id: FeatureId,
    /// Intensity from 1.0 to 5.0
    pub weight: f32,
}

/// One row of the interaction log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub user_id: UserId,
    pub item_id: ItemId,
    /// Rating or implicit weight from 1.0 to 5.0
    pub rating: f32,
    /// Unix timestamp of the most recent write
    pub timestamp: i64,
}

/// Where an item is and when it is open, used by contextual re-ranking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ItemPlace {
    pub item_id: ItemId,
    pub latitude: f64,
    pub longitude: f64,
    /// Hour of day (0-23) the item opens
    pub open_hour: u8,
    /// Hour of day it closes; smaller than `open_hour` for overnight windows
    pub close_hour: u8,
}

/// Aggregate rating statistics for an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ItemStats {
    pub avg_rating: f32,
    pub rating_count: u32,
}

// =============================================================================
// Read interface consumed by the prediction engine
// =============================================================================

/// Read-only view of users, items and their declared features.
///
/// The prediction engine only ever talks to the store through this trait so
/// that a remote or cached implementation can be dropped in.
pub trait FeatureSource: Send + Sync {
    fn contains_user(&self, user_id: UserId) -> bool;

    fn contains_item(&self, item_id: ItemId) -> bool;

    /// All catalog item ids, ascending.
    fn item_ids(&self) -> Vec<ItemId>;

    fn user_features(&self, user_id: UserId) -> Vec<FeatureWeight>;

    fn item_features(&self, item_id: ItemId) -> Vec<FeatureWeight>;

    /// Declared features for every item that has at least one.
    fn item_feature_table(&self) -> FeatureTable;

    fn item_stats(&self, item_id: ItemId) -> Option<ItemStats>;

    /// Statistics for every item with at least one interaction.
    fn all_item_stats(&self) -> Vec<(ItemId, ItemStats)>;
}

// =============================================================================
// InteractionStore
// =============================================================================

/// In-memory mirror of the interaction log and feature associations.
///
/// Interactions are keyed by `(user, item)`, so there is never more than one
/// row per pair: a second write for the same pair replaces the first.
#[derive(Debug, Default)]
pub struct InteractionStore {
    pub(crate) users: HashMap<UserId, User>,
    pub(crate) items: HashMap<ItemId, Item>,
    pub(crate) features: HashMap<FeatureId, Feature>,

    pub(crate) interactions: HashMap<(UserId, ItemId), Interaction>,

    pub(crate) user_features: FeatureTable,
    pub(crate) item_features: FeatureTable,

    /// Running (sum, count) of ratings per item, kept current on upsert
    pub(crate) item_totals: HashMap<ItemId, (f64, u32)>,
}

impl InteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn get_feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(&id)
    }

    pub fn get_interaction(&self, user_id: UserId, item_id: ItemId) -> Option<&Interaction> {
        self.interactions.get(&(user_id, item_id))
    }

    /// Every interaction, ordered by `(user_id, item_id)`.
    pub fn interactions(&self) -> Vec<Interaction> {
        let mut rows: Vec<Interaction> = self.interactions.values().copied().collect();
        rows.sort_unstable_by_key(|r| (r.user_id, r.item_id));
        rows
    }

    /// Interactions written by one user, ordered by item id.
    pub fn user_interactions(&self, user_id: UserId) -> Vec<Interaction> {
        let mut rows: Vec<Interaction> = self
            .interactions
            .values()
            .filter(|r| r.user_id == user_id)
            .copied()
            .collect();
        rows.sort_unstable_by_key(|r| r.item_id);
        rows
    }

    pub fn user_feature_rows(&self) -> &FeatureTable {
        &self.user_features
    }

    pub fn item_feature_rows(&self) -> &FeatureTable {
        &self.item_features
    }

    /// Declared feature catalog ids, ascending.
    pub fn feature_ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = self.features.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.users.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_item(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    pub fn insert_feature(&mut self, feature: Feature) {
        self.features.insert(feature.id, feature);
    }

    /// Declare (or overwrite) a user's intensity for a feature.
    pub fn set_user_feature(&mut self, user_id: UserId, feature: FeatureWeight) -> Result<()> {
        check_weight("user feature weight", feature.weight)?;
        upsert_feature(&mut self.user_features, user_id, feature);
        Ok(())
    }

    /// Declare (or overwrite) an item's intensity for a feature.
    pub fn set_item_feature(&mut self, item_id: ItemId, feature: FeatureWeight) -> Result<()> {
        check_weight("item feature weight", feature.weight)?;
        upsert_feature(&mut self.item_features, item_id, feature);
        Ok(())
    }

    /// Write an interaction, replacing any existing row for the same pair.
    ///
    /// Returns the previous row when one was overwritten.
    pub fn upsert_interaction(
        &mut self,
        user_id: UserId,
        item_id: ItemId,
        rating: f32,
        timestamp: i64,
    ) -> Result<Option<Interaction>> {
        let row = self.checked_row(user_id, item_id, rating, timestamp)?;
        let previous = self.interactions.insert((user_id, item_id), row);

        let totals = self.item_totals.entry(item_id).or_insert((0.0, 0));
        match previous {
            Some(old) => totals.0 += f64::from(rating) - f64::from(old.rating),
            None => {
                totals.0 += f64::from(rating);
                totals.1 += 1;
            }
        }
        Ok(previous)
    }

    /// A validated interaction row, not yet applied.
    pub(crate) fn checked_row(
        &self,
        user_id: UserId,
        item_id: ItemId,
        rating: f32,
        timestamp: i64,
    ) -> Result<Interaction> {
        check_weight("rating", rating)?;
        if !self.users.contains_key(&user_id) {
            return Err(DataLoadError::UnknownReference {
                entity: "user",
                id: user_id,
            });
        }
        if !self.items.contains_key(&item_id) {
            return Err(DataLoadError::UnknownReference {
                entity: "item",
                id: item_id,
            });
        }
        Ok(Interaction {
            user_id,
            item_id,
            rating,
            timestamp,
        })
    }

    /// Get counts for debugging/validation: (users, items, interactions)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.users.len(), self.items.len(), self.interactions.len())
    }
}

fn check_weight(field: &'static str, value: f32) -> Result<()> {
    if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&value) {
        return Err(DataLoadError::OutOfRange { field, value });
    }
    Ok(())
}

fn upsert_feature(table: &mut FeatureTable, entity: u32, feature: FeatureWeight) {
    let declared = table.entry(entity).or_default();
    match declared.iter_mut().find(|f| f.feature_id == feature.feature_id) {
        Some(existing) => existing.weight = feature.weight,
        None => declared.push(feature),
    }
}

impl FeatureSource for InteractionStore {
    fn contains_user(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    fn contains_item(&self, item_id: ItemId) -> bool {
        self.items.contains_key(&item_id)
    }

    fn item_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.items.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn user_features(&self, user_id: UserId) -> Vec<FeatureWeight> {
        self.user_features.get(&user_id).cloned().unwrap_or_default()
    }

    fn item_features(&self, item_id: ItemId) -> Vec<FeatureWeight> {
        self.item_features.get(&item_id).cloned().unwrap_or_default()
    }

    fn item_feature_table(&self) -> FeatureTable {
        self.item_features.clone()
    }

    fn item_stats(&self, item_id: ItemId) -> Option<ItemStats> {
        self.item_totals
            .get(&item_id)
            .and_then(|&(sum, count)| stats_from_totals(sum, count))
    }

    fn all_item_stats(&self) -> Vec<(ItemId, ItemStats)> {
        let mut stats: Vec<(ItemId, ItemStats)> = self
            .item_totals
            .iter()
            .filter_map(|(&id, &(sum, count))| stats_from_totals(sum, count).map(|s| (id, s)))
            .collect();
        stats.sort_unstable_by_key(|(id, _)| *id);
        stats
    }
}

pub(crate) fn stats_from_totals(sum: f64, count: u32) -> Option<ItemStats> {
    if count == 0 {
        return None;
    }
    Some(ItemStats {
        avg_rating: (sum / f64::from(count)) as f32,
        rating_count: count,
    })
}

/// Shared store behind a lock: serving reads while the record-keeping side
/// keeps writing interactions.
impl FeatureSource for RwLock<InteractionStore> {
    fn contains_user(&self, user_id: UserId) -> bool {
        read(self).contains_user(user_id)
    }

    fn contains_item(&self, item_id: ItemId) -> bool {
        read(self).contains_item(item_id)
    }

    fn item_ids(&self) -> Vec<ItemId> {
        read(self).item_ids()
    }

    fn user_features(&self, user_id: UserId) -> Vec<FeatureWeight> {
        read(self).user_features(user_id)
    }

    fn item_features(&self, item_id: ItemId) -> Vec<FeatureWeight> {
        read(self).item_features(item_id)
    }

    fn item_feature_table(&self) -> FeatureTable {
        read(self).item_feature_table()
    }

    fn item_stats(&self, item_id: ItemId) -> Option<ItemStats> {
        read(self).item_stats(item_id)
    }

    fn all_item_stats(&self) -> Vec<(ItemId, ItemStats)> {
        read(self).all_item_stats()
    }
}

// A writer that panicked mid-upsert leaves at worst one stale total; reads stay usable.
fn read(lock: &RwLock<InteractionStore>) -> std::sync::RwLockReadGuard<'_, InteractionStore> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}
