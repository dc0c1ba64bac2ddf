//! Bijection between external ids and dense 0-based indices.

use data_loader::{ItemId, UserId};
use serde::{Deserialize, Serialize};

/// Dense index space for one training run.
///
/// Ids are stored sorted and deduplicated, so the position of an id in its
/// list *is* its index and lookups are a binary search. The space is built
/// from the ids observed in the interaction set only: a user or item without
/// interactions has no index and must be served through cold start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawIndexSpace")]
pub struct IndexSpace {
    user_ids: Vec<UserId>,
    item_ids: Vec<ItemId>,
}

#[derive(Deserialize)]
struct RawIndexSpace {
    user_ids: Vec<UserId>,
    item_ids: Vec<ItemId>,
}

impl From<RawIndexSpace> for IndexSpace {
    fn from(raw: RawIndexSpace) -> Self {
        IndexSpace::from_ids(raw.user_ids, raw.item_ids)
    }
}

impl IndexSpace {
    /// Build from arbitrary (possibly repeated, unordered) ids.
    pub fn from_ids(
        user_ids: impl IntoIterator<Item = UserId>,
        item_ids: impl IntoIterator<Item = ItemId>,
    ) -> Self {
        let mut user_ids: Vec<UserId> = user_ids.into_iter().collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let mut item_ids: Vec<ItemId> = item_ids.into_iter().collect();
        item_ids.sort_unstable();
        item_ids.dedup();

        Self { user_ids, item_ids }
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_items(&self) -> usize {
        self.item_ids.len()
    }

    pub fn user_index(&self, user_id: UserId) -> Option<usize> {
        self.user_ids.binary_search(&user_id).ok()
    }

    pub fn item_index(&self, item_id: ItemId) -> Option<usize> {
        self.item_ids.binary_search(&item_id).ok()
    }

    pub fn user_id(&self, index: usize) -> Option<UserId> {
        self.user_ids.get(index).copied()
    }

    pub fn item_id(&self, index: usize) -> Option<ItemId> {
        self.item_ids.get(index).copied()
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sorted_and_deduplicated() {
        let space = IndexSpace::from_ids([7, 3, 7, 1], [20, 10, 20]);

        assert_eq!(space.user_ids(), &[1, 3, 7]);
        assert_eq!(space.num_items(), 2);
        assert_eq!(space.user_index(7), Some(2));
        assert_eq!(space.item_index(10), Some(0));
        assert_eq!(space.item_id(1), Some(20));
    }

    #[test]
    fn test_unknown_ids() {
        let space = IndexSpace::from_ids([1], [10]);
        assert_eq!(space.user_index(2), None);
        assert_eq!(space.item_index(11), None);
        assert_eq!(space.user_id(5), None);
    }

    #[test]
    fn test_deserialize_restores_ordering() {
        let space: IndexSpace =
            serde_json::from_str(r#"{"user_ids":[5,2],"item_ids":[9,9,4]}"#).unwrap();
        assert_eq!(space.user_ids(), &[2, 5]);
        assert_eq!(space.item_ids(), &[4, 9]);
    }
}
