//! Scored items and the deterministic ranking order.

use data_loader::ItemId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One recommended item with its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f32,
}

impl ScoredItem {
    pub fn new(item_id: ItemId, score: f32) -> Self {
        Self { item_id, score }
    }
}

/// Descending score, then ascending item id.
///
/// A total order, so equal inputs always rank identically.
pub fn ranking_order(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score.total_cmp(&a.score).then(a.item_id.cmp(&b.item_id))
}

pub fn rank(mut items: Vec<ScoredItem>) -> Vec<ScoredItem> {
    items.sort_by(ranking_order);
    items
}

/// Rank and keep the best `k`.
pub fn top_k(items: Vec<ScoredItem>, k: usize) -> Vec<ScoredItem> {
    let mut ranked = rank(items);
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_broken_by_item_id() {
        let items = vec![
            ScoredItem::new(9, 0.5),
            ScoredItem::new(3, 0.9),
            ScoredItem::new(4, 0.5),
            ScoredItem::new(1, 0.5),
        ];
        let ids: Vec<ItemId> = rank(items).iter().map(|s| s.item_id).collect();
        assert_eq!(ids, vec![3, 1, 4, 9]);
    }

    #[test]
    fn test_top_k_truncates() {
        let items = (0..10).map(|i| ScoredItem::new(i, i as f32)).collect();
        let top = top_k(items, 3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].item_id, 9);
    }
}
