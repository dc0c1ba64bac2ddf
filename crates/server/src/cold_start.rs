//! Content-based scoring for entities outside the model's index space.

use data_loader::{FeatureId, FeatureTable, FeatureWeight, ItemId, ItemStats};
use pipeline::{ScoredItem, rank};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How shared features between a user and an item become a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapScoring {
    /// `|shared| / |user features|`, intensities ignored
    #[default]
    Normalized,
    /// `Σ min(w_user, w_item)` over shared features, divided by `Σ w_user`
    IntensityWeighted,
}

impl std::str::FromStr for OverlapScoring {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "normalized" => Ok(OverlapScoring::Normalized),
            "intensity_weighted" | "weighted" => Ok(OverlapScoring::IntensityWeighted),
            other => Err(format!("unknown overlap scoring '{}'", other)),
        }
    }
}

impl OverlapScoring {
    /// Score one item; `None` when nothing is shared.
    pub fn score(&self, user: &HashMap<FeatureId, f32>, item: &[FeatureWeight]) -> Option<f32> {
        let shared: Vec<(f32, f32)> = item
            .iter()
            .filter_map(|f| user.get(&f.feature_id).map(|&w| (w, f.weight)))
            .collect();
        if shared.is_empty() {
            return None;
        }
        let score = match self {
            OverlapScoring::Normalized => shared.len() as f32 / user.len().max(1) as f32,
            OverlapScoring::IntensityWeighted => {
                let total: f32 = user.values().sum();
                let matched: f32 = shared.iter().map(|&(u, i)| u.min(i)).sum();
                if total > 0.0 { matched / total } else { 0.0 }
            }
        };
        Some(score)
    }
}

/// Every item sharing at least one feature with the user.
///
/// Equal overlap scores are ordered by item popularity (mean rating), then
/// by item id.
pub fn overlap_scores(
    user_features: &[FeatureWeight],
    items: &FeatureTable,
    stats: &HashMap<ItemId, ItemStats>,
    scoring: OverlapScoring,
) -> Vec<ScoredItem> {
    if user_features.is_empty() {
        return Vec::new();
    }
    let user: HashMap<FeatureId, f32> = user_features.iter().map(|f| (f.feature_id, f.weight)).collect();

    let mut scored: Vec<ScoredItem> = items
        .iter()
        .filter_map(|(&item_id, declared)| {
            scoring
                .score(&user, declared)
                .map(|score| ScoredItem::new(item_id, score))
        })
        .collect();

    let popularity = |id: ItemId| stats.get(&id).map_or(0.0, |s| s.avg_rating);
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| popularity(b.item_id).total_cmp(&popularity(a.item_id)))
            .then(a.item_id.cmp(&b.item_id))
    });
    scored
}

/// Items ranked by mean historical rating, ignoring sparsely rated ones.
pub fn popularity_scores(stats: &[(ItemId, ItemStats)], min_count: u32) -> Vec<ScoredItem> {
    rank(
        stats
            .iter()
            .filter(|(_, s)| s.rating_count >= min_count)
            .map(|&(id, s)| ScoredItem::new(id, s.avg_rating))
            .collect(),
    )
}
