//! The three answers a recommendation request can get, in fallback order.

use crate::active::{ActiveModelSlot, LoadedModel};
use crate::cold_start::{OverlapScoring, overlap_scores, popularity_scores};
use crate::error::{EngineError, Result};
use data_loader::{FeatureSource, UserId};
use models::Recommender;
use pipeline::{FallbackReason, ScoredItem, Strategy, top_k};
use std::collections::HashMap;
use std::sync::Arc;

/// Input shared by every strategy in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictRequest {
    pub user_id: UserId,
    pub k: usize,
}

impl PredictRequest {
    pub fn new(user_id: UserId, k: usize) -> Self {
        Self { user_id, k }
    }
}

/// Score every indexed item for an indexed user and keep the top `k`.
///
/// Items the user already interacted with are ranked like any other.
pub fn rank_for_user(loaded: &LoadedModel, user_id: UserId, k: usize) -> Result<Vec<ScoredItem>> {
    let user = loaded
        .index
        .user_index(user_id)
        .ok_or_else(|| EngineError::unknown_user(user_id))?;
    let scores = loaded.model.score_all(user)?;
    let scored = scores
        .into_iter()
        .enumerate()
        .filter_map(|(item, score)| loaded.index.item_id(item).map(|id| ScoredItem::new(id, score)))
        .collect();
    Ok(top_k(scored, k))
}

/// Collaborative scores from the active model.
pub struct WarmStrategy {
    slot: Arc<ActiveModelSlot>,
}

impl WarmStrategy {
    pub const NAME: &'static str = "warm";

    pub fn new(slot: Arc<ActiveModelSlot>) -> Self {
        Self { slot }
    }
}

impl Strategy<PredictRequest> for WarmStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn try_predict(&self, request: &PredictRequest) -> std::result::Result<Vec<ScoredItem>, FallbackReason> {
        let loaded = self.slot.get().ok_or(FallbackReason::NoModel)?;
        rank_for_user(&loaded, request.user_id, request.k).map_err(|e| match e {
            EngineError::UnknownEntity { kind, id } => FallbackReason::UnknownEntity(format!("{} {}", kind, id)),
            other => FallbackReason::Failed(other.to_string()),
        })
    }
}

/// Items sharing declared features with the user.
pub struct FeatureOverlapStrategy {
    source: Arc<dyn FeatureSource>,
    scoring: OverlapScoring,
}

impl FeatureOverlapStrategy {
    pub const NAME: &'static str = "feature_overlap";

    pub fn new(source: Arc<dyn FeatureSource>, scoring: OverlapScoring) -> Self {
        Self { source, scoring }
    }
}

impl Strategy<PredictRequest> for FeatureOverlapStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn try_predict(&self, request: &PredictRequest) -> std::result::Result<Vec<ScoredItem>, FallbackReason> {
        let declared = self.source.user_features(request.user_id);
        if declared.is_empty() {
            return Err(FallbackReason::NoSignal("user declared no features".to_string()));
        }
        let stats: HashMap<_, _> = self.source.all_item_stats().into_iter().collect();
        let scored = overlap_scores(&declared, &self.source.item_feature_table(), &stats, self.scoring);
        if scored.is_empty() {
            return Err(FallbackReason::NoSignal("no item shares a feature".to_string()));
        }
        let mut scored = scored;
        scored.truncate(request.k);
        Ok(scored)
    }
}

/// Mean historical rating, the last resort.
pub struct PopularityStrategy {
    source: Arc<dyn FeatureSource>,
    min_count: u32,
}

impl PopularityStrategy {
    pub const NAME: &'static str = "popularity";

    pub fn new(source: Arc<dyn FeatureSource>, min_count: u32) -> Self {
        Self { source, min_count }
    }
}

impl Strategy<PredictRequest> for PopularityStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn try_predict(&self, request: &PredictRequest) -> std::result::Result<Vec<ScoredItem>, FallbackReason> {
        let ranked = popularity_scores(&self.source.all_item_stats(), self.min_count);
        if ranked.is_empty() {
            return Err(FallbackReason::NoSignal(format!(
                "no item has {} or more ratings",
                self.min_count
            )));
        }
        Ok(top_k(ranked, request.k))
    }
}
