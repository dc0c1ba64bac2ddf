//! Prediction engine: answers every read-side request against the active
//! model snapshot and the feature store.

use crate::active::{ActiveModelSlot, LoadedModel};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::strategies::{FeatureOverlapStrategy, PopularityStrategy, PredictRequest, WarmStrategy, rank_for_user};
use data_loader::{FeatureSource, ItemId, ItemPlace, UserId};
use models::Recommender;
use pipeline::{
    ContextReranker, Diversifier, DistanceAdjuster, Draw, FallbackChain, OpeningHours, OpeningHoursAdjuster,
    PipelineError, RequestContext, ScoredItem,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, instrument};

/// Which path a serving request takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMode {
    #[default]
    Warm,
    ColdStart,
    Diverse,
    Contextual,
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PredictionMode::Warm => "warm",
            PredictionMode::ColdStart => "cold_start",
            PredictionMode::Diverse => "diverse",
            PredictionMode::Contextual => "contextual",
        };
        f.write_str(name)
    }
}

impl FromStr for PredictionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "warm" => Ok(PredictionMode::Warm),
            "cold_start" | "cold" => Ok(PredictionMode::ColdStart),
            "diverse" => Ok(PredictionMode::Diverse),
            "contextual" => Ok(PredictionMode::Contextual),
            other => Err(format!("unknown prediction mode '{}'", other)),
        }
    }
}

/// Ranked answer plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub mode: PredictionMode,
    /// Strategy that produced the items, `exploration` for a random draw,
    /// `none` when nothing could be recommended
    pub strategy: String,
    pub items: Vec<ScoredItem>,
}

/// A user or item and its cosine similarity to the query entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbour {
    pub id: u32,
    pub similarity: f32,
}

/// Whether a newly added item has enough signal to be served well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ItemReadiness {
    pub item_id: ItemId,
    pub feature_count: usize,
    pub interaction_count: u32,
    /// Present in the active model's index space
    pub in_model: bool,
    pub ready: bool,
}

pub const EXPLORATION: &str = "exploration";
pub const NO_STRATEGY: &str = "none";

pub struct PredictionEngine {
    slot: Arc<ActiveModelSlot>,
    source: Arc<dyn FeatureSource>,
    config: EngineConfig,
    chain: FallbackChain<PredictRequest>,
    cold_chain: FallbackChain<PredictRequest>,
    reranker: ContextReranker,
    rng: Mutex<StdRng>,
}

impl PredictionEngine {
    pub fn new(slot: Arc<ActiveModelSlot>, source: Arc<dyn FeatureSource>, config: EngineConfig) -> Self {
        let chain = FallbackChain::new()
            .add_strategy(WarmStrategy::new(slot.clone()))
            .add_strategy(FeatureOverlapStrategy::new(source.clone(), config.overlap_scoring))
            .add_strategy(PopularityStrategy::new(source.clone(), config.popularity_min_count));
        let cold_chain = FallbackChain::new()
            .add_strategy(FeatureOverlapStrategy::new(source.clone(), config.overlap_scoring))
            .add_strategy(PopularityStrategy::new(source.clone(), config.popularity_min_count));
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            slot,
            source,
            config,
            chain,
            cold_chain,
            reranker: ContextReranker::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Replace the contextual re-ranker (default: identity).
    pub fn with_reranker(mut self, reranker: ContextReranker) -> Self {
        self.reranker = reranker;
        self
    }

    /// Opening-hours and distance adjustments built from item places.
    pub fn with_places(self, places: &[ItemPlace]) -> Self {
        if places.is_empty() {
            return self;
        }
        let hours = places
            .iter()
            .map(|p| (p.item_id, OpeningHours::daily(p.open_hour, p.close_hour)))
            .collect();
        let locations = places.iter().map(|p| (p.item_id, (p.latitude, p.longitude))).collect();
        self.with_reranker(
            ContextReranker::new()
                .add_adjuster(OpeningHoursAdjuster::new(hours))
                .add_adjuster(DistanceAdjuster::new(locations)),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn slot(&self) -> &Arc<ActiveModelSlot> {
        &self.slot
    }

    // =========================================================================
    // Warm and cold start
    // =========================================================================

    /// Top `k` from the active model. Fails with `UnknownEntity` for a user
    /// outside the model's index space.
    #[instrument(skip(self))]
    pub fn predict(&self, user_id: UserId, k: usize) -> Result<Vec<ScoredItem>> {
        let loaded = self.slot.require()?;
        rank_for_user(&loaded, user_id, k)
    }

    /// Content-based top `k` for a user the model does not know.
    ///
    /// Never fails for a user present in the store: with no overlapping
    /// features it falls back to popularity, and with nothing popular either
    /// it returns an empty list.
    #[instrument(skip(self))]
    pub fn predict_cold_start(&self, user_id: UserId, k: usize) -> Result<Vec<ScoredItem>> {
        if !self.source.contains_user(user_id) {
            return Err(EngineError::unknown_user(user_id));
        }
        Ok(self.run_chain(&self.cold_chain, user_id, k)?.1)
    }

    /// Warm if possible, otherwise cold start; the routed entry point.
    #[instrument(skip(self))]
    pub fn recommend(&self, user_id: UserId, k: usize) -> Result<Prediction> {
        self.ensure_user(user_id)?;
        let (strategy, items) = self.run_chain(&self.chain, user_id, k)?;
        Ok(Prediction {
            mode: PredictionMode::Warm,
            strategy,
            items,
        })
    }

    fn run_chain(
        &self,
        chain: &FallbackChain<PredictRequest>,
        user_id: UserId,
        k: usize,
    ) -> Result<(String, Vec<ScoredItem>)> {
        if k == 0 {
            return Ok((NO_STRATEGY.to_string(), Vec::new()));
        }
        match chain.run(&PredictRequest::new(user_id, k)) {
            Ok(outcome) => Ok((outcome.strategy, outcome.items)),
            Err(PipelineError::Exhausted { skipped }) => {
                info!(user_id, tried = skipped.len(), "No strategy could recommend");
                Ok((NO_STRATEGY.to_string(), Vec::new()))
            }
        }
    }

    fn ensure_user(&self, user_id: UserId) -> Result<()> {
        let indexed = self
            .slot
            .get()
            .is_some_and(|m| m.index.user_index(user_id).is_some());
        if indexed || self.source.contains_user(user_id) {
            Ok(())
        } else {
            Err(EngineError::unknown_user(user_id))
        }
    }

    // =========================================================================
    // Similarity
    // =========================================================================

    /// Items whose learned vectors point the same way as `item_id`'s.
    #[instrument(skip(self))]
    pub fn similar_items(&self, item_id: ItemId, k: usize) -> Result<Vec<Neighbour>> {
        let loaded = self.vector_model("similar_items")?;
        let query = loaded
            .index
            .item_index(item_id)
            .ok_or_else(|| EngineError::unknown_item(item_id))?;
        let model = &loaded.model;
        let neighbours = cosine_neighbours(model.num_items(), query, |i| model.item_vector(i))?;
        Ok(to_neighbours(neighbours, k, |i| loaded.index.item_id(i)))
    }

    /// Users whose learned vectors point the same way as `user_id`'s.
    #[instrument(skip(self))]
    pub fn similar_users(&self, user_id: UserId, k: usize) -> Result<Vec<Neighbour>> {
        let loaded = self.vector_model("similar_users")?;
        let query = loaded
            .index
            .user_index(user_id)
            .ok_or_else(|| EngineError::unknown_user(user_id))?;
        let model = &loaded.model;
        let neighbours = cosine_neighbours(model.num_users(), query, |u| model.user_vector(u))?;
        Ok(to_neighbours(neighbours, k, |u| loaded.index.user_id(u)))
    }

    fn vector_model(&self, operation: &str) -> Result<Arc<LoadedModel>> {
        let loaded = self.slot.require()?;
        if !loaded.model.has_vectors() {
            return Err(EngineError::UnsupportedOperation {
                operation: operation.to_string(),
                algorithm: loaded.algorithm.to_string(),
                alternative: "the popularity fallback",
            });
        }
        Ok(loaded)
    }

    // =========================================================================
    // Diversify and context
    // =========================================================================

    /// Epsilon-greedy: one coin flip per request decides between a uniform
    /// draw from the catalog and the routed ranking.
    #[instrument(skip(self))]
    pub fn predict_diverse(&self, user_id: UserId, k: usize, exploration_rate: Option<f64>) -> Result<Prediction> {
        self.ensure_user(user_id)?;
        let diversifier = Diversifier::new(exploration_rate.unwrap_or(self.config.exploration_rate))
            .with_neutral_score(self.config.neutral_score);

        let catalog = self.source.item_ids();
        let draw = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            diversifier.draw(&catalog, k, &mut *rng)
        };

        match draw {
            Draw::Explore(items) => {
                debug!(user_id, rate = diversifier.exploration_rate(), "Serving exploration draw");
                Ok(Prediction {
                    mode: PredictionMode::Diverse,
                    strategy: EXPLORATION.to_string(),
                    items,
                })
            }
            Draw::Exploit => {
                let routed = self.recommend(user_id, k)?;
                Ok(Prediction {
                    mode: PredictionMode::Diverse,
                    ..routed
                })
            }
        }
    }

    /// Re-sort a pool of candidates by context-adjusted score and keep `k`.
    #[instrument(skip(self))]
    pub fn predict_contextual(&self, user_id: UserId, k: usize, context: &RequestContext) -> Result<Prediction> {
        let pool = k.saturating_mul(self.config.contextual_pool_factor.max(1));
        let base = self.recommend(user_id, pool)?;
        let mut items = self.reranker.rerank(base.items, context);
        items.truncate(k);
        Ok(Prediction {
            mode: PredictionMode::Contextual,
            strategy: base.strategy,
            items,
        })
    }

    /// Dispatch on `mode`.
    pub fn predict_mode(
        &self,
        user_id: UserId,
        k: usize,
        mode: PredictionMode,
        context: Option<&RequestContext>,
    ) -> Result<Prediction> {
        match mode {
            PredictionMode::Warm => self.recommend(user_id, k),
            PredictionMode::ColdStart => Ok(Prediction {
                mode,
                strategy: "cold_start".to_string(),
                items: self.predict_cold_start(user_id, k)?,
            }),
            PredictionMode::Diverse => self.predict_diverse(user_id, k, None),
            PredictionMode::Contextual => {
                let context = context.copied().unwrap_or_default();
                self.predict_contextual(user_id, k, &context)
            }
        }
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    pub fn item_readiness(&self, item_id: ItemId) -> Result<ItemReadiness> {
        if !self.source.contains_item(item_id) {
            return Err(EngineError::unknown_item(item_id));
        }
        let feature_count = self.source.item_features(item_id).len();
        let interaction_count = self.source.item_stats(item_id).map_or(0, |s| s.rating_count);
        let in_model = self
            .slot
            .get()
            .is_some_and(|m| m.index.item_index(item_id).is_some());
        Ok(ItemReadiness {
            item_id,
            feature_count,
            interaction_count,
            in_model,
            ready: feature_count >= self.config.readiness_min_features
                && interaction_count >= self.config.readiness_min_interactions,
        })
    }
}

impl fmt::Debug for PredictionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionEngine")
            .field("strategies", &self.chain.names())
            .field("active_run", &self.slot.run_id())
            .field("config", &self.config)
            .finish()
    }
}

fn unit(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Cosine similarity of every other index to `query`.
fn cosine_neighbours<F>(count: usize, query: usize, vector: F) -> Result<Vec<(usize, f32)>>
where
    F: Fn(usize) -> models::Result<Vec<f32>> + Sync,
{
    let target = unit(vector(query)?);
    let scored = (0..count)
        .into_par_iter()
        .filter(|&i| i != query)
        .map(|i| {
            let v = unit(vector(i)?);
            Ok((i, target.iter().zip(&v).map(|(a, b)| a * b).sum()))
        })
        .collect::<models::Result<Vec<(usize, f32)>>>()?;
    Ok(scored)
}

fn to_neighbours(scored: Vec<(usize, f32)>, k: usize, id_of: impl Fn(usize) -> Option<u32>) -> Vec<Neighbour> {
    let mut neighbours: Vec<Neighbour> = scored
        .into_iter()
        .filter_map(|(i, similarity)| id_of(i).map(|id| Neighbour { id, similarity }))
        .collect();
    neighbours.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    neighbours.truncate(k);
    neighbours
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{FeatureWeight, InteractionStore, Item, User};
    use dataset::DatasetBuilder;
    use models::{Algorithm, ModelFactory, TrainParams};

    fn store() -> InteractionStore {
        let mut store = InteractionStore::new();
        for id in 1..=4 {
            store.insert_user(User { id });
        }
        for id in 10..=13 {
            store.insert_item(Item {
                id,
                name: format!("place {}", id),
            });
        }
        for (u, i, r) in [(1, 10, 5.0), (1, 11, 3.0), (2, 10, 4.0), (2, 11, 5.0), (2, 12, 2.0)] {
            store.upsert_interaction(u, i, r, 0).unwrap();
        }
        store.set_user_feature(3, FeatureWeight { feature_id: 1, weight: 5.0 }).unwrap();
        store.set_item_feature(13, FeatureWeight { feature_id: 1, weight: 3.0 }).unwrap();
        store
    }

    fn engine(algorithm: Algorithm) -> PredictionEngine {
        let store = store();
        let dataset = DatasetBuilder::new().with_features(false).build_from_store(&store).unwrap();
        let params = TrainParams::new(algorithm).with_epochs(20);
        let model = ModelFactory::with_defaults()
            .fit(&params, &dataset.interactions, None, None)
            .unwrap();

        let slot = Arc::new(ActiveModelSlot::new());
        slot.set(LoadedModel {
            run_id: registry::RunId::new(),
            algorithm,
            model,
            index: dataset.index,
            vocabulary: None,
        });
        let config = EngineConfig::default().with_popularity_min_count(1).with_rng_seed(7);
        PredictionEngine::new(slot, Arc::new(store), config)
    }

    #[test]
    fn test_warm_prediction_is_repeatable() {
        let engine = engine(Algorithm::ItemKnn);
        let first = engine.predict(1, 2).unwrap();
        assert_eq!(first, engine.predict(1, 2).unwrap());
        assert_eq!(first[0].item_id, 10);
    }

    #[test]
    fn test_unknown_to_model_routes_to_cold_start() {
        let engine = engine(Algorithm::ItemKnn);
        assert!(matches!(engine.predict(3, 2), Err(EngineError::UnknownEntity { id: 3, .. })));

        let routed = engine.recommend(3, 2).unwrap();
        assert_eq!(routed.strategy, "feature_overlap");
        assert_eq!(routed.items[0].item_id, 13);

        // no features, no interactions: popularity
        let routed = engine.recommend(4, 2).unwrap();
        assert_eq!(routed.strategy, "popularity");
        assert_eq!(routed.items.len(), 2);
    }

    #[test]
    fn test_cold_start_rejects_unknown_users_only() {
        let engine = engine(Algorithm::Baseline);
        assert!(engine.predict_cold_start(99, 3).is_err());
        assert!(!engine.predict_cold_start(4, 3).unwrap().is_empty());
    }

    #[test]
    fn test_similarity_requires_vectors() {
        let baseline = engine(Algorithm::Baseline);
        assert!(matches!(
            baseline.similar_items(10, 2),
            Err(EngineError::UnsupportedOperation { .. })
        ));

        let knn = engine(Algorithm::ItemKnn);
        let similar = knn.similar_items(10, 5).unwrap();
        assert_eq!(similar.len(), 2);
        assert!(similar.iter().all(|n| n.id != 10));
        assert!(similar[0].similarity >= similar[1].similarity);

        let users = knn.similar_users(1, 5).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, 2);
    }

    #[test]
    fn test_no_model() {
        let slot = Arc::new(ActiveModelSlot::new());
        let engine = PredictionEngine::new(slot, Arc::new(store()), EngineConfig::default());
        assert!(matches!(engine.predict(1, 2), Err(EngineError::ModelNotTrained)));
        assert!(matches!(engine.similar_users(1, 2), Err(EngineError::ModelNotTrained)));
        // the routed path still answers from content and popularity
        assert_eq!(engine.recommend(1, 2).unwrap().strategy, "popularity");
    }

    #[test]
    fn test_diverse_extremes() {
        let engine = engine(Algorithm::ItemKnn);
        let explored = engine.predict_diverse(1, 3, Some(1.0)).unwrap();
        assert_eq!(explored.strategy, EXPLORATION);
        assert_eq!(explored.items.len(), 3);
        assert!(explored.items.iter().all(|s| s.score == 0.5));

        let exploited = engine.predict_diverse(1, 2, Some(0.0)).unwrap();
        assert_eq!(exploited.strategy, "warm");
        assert_eq!(exploited.items, engine.predict(1, 2).unwrap());
    }

    #[test]
    fn test_diverse_requests_explore_at_the_configured_rate() {
        let engine = engine(Algorithm::ItemKnn);
        let trials = 2_000;
        let explored = (0..trials)
            .map(|_| engine.predict_diverse(1, 2, Some(0.3)).unwrap())
            .filter(|p| p.strategy == EXPLORATION)
            .count();
        let rate = explored as f64 / trials as f64;
        assert!((rate - 0.3).abs() < 0.05, "rate = {rate}");
    }

    #[test]
    fn test_contextual_identity_keeps_order() {
        let engine = engine(Algorithm::ItemKnn);
        let ctx = RequestContext::new().with_time(12, 2);
        let contextual = engine.predict_contextual(1, 2, &ctx).unwrap();
        assert_eq!(contextual.items, engine.predict(1, 2).unwrap());
    }

    #[test]
    fn test_contextual_places_demote_closed_items() {
        let places = [
            ItemPlace {
                item_id: 10,
                latitude: 0.0,
                longitude: 0.0,
                open_hour: 8,
                close_hour: 10,
            },
        ];
        let engine = engine(Algorithm::ItemKnn).with_places(&places);
        let ctx = RequestContext::new().with_time(20, 2);
        let base = engine.predict(1, 3).unwrap();
        let contextual = engine.predict_contextual(1, 3, &ctx).unwrap();

        let base_score = base.iter().find(|s| s.item_id == 10).unwrap().score;
        let adjusted = contextual.items.iter().find(|s| s.item_id == 10).unwrap().score;
        assert!((adjusted - base_score * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_item_readiness() {
        let engine = engine(Algorithm::Baseline);
        let fresh = engine.item_readiness(13).unwrap();
        assert_eq!(fresh.feature_count, 1);
        assert_eq!(fresh.interaction_count, 0);
        assert!(!fresh.in_model);
        assert!(!fresh.ready);

        assert!(engine.item_readiness(10).unwrap().in_model);
        assert!(engine.item_readiness(77).is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("cold-start".parse::<PredictionMode>().unwrap(), PredictionMode::ColdStart);
        assert!("random".parse::<PredictionMode>().is_err());
    }
}
