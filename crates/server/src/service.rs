//! Async facade over the engine, the trainer and the registry.
//!
//! Engine calls are CPU-bound and synchronous, so each request runs on the
//! blocking pool. Prediction paths are bounded by the configured timeout;
//! training is not.

use crate::active::ActiveModelSlot;
use crate::compare::{RunComparison, compare_runs};
use crate::config::{EngineConfig, TrainingConfig};
use crate::engine::{ItemReadiness, Neighbour, Prediction, PredictionEngine, PredictionMode};
use crate::error::{EngineError, Result};
use crate::training::{Trainer, TrainingOutcome};
use data_loader::{Interaction, InteractionStore, ItemId, ItemPlace, UserId, load_item_places};
use models::TrainParams;
use pipeline::RequestContext;
use registry::{ArtifactStore, ModelRegistry, PromotionResult, RunId, TrainingRun};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Directory under the registry directory holding per-run bundles.
pub const ARTIFACT_DIR: &str = "artifacts";

#[derive(Clone)]
pub struct RecommendationService {
    engine: Arc<PredictionEngine>,
    trainer: Arc<Trainer>,
    registry: Arc<ModelRegistry>,
    store: Arc<RwLock<InteractionStore>>,
    /// Where accepted interaction writes are persisted, if anywhere
    data_dir: Option<PathBuf>,
}

impl RecommendationService {
    /// Load the store from `data_dir` and the registry from `registry_dir`,
    /// then bring the family's active model into memory.
    pub fn open(
        data_dir: &Path,
        registry_dir: &Path,
        engine_config: EngineConfig,
        training_config: TrainingConfig,
    ) -> Result<Self> {
        let store = InteractionStore::load_from_files(data_dir)?;
        let places = load_item_places(data_dir)?;
        let registry = ModelRegistry::open(registry_dir)?;
        let artifacts = ArtifactStore::open(registry_dir.join(ARTIFACT_DIR))?;
        info!(
            "Opened service over {:?} with registry {:?}",
            data_dir, registry_dir
        );

        Self::assemble(
            store,
            registry,
            artifacts,
            engine_config,
            training_config,
            &places,
            Some(data_dir.to_path_buf()),
        )
    }

    /// Assemble from already-open parts; writes are kept in memory only.
    pub fn from_parts(
        store: InteractionStore,
        registry: ModelRegistry,
        artifacts: ArtifactStore,
        engine_config: EngineConfig,
        training_config: TrainingConfig,
    ) -> Result<Self> {
        Self::assemble(store, registry, artifacts, engine_config, training_config, &[], None)
    }

    fn assemble(
        store: InteractionStore,
        registry: ModelRegistry,
        artifacts: ArtifactStore,
        engine_config: EngineConfig,
        training_config: TrainingConfig,
        places: &[ItemPlace],
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let store = Arc::new(RwLock::new(store));
        let registry = Arc::new(registry);
        let slot = Arc::new(ActiveModelSlot::new());
        slot.refresh_from_registry(&registry, &artifacts, &engine_config.family)?;

        let trainer = Trainer::new(
            store.clone(),
            registry.clone(),
            artifacts,
            slot.clone(),
            engine_config.family.clone(),
        )
        .with_config(training_config);
        let engine = PredictionEngine::new(slot, store.clone(), engine_config).with_places(places);

        Ok(Self {
            engine: Arc::new(engine),
            trainer: Arc::new(trainer),
            registry,
            store,
            data_dir,
        })
    }

    pub fn engine(&self) -> &Arc<PredictionEngine> {
        &self.engine
    }

    pub fn family(&self) -> &str {
        &self.engine.config().family
    }

    fn timeout(&self) -> Duration {
        self.engine.config().prediction_timeout
    }

    /// Run `call` on the blocking pool, giving up after the prediction timeout.
    async fn predict_blocking<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&PredictionEngine) -> Result<T> + Send + 'static,
    {
        let engine = self.engine.clone();
        let timeout = self.timeout();
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || call(&engine));

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined.map_err(|e| EngineError::TaskFailed(e.to_string()))?,
            Err(_) => {
                warn!(elapsed = ?started.elapsed(), "Prediction timed out");
                Err(EngineError::PredictionTimeout(timeout))
            }
        }
    }

    /// Run `call` on the blocking pool without a deadline.
    async fn background<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(call)
            .await
            .map_err(|e| EngineError::TaskFailed(e.to_string()))?
    }

    // =========================================================================
    // Serving
    // =========================================================================

    #[instrument(skip(self, context))]
    pub async fn predict(
        &self,
        user_id: UserId,
        k: usize,
        mode: PredictionMode,
        context: Option<RequestContext>,
    ) -> Result<Prediction> {
        let started = Instant::now();
        let prediction = self
            .predict_blocking(move |engine| engine.predict_mode(user_id, k, mode, context.as_ref()))
            .await?;
        info!(
            strategy = %prediction.strategy,
            items = prediction.items.len(),
            "Served prediction in {:.2?}",
            started.elapsed()
        );
        Ok(prediction)
    }

    pub async fn similar_items(&self, item_id: ItemId, k: usize) -> Result<Vec<Neighbour>> {
        self.predict_blocking(move |engine| engine.similar_items(item_id, k)).await
    }

    pub async fn similar_users(&self, user_id: UserId, k: usize) -> Result<Vec<Neighbour>> {
        self.predict_blocking(move |engine| engine.similar_users(user_id, k)).await
    }

    pub async fn item_readiness(&self, item_id: ItemId) -> Result<ItemReadiness> {
        self.predict_blocking(move |engine| engine.item_readiness(item_id)).await
    }

    // =========================================================================
    // Training and registry operations
    // =========================================================================

    /// Train, evaluate, register and possibly promote. Serving keeps using
    /// the previous model until the promotion lands.
    pub async fn train(&self, params: TrainParams) -> Result<TrainingOutcome> {
        let trainer = self.trainer.clone();
        self.background(move || trainer.train(params)).await
    }

    pub async fn list_runs(&self) -> Result<Vec<TrainingRun>> {
        let registry = self.registry.clone();
        self.background(move || Ok(registry.list_runs()?)).await
    }

    pub async fn get_active_run(&self) -> Result<Option<TrainingRun>> {
        let registry = self.registry.clone();
        let family = self.family().to_string();
        self.background(move || Ok(registry.get_active_run(&family)?)).await
    }

    /// Activate `run_id` regardless of metrics.
    pub async fn force_promote(&self, run_id: RunId) -> Result<PromotionResult> {
        let registry = self.registry.clone();
        let promotion = self.background(move || Ok(registry.force_promote(run_id)?)).await?;
        self.reload().await?;
        Ok(promotion)
    }

    /// Re-select the best completed run of the serving family.
    pub async fn promote_best(&self) -> Result<Option<PromotionResult>> {
        let registry = self.registry.clone();
        let family = self.family().to_string();
        let promotion = self.background(move || Ok(registry.promote_best(&family)?)).await?;
        self.reload().await?;
        Ok(promotion)
    }

    /// Rank `user_id` under two completed runs, active or not.
    ///
    /// Both bundles are read from disk, so this is not bound by the
    /// prediction timeout.
    pub async fn compare_runs(&self, user_id: UserId, k: usize, first: RunId, second: RunId) -> Result<RunComparison> {
        let registry = self.registry.clone();
        let trainer = self.trainer.clone();
        self.background(move || compare_runs(&registry, trainer.artifacts(), user_id, k, first, second))
            .await
    }

    /// Pick up a promotion made elsewhere; returns whether the model changed.
    pub async fn reload(&self) -> Result<bool> {
        let registry = self.registry.clone();
        let trainer = self.trainer.clone();
        let slot = self.engine.slot().clone();
        let family = self.family().to_string();
        self.background(move || slot.refresh_from_registry(&registry, trainer.artifacts(), &family))
            .await
    }

    // =========================================================================
    // Interaction writes
    // =========================================================================

    /// Record a rating; a second write for the same pair replaces the first.
    ///
    /// When the service was opened from a data directory the log is written
    /// back first; if that write fails the in-memory store is left unchanged.
    pub async fn upsert_interaction(
        &self,
        user_id: UserId,
        item_id: ItemId,
        rating: f32,
        timestamp: i64,
    ) -> Result<Option<Interaction>> {
        let store = self.store.clone();
        let data_dir = self.data_dir.clone();
        self.background(move || {
            let mut store = store.write().unwrap_or_else(PoisonError::into_inner);
            let previous = match &data_dir {
                Some(dir) => store.upsert_and_save(dir, user_id, item_id, rating, timestamp)?,
                None => store.upsert_interaction(user_id, item_id, rating, timestamp)?,
            };
            Ok(previous)
        })
        .await
    }

    /// The user's interactions, most recent first.
    pub fn user_history(&self, user_id: UserId) -> Vec<Interaction> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut history = store.user_interactions(user_id);
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.item_id.cmp(&b.item_id)));
        history
    }

    /// Item display name, if the catalog has one.
    pub fn item_name(&self, item_id: ItemId) -> Option<String> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store
            .get_item(item_id)
            .map(|item| item.name.clone())
            .filter(|name| !name.is_empty())
    }
}

impl std::fmt::Debug for RecommendationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationService")
            .field("engine", &self.engine)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(timeout: Duration) -> RecommendationService {
        let dir = std::env::temp_dir();
        RecommendationService::from_parts(
            InteractionStore::new(),
            ModelRegistry::in_memory(),
            ArtifactStore::open(dir.join("recsys-service-tests")).unwrap(),
            EngineConfig::default().with_prediction_timeout(timeout),
            TrainingConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_slow_prediction_times_out() {
        let service = service(Duration::from_millis(20));
        let result = service
            .predict_blocking(|_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(EngineError::PredictionTimeout(_))));
    }

    #[tokio::test]
    async fn test_fast_prediction_passes_through_errors() {
        let service = service(Duration::from_secs(5));
        let result = service.predict(1, 5, PredictionMode::Warm, None).await;
        assert!(matches!(result, Err(EngineError::UnknownEntity { id: 1, .. })));
    }
}
