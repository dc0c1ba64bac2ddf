//! The training path: dataset → fit → evaluate → artifact → registry.
//!
//! Nothing here touches the serving slot until the registry has decided to
//! promote, and the artifact is fully written before the run is completed.

use crate::active::ActiveModelSlot;
use crate::config::TrainingConfig;
use crate::error::Result;
use data_loader::InteractionStore;
use dataset::{DatasetBuilder, DatasetStats, train_test_split};
use models::{EvaluationReport, Evaluator, ModelFactory, TrainParams};
use registry::{ArtifactStore, ModelBundle, ModelRegistry, PromotionResult, RunId, TrainingRun};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, instrument, warn};

/// What one call to [`Trainer::train`] produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run: TrainingRun,
    pub promotion: PromotionResult,
}

pub struct Trainer {
    store: Arc<RwLock<InteractionStore>>,
    registry: Arc<ModelRegistry>,
    artifacts: ArtifactStore,
    slot: Arc<ActiveModelSlot>,
    /// Family whose promotions are loaded into `slot`
    serving_family: String,
    factory: ModelFactory,
    evaluator: Evaluator,
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(
        store: Arc<RwLock<InteractionStore>>,
        registry: Arc<ModelRegistry>,
        artifacts: ArtifactStore,
        slot: Arc<ActiveModelSlot>,
        serving_family: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            artifacts,
            slot,
            serving_family: serving_family.into(),
            factory: ModelFactory::with_defaults(),
            evaluator: Evaluator::default(),
            config: TrainingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Run one complete training and offer the result for promotion.
    ///
    /// The run is recorded first, so a failure at any later step (including
    /// too little data) leaves a `Failed` run in the history. Once the
    /// registry has promoted the run the outcome is returned even if serving
    /// could not load it yet; the next refresh retries the load.
    #[instrument(skip(self, params), fields(family = %params.family, algorithm = %params.algorithm))]
    pub fn train(&self, params: TrainParams) -> Result<TrainingOutcome> {
        let run = self.registry.start_run(params.clone(), DatasetStats::default())?;

        let completed = self
            .fit_and_evaluate(run.id, &params)
            .and_then(|(report, stats, artifact)| Ok(self.registry.complete_run(run.id, &report, stats, artifact)?));
        let run = match completed {
            Ok(run) => run,
            Err(e) => {
                if let Err(record) = self.registry.fail_run(run.id, &e.to_string()) {
                    warn!(run_id = %run.id, error = %record, "Could not record failed run");
                }
                return Err(e);
            }
        };

        let promotion = self.registry.evaluate_and_promote(run.id)?;
        if promotion.is_promoted()
            && run.family == self.serving_family
            && let Err(e) = self
                .slot
                .refresh_from_registry(&self.registry, &self.artifacts, &self.serving_family)
        {
            warn!(run_id = %run.id, error = %e, "Promoted run could not be loaded for serving");
        }
        info!(run_id = %run.id, promoted = promotion.is_promoted(), "Training finished");

        Ok(TrainingOutcome { run, promotion })
    }

    fn fit_and_evaluate(&self, run_id: RunId, params: &TrainParams) -> Result<(EvaluationReport, DatasetStats, PathBuf)> {
        // Build from a snapshot; writers are only blocked for the copy.
        let dataset = {
            let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
            DatasetBuilder::new()
                .with_min_interactions(self.config.min_interactions)
                .with_features(params.use_features)
                .build_from_store(&store)?
        };

        let (train, test) = train_test_split(&dataset.interactions, self.config.test_fraction, self.config.split_seed)?;
        let stats = DatasetStats {
            train_interactions: train.nnz(),
            test_interactions: test.nnz(),
            ..dataset.stats()
        };

        let model = self.factory.fit(
            params,
            &train,
            dataset.user_features.as_ref(),
            dataset.item_features.as_ref(),
        )?;
        let report = self.evaluator.evaluate(&model, &train, &test)?;

        let bundle = ModelBundle {
            algorithm: params.algorithm,
            model,
            index: dataset.index,
            vocabulary: dataset.vocabulary,
        };
        let artifact = self.artifacts.save(run_id, &bundle)?;
        Ok((report, stats, artifact))
    }
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("serving_family", &self.serving_family)
            .field("factory", &self.factory)
            .field("config", &self.config)
            .finish()
    }
}
