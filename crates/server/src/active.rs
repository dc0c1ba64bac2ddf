//! The active-model pointer shared by training and serving.

use crate::error::{EngineError, Result};
use dataset::{FeatureVocabulary, IndexSpace};
use models::{Algorithm, FittedModel};
use registry::{ArtifactStore, ModelBundle, ModelRegistry, RunId};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{info, instrument};

/// A fitted model together with the id mapping it was trained with.
#[derive(Debug)]
pub struct LoadedModel {
    pub run_id: RunId,
    pub algorithm: Algorithm,
    pub model: FittedModel,
    pub index: IndexSpace,
    pub vocabulary: Option<FeatureVocabulary>,
}

impl LoadedModel {
    pub fn from_bundle(run_id: RunId, bundle: ModelBundle) -> Self {
        Self {
            run_id,
            algorithm: bundle.algorithm,
            model: bundle.model,
            index: bundle.index,
            vocabulary: bundle.vocabulary,
        }
    }
}

/// Holds the model currently serving.
///
/// Readers clone the `Arc` and keep using their snapshot even if a promotion
/// swaps the slot mid-request.
#[derive(Debug, Default)]
pub struct ActiveModelSlot {
    current: RwLock<Option<Arc<LoadedModel>>>,
    /// Held for a whole read-load-set refresh, so a slow refresh of an older
    /// promotion cannot land after a newer one.
    refreshing: Mutex<()>,
}

impl ActiveModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<LoadedModel>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current snapshot, or `ModelNotTrained`.
    pub fn require(&self) -> Result<Arc<LoadedModel>> {
        self.get().ok_or(EngineError::ModelNotTrained)
    }

    pub fn set(&self, model: LoadedModel) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(Arc::new(model));
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.get().map(|m| m.run_id)
    }

    /// Load the registry's active run for `family` if it is not the one
    /// already held. Returns whether the slot changed.
    ///
    /// Refreshes run one at a time and each reads the registry after the
    /// previous one finished, so the last refresh always installs the run
    /// that is active at that point.
    #[instrument(skip(self, registry, artifacts))]
    pub fn refresh_from_registry(
        &self,
        registry: &ModelRegistry,
        artifacts: &ArtifactStore,
        family: &str,
    ) -> Result<bool> {
        let _refreshing = self.refreshing.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = registry.get_active_run(family)? else {
            return Ok(false);
        };
        if self.run_id() == Some(active.id) {
            return Ok(false);
        }

        let bundle = match &active.artifact {
            Some(path) => ArtifactStore::load_path(path)?,
            None => artifacts.load(active.id)?,
        };
        self.set(LoadedModel::from_bundle(active.id, bundle));
        info!(run_id = %active.id, algorithm = %active.params.algorithm, "Active model loaded");
        Ok(true)
    }
}
