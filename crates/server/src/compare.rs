//! Side-by-side rankings of two training runs for one user.
//!
//! Both runs are loaded from their artifacts, so any completed run can be
//! compared whether or not it is the one serving.

use crate::active::LoadedModel;
use crate::error::Result;
use crate::strategies::rank_for_user;
use data_loader::{ItemId, UserId};
use models::Algorithm;
use pipeline::ScoredItem;
use registry::{ArtifactStore, ModelRegistry, RegistryError, RunId};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument};

/// One run's top `k` for the compared user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRanking {
    pub run_id: RunId,
    pub algorithm: Algorithm,
    pub items: Vec<ScoredItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunComparison {
    pub user_id: UserId,
    pub first: RunRanking,
    pub second: RunRanking,
    /// Items in both rankings, in the first run's order
    pub common: Vec<ItemId>,
    /// `common` as a percentage of the first ranking's length
    pub overlap_percent: f32,
}

/// Rank `user_id` under two completed runs and report where they agree.
#[instrument(skip(registry, artifacts))]
pub fn compare_runs(
    registry: &ModelRegistry,
    artifacts: &ArtifactStore,
    user_id: UserId,
    k: usize,
    first: RunId,
    second: RunId,
) -> Result<RunComparison> {
    let (first, second) = rayon::join(
        || rank_run(registry, artifacts, user_id, k, first),
        || rank_run(registry, artifacts, user_id, k, second),
    );
    let (first, second) = (first?, second?);

    let in_second: HashSet<ItemId> = second.items.iter().map(|s| s.item_id).collect();
    let common: Vec<ItemId> = first
        .items
        .iter()
        .map(|s| s.item_id)
        .filter(|id| in_second.contains(id))
        .collect();
    let overlap_percent = common.len() as f32 / first.items.len().max(1) as f32 * 100.0;

    info!(
        first = %first.run_id,
        second = %second.run_id,
        common = common.len(),
        "Compared runs for user {}",
        user_id
    );
    Ok(RunComparison {
        user_id,
        first,
        second,
        common,
        overlap_percent,
    })
}

fn rank_run(
    registry: &ModelRegistry,
    artifacts: &ArtifactStore,
    user_id: UserId,
    k: usize,
    run_id: RunId,
) -> Result<RunRanking> {
    let run = registry.get_run(run_id)?;
    if !run.is_completed() {
        return Err(RegistryError::RunNotCompleted(run_id).into());
    }
    let bundle = match &run.artifact {
        Some(path) => ArtifactStore::load_path(path)?,
        None => artifacts.load(run_id)?,
    };
    let loaded = LoadedModel::from_bundle(run_id, bundle);
    Ok(RunRanking {
        run_id,
        algorithm: loaded.algorithm,
        items: rank_for_user(&loaded, user_id, k)?,
    })
}
