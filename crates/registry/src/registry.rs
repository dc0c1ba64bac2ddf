//! The model registry: run history, promotion and the active pointer.

use crate::error::{RegistryError, Result};
use crate::selector::{Decision, PromotionPolicy, PromotionReason, PromotionResult, RejectionReason};
use crate::store::{InMemoryStore, JsonFileStore, RegistryStore};
use crate::types::{ModelRegistryEntry, RegistryState, RunId, RunStatus, TrainingRun};
use chrono::Utc;
use dataset::DatasetStats;
use models::{EvaluationReport, TrainParams};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// Commit attempts before a conflicting promotion gives up.
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// Catalog of training runs with one active entry per model family.
///
/// Promotions within a family are serialised by a per-family lock, and every
/// commit is checked against the store generation it was computed from. A
/// stale commit restarts the whole read-decide-write sequence.
pub struct ModelRegistry {
    store: Arc<dyn RegistryStore>,
    policy: PromotionPolicy,
    family_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    max_retries: usize,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            store,
            policy: PromotionPolicy::default(),
            family_locks: Mutex::new(HashMap::new()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Registry persisted as `<dir>/registry.json`.
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(JsonFileStore::open(dir)?)))
    }

    pub fn with_policy(mut self, policy: PromotionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    // =========================================================================
    // Run lifecycle
    // =========================================================================

    /// Record a new run in `Running` state.
    pub fn start_run(&self, params: TrainParams, dataset_stats: DatasetStats) -> Result<TrainingRun> {
        let run = TrainingRun::new(params, dataset_stats);
        self.transact(|state| {
            state.runs.push(run.clone());
            Ok(((), true))
        })?;
        info!(run_id = %run.id, family = %run.family, "Training run started");
        Ok(run)
    }

    /// Attach metrics and the artifact location; the run becomes immutable.
    pub fn complete_run(
        &self,
        run_id: RunId,
        report: &EvaluationReport,
        dataset_stats: DatasetStats,
        artifact: PathBuf,
    ) -> Result<TrainingRun> {
        let run = self.finish(run_id, |run| {
            run.status = RunStatus::Completed;
            run.metrics = report.metrics.clone();
            run.degraded = report.degraded.clone();
            run.dataset_stats = dataset_stats;
            run.artifact = Some(artifact.clone());
        })?;
        if let Some(reason) = &run.degraded {
            warn!(run_id = %run_id, reason = %reason, "Run completed with degraded evaluation");
        } else {
            info!(run_id = %run_id, "Training run completed");
        }
        Ok(run)
    }

    pub fn fail_run(&self, run_id: RunId, reason: &str) -> Result<TrainingRun> {
        let run = self.finish(run_id, |run| {
            run.status = RunStatus::Failed;
            run.failure = Some(reason.to_string());
        })?;
        warn!(run_id = %run_id, reason, "Training run failed");
        Ok(run)
    }

    fn finish(&self, run_id: RunId, apply: impl Fn(&mut TrainingRun)) -> Result<TrainingRun> {
        self.transact(|state| {
            let run = state.run_mut(run_id).ok_or(RegistryError::RunNotFound(run_id))?;
            if run.status != RunStatus::Running {
                return Err(RegistryError::RunAlreadyFinished(run_id));
            }
            apply(run);
            run.completed_at = Some(Utc::now());
            Ok((run.clone(), true))
        })
    }

    // =========================================================================
    // Promotion
    // =========================================================================

    /// Compare a completed run against the active one and promote it if the
    /// policy says so.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub fn evaluate_and_promote(&self, run_id: RunId) -> Result<PromotionResult> {
        let family = self.get_run(run_id)?.family;
        let lock = self.family_lock(&family)?;
        let _guard = lock.lock().map_err(|_| RegistryError::LockPoisoned)?;

        let result = self.transact(|state| {
            let candidate = completed(state, run_id)?;
            let active = state.active_run(&family).cloned();
            let reliable_exists = state.completed_runs(&family).any(|r| !r.is_degraded());

            match self.policy.decide(&candidate, active.as_ref(), reliable_exists) {
                Decision::Promote(reason) => {
                    let version = state.activate(
                        run_id,
                        &family,
                        self.policy.snapshot(&candidate),
                        candidate.is_degraded(),
                    );
                    let result = PromotionResult::Promoted {
                        run_id,
                        version,
                        previous: active.map(|a| a.id),
                        reason,
                    };
                    Ok((result, true))
                }
                Decision::Reject(reason) => {
                    let result = PromotionResult::Rejected {
                        run_id,
                        active: active.map(|a| a.id),
                        reason,
                    };
                    Ok((result, false))
                }
            }
        })?;

        log_result(&result);
        Ok(result)
    }

    /// Activate a completed run regardless of metrics.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub fn force_promote(&self, run_id: RunId) -> Result<PromotionResult> {
        let family = self.get_run(run_id)?.family;
        let lock = self.family_lock(&family)?;
        let _guard = lock.lock().map_err(|_| RegistryError::LockPoisoned)?;

        let result = self.transact(|state| {
            let candidate = completed(state, run_id)?;
            let previous = state.active_entry(&family).map(|e| e.run_id);
            if previous == Some(run_id) {
                let result = PromotionResult::Rejected {
                    run_id,
                    active: previous,
                    reason: RejectionReason::AlreadyActive,
                };
                return Ok((result, false));
            }
            let version = state.activate(
                run_id,
                &family,
                self.policy.snapshot(&candidate),
                candidate.is_degraded(),
            );
            Ok((
                PromotionResult::Promoted {
                    run_id,
                    version,
                    previous,
                    reason: PromotionReason::Forced,
                },
                true,
            ))
        })?;

        log_result(&result);
        Ok(result)
    }

    /// Rescan every completed run of `family` and activate the best one.
    ///
    /// Returns `None` when the family has no completed run.
    #[instrument(skip(self))]
    pub fn promote_best(&self, family: &str) -> Result<Option<PromotionResult>> {
        let lock = self.family_lock(family)?;
        let _guard = lock.lock().map_err(|_| RegistryError::LockPoisoned)?;

        let result = self.transact(|state| {
            let Some(best) = state
                .completed_runs(family)
                .max_by(|a, b| self.policy.rank(a, b))
                .cloned()
            else {
                return Ok((None, false));
            };

            let previous = state.active_entry(family).map(|e| e.run_id);
            if previous == Some(best.id) {
                let result = PromotionResult::Rejected {
                    run_id: best.id,
                    active: previous,
                    reason: RejectionReason::AlreadyActive,
                };
                return Ok((Some(result), false));
            }

            let version = state.activate(best.id, family, self.policy.snapshot(&best), best.is_degraded());
            let result = PromotionResult::Promoted {
                run_id: best.id,
                version,
                previous,
                reason: PromotionReason::BestOfHistory,
            };
            Ok((Some(result), true))
        })?;

        if let Some(result) = &result {
            log_result(result);
        }
        Ok(result)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every run, oldest first.
    pub fn list_runs(&self) -> Result<Vec<TrainingRun>> {
        let mut runs = self.store.load()?.runs;
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }

    pub fn get_run(&self, run_id: RunId) -> Result<TrainingRun> {
        self.store
            .load()?
            .run(run_id)
            .cloned()
            .ok_or(RegistryError::RunNotFound(run_id))
    }

    pub fn get_active_run(&self, family: &str) -> Result<Option<TrainingRun>> {
        Ok(self.store.load()?.active_run(family).cloned())
    }

    pub fn active_entry(&self, family: &str) -> Result<Option<ModelRegistryEntry>> {
        Ok(self.store.load()?.active_entry(family).cloned())
    }

    pub fn entries(&self) -> Result<Vec<ModelRegistryEntry>> {
        Ok(self.store.load()?.entries)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn family_lock(&self, family: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.family_locks.lock().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(locks.entry(family.to_string()).or_default().clone())
    }

    /// Load, apply, commit; on a generation conflict start over from a fresh
    /// load. `apply` returns the value and whether the state changed.
    fn transact<T>(&self, mut apply: impl FnMut(&mut RegistryState) -> Result<(T, bool)>) -> Result<T> {
        for attempt in 1..=self.max_retries {
            let mut state = self.store.load()?;
            let expected = state.generation;
            let (value, changed) = apply(&mut state)?;
            if !changed {
                return Ok(value);
            }
            match self.store.commit(expected, state) {
                Ok(_) => return Ok(value),
                Err(RegistryError::PromotionConflict { expected, found }) => {
                    warn!(attempt, expected, found, "Registry commit conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(RegistryError::RetriesExhausted(self.max_retries))
    }
}

fn completed(state: &RegistryState, run_id: RunId) -> Result<TrainingRun> {
    let run = state.run(run_id).ok_or(RegistryError::RunNotFound(run_id))?;
    if !run.is_completed() {
        return Err(RegistryError::RunNotCompleted(run_id));
    }
    Ok(run.clone())
}

fn log_result(result: &PromotionResult) {
    match result {
        PromotionResult::Promoted {
            run_id,
            version,
            previous,
            reason,
        } => info!(
            run_id = %run_id,
            version,
            previous = ?previous.map(|p| p.to_string()),
            reason = %reason,
            "Run promoted"
        ),
        PromotionResult::Rejected { run_id, active, reason } => info!(
            run_id = %run_id,
            active = ?active.map(|a| a.to_string()),
            reason = %reason,
            "Run not promoted"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{TEST_AUC, TEST_PRECISION_AT_10};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn report(primary: f64, secondary: f64, degraded: bool) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        report.metrics.insert(TEST_PRECISION_AT_10.to_string(), primary);
        report.metrics.insert(TEST_AUC.to_string(), secondary);
        report.degraded = degraded.then(|| "train/test overlap".to_string());
        report
    }

    fn completed_run(registry: &ModelRegistry, primary: f64, secondary: f64, degraded: bool) -> RunId {
        let run = registry.start_run(TrainParams::default(), DatasetStats::default()).unwrap();
        registry
            .complete_run(run.id, &report(primary, secondary, degraded), DatasetStats::default(), PathBuf::from("a.json"))
            .unwrap();
        run.id
    }

    fn active(registry: &ModelRegistry) -> Option<RunId> {
        registry.get_active_run("default").unwrap().map(|r| r.id)
    }

    #[test]
    fn test_better_run_replaces_active() {
        let registry = ModelRegistry::in_memory();
        let a = completed_run(&registry, 0.30, 0.5, false);
        let b = completed_run(&registry, 0.35, 0.5, false);

        assert!(registry.evaluate_and_promote(a).unwrap().is_promoted());
        let result = registry.evaluate_and_promote(b).unwrap();
        assert!(matches!(
            result,
            PromotionResult::Promoted { version: 2, previous: Some(p), .. } if p == a
        ));
        assert_eq!(active(&registry), Some(b));
        assert_eq!(registry.entries().unwrap().iter().filter(|e| e.is_active).count(), 1);
    }

    #[test]
    fn test_increasing_metrics_end_on_maximum() {
        let registry = ModelRegistry::in_memory();
        let mut last = None;
        for value in [0.1, 0.2, 0.3, 0.4] {
            let id = completed_run(&registry, value, 0.5, false);
            assert!(registry.evaluate_and_promote(id).unwrap().is_promoted());
            last = Some(id);
        }
        assert_eq!(active(&registry), last);

        let worse = completed_run(&registry, 0.05, 0.99, false);
        assert!(!registry.evaluate_and_promote(worse).unwrap().is_promoted());
        assert_eq!(active(&registry), last);
    }

    #[test]
    fn test_degraded_run_rejected_against_reliable_active() {
        let registry = ModelRegistry::in_memory();
        let a = completed_run(&registry, 0.30, 0.5, false);
        let c = completed_run(&registry, 0.40, 0.5, true);

        registry.evaluate_and_promote(a).unwrap();
        let result = registry.evaluate_and_promote(c).unwrap();
        assert!(matches!(
            result,
            PromotionResult::Rejected { reason: RejectionReason::DegradedDominated, .. }
        ));
        assert_eq!(active(&registry), Some(a));
    }

    #[test]
    fn test_promoting_unfinished_run_fails() {
        let registry = ModelRegistry::in_memory();
        let run = registry.start_run(TrainParams::default(), DatasetStats::default()).unwrap();
        assert!(matches!(
            registry.evaluate_and_promote(run.id),
            Err(RegistryError::RunNotCompleted(_))
        ));

        registry.fail_run(run.id, "boom").unwrap();
        assert!(matches!(
            registry.fail_run(run.id, "again"),
            Err(RegistryError::RunAlreadyFinished(_))
        ));
        assert!(active(&registry).is_none());
    }

    #[test]
    fn test_force_promote_overrides_metrics() {
        let registry = ModelRegistry::in_memory();
        let good = completed_run(&registry, 0.9, 0.9, false);
        let bad = completed_run(&registry, 0.1, 0.1, false);
        registry.evaluate_and_promote(good).unwrap();

        let result = registry.force_promote(bad).unwrap();
        assert!(matches!(result, PromotionResult::Promoted { reason: PromotionReason::Forced, .. }));
        assert_eq!(active(&registry), Some(bad));

        let again = registry.force_promote(bad).unwrap();
        assert!(!again.is_promoted());
    }

    #[test]
    fn test_promote_best_rescans_history() {
        let registry = ModelRegistry::in_memory();
        let low = completed_run(&registry, 0.2, 0.5, false);
        let high = completed_run(&registry, 0.6, 0.5, false);
        let _flagged = completed_run(&registry, 0.9, 0.9, true);
        registry.force_promote(low).unwrap();

        let result = registry.promote_best("default").unwrap().unwrap();
        assert_eq!(result.run_id(), high);
        assert_eq!(active(&registry), Some(high));

        assert!(registry.promote_best("other-family").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_promotions_pick_the_better_run() {
        let registry = Arc::new(ModelRegistry::in_memory());
        let a = completed_run(&registry, 0.30, 0.5, false);
        let b = completed_run(&registry, 0.35, 0.5, false);

        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|id| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.evaluate_and_promote(id).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(active(&registry), Some(b));
        assert_eq!(registry.entries().unwrap().iter().filter(|e| e.is_active).count(), 1);
    }

    /// Bumps the generation behind the registry's back on the first commit.
    struct InterferingStore {
        inner: InMemoryStore,
        tripped: AtomicBool,
    }

    impl RegistryStore for InterferingStore {
        fn load(&self) -> Result<RegistryState> {
            self.inner.load()
        }

        fn commit(&self, expected: u64, state: RegistryState) -> Result<u64> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                let current = self.inner.load()?;
                self.inner.commit(current.generation, current)?;
            }
            self.inner.commit(expected, state)
        }
    }

    #[test]
    fn test_conflicting_commit_is_retried() {
        let store = Arc::new(InterferingStore {
            inner: InMemoryStore::new(),
            tripped: AtomicBool::new(false),
        });
        let registry = ModelRegistry::new(store.clone());

        let run = registry.start_run(TrainParams::default(), DatasetStats::default()).unwrap();
        assert!(store.load().unwrap().run(run.id).is_some());
        // one interfering commit plus the retried one
        assert_eq!(store.load().unwrap().generation, 2);
    }

    #[test]
    fn test_persistent_registry_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let registry = ModelRegistry::open(dir.path()).unwrap();
            let id = completed_run(&registry, 0.3, 0.5, false);
            registry.evaluate_and_promote(id).unwrap();
            id
        };

        let reopened = ModelRegistry::open(dir.path()).unwrap();
        assert_eq!(active(&reopened), Some(id));
        assert_eq!(reopened.list_runs().unwrap().len(), 1);
    }
}
