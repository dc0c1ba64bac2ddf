//! Offline ranking metrics on a held-out split.

use crate::error::Result;
use crate::model::Recommender;
use dataset::{InteractionMatrix, overlap};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, instrument, warn};

pub const TEST_PRECISION_AT_10: &str = "test_precision_at_10";
pub const TEST_AUC: &str = "test_auc";
pub const EVALUATION_WARNING: &str = "evaluation_warning";

/// Metric values keyed by name, e.g. `test_precision_at_10`.
pub type Metrics = BTreeMap<String, f64>;

/// Outcome of evaluating one fitted model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: Metrics,
    /// Set when the numbers are unreliable; the run is still usable.
    pub degraded: Option<String>,
}

impl EvaluationReport {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Computes precision/recall@k, AUC, MRR and F1@k.
#[derive(Debug, Clone)]
pub struct Evaluator {
    precision_ks: Vec<usize>,
    recall_ks: Vec<usize>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            precision_ks: vec![5, 10, 20],
            recall_ks: vec![5, 10],
        }
    }
}

/// Per-user ranking statistics before averaging.
#[derive(Debug, Default)]
struct UserScores {
    precision: Vec<f64>,
    recall: Vec<f64>,
    auc: Option<f64>,
    reciprocal_rank: f64,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_precision_ks(mut self, ks: Vec<usize>) -> Self {
        self.precision_ks = ks;
        self
    }

    pub fn with_recall_ks(mut self, ks: Vec<usize>) -> Self {
        self.recall_ks = ks;
        self
    }

    /// Evaluate `model` on `test`, excluding `train` items from each ranking.
    ///
    /// When the two splits share a pair, excluding train items would also hide
    /// test positives, so ranking falls back to the full catalog and the report
    /// is marked degraded.
    #[instrument(skip_all, fields(train = train.nnz(), test = test.nnz()))]
    pub fn evaluate<R>(&self, model: &R, train: &InteractionMatrix, test: &InteractionMatrix) -> Result<EvaluationReport>
    where
        R: Recommender + Sync + ?Sized,
    {
        let mut report = EvaluationReport::default();

        let train_eval = Evaluator {
            precision_ks: vec![10],
            recall_ks: Vec::new(),
        };
        let train_scores = train_eval.score_users(model, train, None)?;
        report.metrics.insert("train_precision_at_10".to_string(), mean_slot(&train_scores, |s| s.precision[0]));
        report.metrics.insert("train_auc".to_string(), mean_auc(&train_scores));
        report.metrics.insert("train_mrr".to_string(), mean_rr(&train_scores));

        if test.nnz() == 0 {
            warn!("Empty test split, skipping held-out metrics");
            report.degraded = Some("empty test split".to_string());
            return Ok(report);
        }

        let shared = overlap(train, test);
        let exclude = if shared > 0 {
            warn!(shared, "Train/test overlap detected, ranking without exclusion");
            report.degraded = Some(format!("{} pairs present in both train and test", shared));
            report.metrics.insert(EVALUATION_WARNING.to_string(), 1.0);
            None
        } else {
            Some(train)
        };

        let test_scores = self.score_users(model, test, exclude)?;
        for (slot, &k) in self.precision_ks.iter().enumerate() {
            report.metrics.insert(format!("test_precision_at_{}", k), mean_slot(&test_scores, |s| s.precision[slot]));
        }
        for (slot, &k) in self.recall_ks.iter().enumerate() {
            report.metrics.insert(format!("test_recall_at_{}", k), mean_slot(&test_scores, |s| s.recall[slot]));
        }
        report.metrics.insert(TEST_AUC.to_string(), mean_auc(&test_scores));
        report.metrics.insert("test_mrr".to_string(), mean_rr(&test_scores));

        for k in self.recall_ks.iter().filter(|k| self.precision_ks.contains(k)) {
            let p = report.metrics[&format!("test_precision_at_{}", k)];
            let r = report.metrics[&format!("test_recall_at_{}", k)];
            if p > 0.0 && r > 0.0 {
                report.metrics.insert(format!("test_f1_at_{}", k), 2.0 * p * r / (p + r));
            }
        }

        info!(
            precision_at_10 = report.metric(TEST_PRECISION_AT_10),
            auc = report.metric(TEST_AUC),
            degraded = report.is_degraded(),
            "Evaluation finished"
        );
        Ok(report)
    }

    fn score_users<R>(
        &self,
        model: &R,
        positives: &InteractionMatrix,
        exclude: Option<&InteractionMatrix>,
    ) -> Result<Vec<UserScores>>
    where
        R: Recommender + Sync + ?Sized,
    {
        let users: Vec<usize> = positives
            .active_users()
            .filter(|&u| u < model.num_users())
            .collect();

        users
            .par_iter()
            .map(|&user| {
                let scores = model.score_all(user)?;
                let excluded: HashSet<usize> = exclude
                    .map(|m| m.user_items(user).iter().map(|&(i, _)| i).collect())
                    .unwrap_or_default();
                let relevant: HashSet<usize> = positives.user_items(user).iter().map(|&(i, _)| i).collect();
                Ok(self.user_scores(&scores, &relevant, &excluded))
            })
            .collect()
    }

    fn user_scores(&self, scores: &[f32], relevant: &HashSet<usize>, excluded: &HashSet<usize>) -> UserScores {
        let mut ranking: Vec<usize> = (0..scores.len()).filter(|i| !excluded.contains(i)).collect();
        ranking.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

        let hits_at = |k: usize| ranking.iter().take(k).filter(|i| relevant.contains(*i)).count() as f64;

        let precision = self.precision_ks.iter().map(|&k| hits_at(k) / k as f64).collect();
        let recall = self
            .recall_ks
            .iter()
            .map(|&k| hits_at(k) / relevant.len().max(1) as f64)
            .collect();

        let reciprocal_rank = ranking
            .iter()
            .position(|i| relevant.contains(i))
            .map_or(0.0, |pos| 1.0 / (pos + 1) as f64);

        UserScores {
            precision,
            recall,
            auc: auc(scores, &ranking, relevant),
            reciprocal_rank,
        }
    }
}

/// Probability a relevant item outscores an irrelevant one (ties count half).
fn auc(scores: &[f32], candidates: &[usize], relevant: &HashSet<usize>) -> Option<f64> {
    let mut negatives: Vec<f32> = candidates
        .iter()
        .filter(|i| !relevant.contains(*i))
        .map(|&i| scores[i])
        .collect();
    let positives: Vec<f32> = candidates
        .iter()
        .filter(|i| relevant.contains(*i))
        .map(|&i| scores[i])
        .collect();
    if negatives.is_empty() || positives.is_empty() {
        return None;
    }
    negatives.sort_by(|a, b| a.total_cmp(b));

    let wins: f64 = positives
        .iter()
        .map(|&p| {
            let below = negatives.partition_point(|&n| n < p);
            let tied = negatives.partition_point(|&n| n <= p) - below;
            below as f64 + 0.5 * tied as f64
        })
        .sum();
    Some(wins / (positives.len() * negatives.len()) as f64)
}

fn mean_slot(scores: &[UserScores], value: impl Fn(&UserScores) -> f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(value).sum::<f64>() / scores.len() as f64
}

fn mean_auc(scores: &[UserScores]) -> f64 {
    let values: Vec<f64> = scores.iter().filter_map(|s| s.auc).collect();
    if values.is_empty() {
        return 0.5;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn mean_rr(scores: &[UserScores]) -> f64 {
    mean_slot(scores, |s| s.reciprocal_rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;

    /// Same fixed score vector for every user.
    struct Fixed(Vec<f32>, usize);

    impl Recommender for Fixed {
        fn num_users(&self) -> usize {
            self.1
        }

        fn num_items(&self) -> usize {
            self.0.len()
        }

        fn score(&self, _user: usize, items: &[usize]) -> Result<Vec<f32>> {
            Ok(items.iter().map(|&i| self.0[i]).collect())
        }

        fn user_vector(&self, _user: usize) -> Result<Vec<f32>> {
            Err(ModelError::NotTrained)
        }

        fn item_vector(&self, _item: usize) -> Result<Vec<f32>> {
            Err(ModelError::NotTrained)
        }
    }

    #[test]
    fn test_perfect_ranking() {
        // item 0 is trained on, item 1 is the held-out positive and scores highest
        let model = Fixed(vec![0.5, 0.9, 0.1, 0.2], 1);
        let train = InteractionMatrix::from_triples(1, 4, [(0, 0, 5.0)]);
        let test = InteractionMatrix::from_triples(1, 4, [(0, 1, 4.0)]);

        let report = Evaluator::new().evaluate(&model, &train, &test).unwrap();
        assert!(!report.is_degraded());
        assert_eq!(report.metric(TEST_AUC), Some(1.0));
        assert_eq!(report.metric("test_mrr"), Some(1.0));
        assert_eq!(report.metric("test_recall_at_5"), Some(1.0));
        assert_eq!(report.metric("test_precision_at_5"), Some(0.2));
        assert_eq!(report.metric(TEST_PRECISION_AT_10), Some(0.1));
        assert!(report.metric("test_f1_at_5").is_some());
        assert!(report.metric(EVALUATION_WARNING).is_none());
    }

    #[test]
    fn test_train_items_excluded_from_ranking() {
        // item 0 outranks the positive but is a training item
        let model = Fixed(vec![0.9, 0.5, 0.1], 1);
        let train = InteractionMatrix::from_triples(1, 3, [(0, 0, 5.0)]);
        let test = InteractionMatrix::from_triples(1, 3, [(0, 1, 4.0)]);

        let report = Evaluator::new().evaluate(&model, &train, &test).unwrap();
        assert_eq!(report.metric("test_mrr"), Some(1.0));
    }

    #[test]
    fn test_worst_ranking_has_no_f1() {
        let model = Fixed(vec![0.9, 0.8, 0.7, 0.0], 1);
        let train = InteractionMatrix::from_triples(1, 4, [(0, 0, 5.0)]);
        let test = InteractionMatrix::from_triples(1, 4, [(0, 3, 4.0)]);

        let report = Evaluator::new()
            .with_precision_ks(vec![1])
            .with_recall_ks(vec![1])
            .evaluate(&model, &train, &test)
            .unwrap();
        assert_eq!(report.metric(TEST_AUC), Some(0.0));
        assert_eq!(report.metric("test_precision_at_1"), Some(0.0));
        assert!(report.metric("test_f1_at_1").is_none());
    }

    #[test]
    fn test_overlap_degrades() {
        let model = Fixed(vec![0.9, 0.5], 1);
        let train = InteractionMatrix::from_triples(1, 2, [(0, 0, 5.0)]);
        let test = InteractionMatrix::from_triples(1, 2, [(0, 0, 5.0)]);

        let report = Evaluator::new().evaluate(&model, &train, &test).unwrap();
        assert!(report.is_degraded());
        assert_eq!(report.metric(EVALUATION_WARNING), Some(1.0));
        // ranked without exclusion, so the shared item is still found first
        assert_eq!(report.metric("test_mrr"), Some(1.0));
    }

    #[test]
    fn test_empty_test_split_degrades() {
        let model = Fixed(vec![0.9, 0.5], 1);
        let train = InteractionMatrix::from_triples(1, 2, [(0, 0, 5.0)]);
        let test = InteractionMatrix::new(1, 2);

        let report = Evaluator::new().evaluate(&model, &train, &test).unwrap();
        assert!(report.is_degraded());
        assert!(report.metric(TEST_PRECISION_AT_10).is_none());
        assert!(report.metric("train_auc").is_some());
    }
}
