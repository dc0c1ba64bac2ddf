//! Promotion policy: which of two runs should serve.
//!
//! The policy is a pure function of the candidate, the current active run and
//! whether any reliable (non-degraded) run exists in the family, so it can be
//! re-evaluated against fresh state whenever a commit has to be retried.

use crate::types::{MetricSnapshot, RunId, TrainingRun};
use models::{TEST_AUC, TEST_PRECISION_AT_10};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionPolicy {
    pub primary_metric: String,
    /// Used only to break exact ties on the primary metric
    pub secondary_metric: Option<String>,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            primary_metric: TEST_PRECISION_AT_10.to_string(),
            secondary_metric: Some(TEST_AUC.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromotionReason {
    /// No active run existed
    Bootstrap,
    PrimaryImproved { candidate: f64, active: f64 },
    TieBrokenBySecondary { candidate: f64, active: f64 },
    /// A reliable run replaces a degraded active one
    ReplacesDegraded,
    /// Manual override
    Forced,
    /// Best completed run after a full rescan
    BestOfHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    PrimaryNotBetter { candidate: f64, active: f64 },
    TieNotBroken,
    /// Degraded runs lose to any reliable run
    DegradedDominated,
    AlreadyActive,
}

impl fmt::Display for PromotionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionReason::Bootstrap => write!(f, "no active model"),
            PromotionReason::PrimaryImproved { candidate, active } => {
                write!(f, "primary metric improved ({:.4} > {:.4})", candidate, active)
            }
            PromotionReason::TieBrokenBySecondary { candidate, active } => {
                write!(f, "tie broken by secondary metric ({:.4} > {:.4})", candidate, active)
            }
            PromotionReason::ReplacesDegraded => write!(f, "replaces a degraded active model"),
            PromotionReason::Forced => write!(f, "forced"),
            PromotionReason::BestOfHistory => write!(f, "best completed run"),
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::PrimaryNotBetter { candidate, active } => {
                write!(f, "primary metric not better ({:.4} <= {:.4})", candidate, active)
            }
            RejectionReason::TieNotBroken => write!(f, "primary metric tied, secondary not better"),
            RejectionReason::DegradedDominated => {
                write!(f, "degraded evaluation while a reliable run exists")
            }
            RejectionReason::AlreadyActive => write!(f, "already active"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Promote(PromotionReason),
    Reject(RejectionReason),
}

/// Outcome of a promotion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotionResult {
    Promoted {
        run_id: RunId,
        version: u32,
        previous: Option<RunId>,
        reason: PromotionReason,
    },
    Rejected {
        run_id: RunId,
        active: Option<RunId>,
        reason: RejectionReason,
    },
}

impl PromotionResult {
    pub fn is_promoted(&self) -> bool {
        matches!(self, PromotionResult::Promoted { .. })
    }

    pub fn run_id(&self) -> RunId {
        match self {
            PromotionResult::Promoted { run_id, .. } | PromotionResult::Rejected { run_id, .. } => *run_id,
        }
    }
}

impl PromotionPolicy {
    pub fn new(primary_metric: impl Into<String>) -> Self {
        Self {
            primary_metric: primary_metric.into(),
            secondary_metric: None,
        }
    }

    pub fn with_secondary(mut self, metric: impl Into<String>) -> Self {
        self.secondary_metric = Some(metric.into());
        self
    }

    pub fn without_secondary(mut self) -> Self {
        self.secondary_metric = None;
        self
    }

    /// Primary value of a run; a missing metric counts as zero.
    pub fn primary(&self, run: &TrainingRun) -> f64 {
        run.metric(&self.primary_metric).unwrap_or(0.0)
    }

    pub fn secondary(&self, run: &TrainingRun) -> Option<f64> {
        self.secondary_metric
            .as_deref()
            .map(|name| run.metric(name).unwrap_or(0.0))
    }

    pub fn snapshot(&self, run: &TrainingRun) -> MetricSnapshot {
        MetricSnapshot {
            primary_metric: self.primary_metric.clone(),
            primary_value: self.primary(run),
            secondary_metric: self.secondary_metric.clone(),
            secondary_value: self.secondary(run),
        }
    }

    /// Compare `candidate` against the active run.
    ///
    /// `reliable_exists` is whether any completed, non-degraded run exists in
    /// the family; a degraded candidate is only eligible when none does.
    pub fn decide(&self, candidate: &TrainingRun, active: Option<&TrainingRun>, reliable_exists: bool) -> Decision {
        if candidate.is_degraded() && reliable_exists {
            return Decision::Reject(RejectionReason::DegradedDominated);
        }
        let Some(active) = active else {
            return Decision::Promote(PromotionReason::Bootstrap);
        };
        if active.id == candidate.id {
            return Decision::Reject(RejectionReason::AlreadyActive);
        }
        if active.is_degraded() && !candidate.is_degraded() {
            return Decision::Promote(PromotionReason::ReplacesDegraded);
        }

        let (c, a) = (self.primary(candidate), self.primary(active));
        match c.total_cmp(&a) {
            Ordering::Greater => Decision::Promote(PromotionReason::PrimaryImproved { candidate: c, active: a }),
            Ordering::Less => Decision::Reject(RejectionReason::PrimaryNotBetter { candidate: c, active: a }),
            Ordering::Equal => match (self.secondary(candidate), self.secondary(active)) {
                (Some(c), Some(a)) if c > a => {
                    Decision::Promote(PromotionReason::TieBrokenBySecondary { candidate: c, active: a })
                }
                _ => Decision::Reject(RejectionReason::TieNotBroken),
            },
        }
    }

    /// Total order used when rescanning history: reliable before degraded,
    /// then primary, then secondary, then the older run.
    pub fn rank(&self, a: &TrainingRun, b: &TrainingRun) -> Ordering {
        b.is_degraded()
            .cmp(&a.is_degraded())
            .then_with(|| self.primary(a).total_cmp(&self.primary(b)))
            .then_with(|| {
                let sa = self.secondary(a).unwrap_or(0.0);
                let sb = self.secondary(b).unwrap_or(0.0);
                sa.total_cmp(&sb)
            })
            .then_with(|| b.created_at.cmp(&a.created_at))
    }
}
