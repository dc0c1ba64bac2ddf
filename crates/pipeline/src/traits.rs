//! Core traits of the serving pipeline.
//!
//! A `Strategy` produces a ranked list or explains why it cannot; a
//! `ContextAdjuster` rewrites one score given the request context.

use crate::context::RequestContext;
use crate::ranking::ScoredItem;
use data_loader::ItemId;
use std::fmt;

/// Why a strategy produced nothing, so the next one should be tried.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// The requested entity is not known to this strategy
    UnknownEntity(String),
    /// No model is loaded
    NoModel,
    /// The strategy ran but had nothing to say (no features, no overlap)
    NoSignal(String),
    /// The strategy failed for another reason
    Failed(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::UnknownEntity(what) => write!(f, "unknown entity: {}", what),
            FallbackReason::NoModel => write!(f, "no active model"),
            FallbackReason::NoSignal(why) => write!(f, "no signal: {}", why),
            FallbackReason::Failed(why) => write!(f, "failed: {}", why),
        }
    }
}

/// One way of answering a prediction request.
///
/// `R` is the request type, so the same chain machinery serves users,
/// items or anything else.
pub trait Strategy<R>: Send + Sync {
    /// Returns the name of this strategy (for logging/debugging)
    fn name(&self) -> &str;

    fn try_predict(&self, request: &R) -> Result<Vec<ScoredItem>, FallbackReason>;
}

/// A pluggable context signal applied to each candidate's score.
pub trait ContextAdjuster: Send + Sync {
    fn name(&self) -> &str;

    fn adjust(&self, item_id: ItemId, score: f32, context: &RequestContext) -> f32;
}
