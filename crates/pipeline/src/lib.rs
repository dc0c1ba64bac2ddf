//! Serving-side building blocks shared by every prediction path.
//!
//! This crate provides:
//! - `ScoredItem` and the deterministic ranking order
//! - `Strategy` and `FallbackChain` for declared fallback order
//! - `ContextAdjuster`, `ContextReranker` and concrete adjusters
//! - `Diversifier` for request-level epsilon-greedy exploration
//!
//! ## Architecture
//! A request flows through the stages:
//! 1. The fallback chain picks the first strategy that answers
//! 2. Optionally, the diversifier swaps the answer for an exploration sample
//! 3. Optionally, the reranker re-scores candidates under the request context
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{ContextReranker, Diversifier, FallbackChain, RequestContext};
//! use pipeline::adjusters::OpeningHoursAdjuster;
//!
//! let chain = FallbackChain::new()
//!     .add_strategy(warm)
//!     .add_strategy(popularity);
//! let outcome = chain.run(&request)?;
//!
//! let reranker = ContextReranker::new().add_adjuster(OpeningHoursAdjuster::new(hours));
//! let ranked = reranker.rerank(outcome.items, &RequestContext::new().with_time(20, 4));
//! ```

pub mod adjusters;
pub mod context;
pub mod diversify;
pub mod error;
pub mod fallback;
pub mod ranking;
pub mod traits;

// Re-export main types
pub use adjusters::{DistanceAdjuster, OpeningHours, OpeningHoursAdjuster, haversine_km};
pub use context::{ContextReranker, IdentityAdjuster, RequestContext};
pub use diversify::{DEFAULT_EXPLORATION_RATE, Diversifier, Draw, NEUTRAL_SCORE};
pub use error::{PipelineError, Result};
pub use fallback::{ChainOutcome, FallbackChain};
pub use ranking::{ScoredItem, rank, ranking_order, top_k};
pub use traits::{ContextAdjuster, FallbackReason, Strategy};
