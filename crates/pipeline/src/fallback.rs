//! An ordered list of strategies, tried until one answers.

use crate::error::{PipelineError, Result};
use crate::ranking::ScoredItem;
use crate::traits::{FallbackReason, Strategy};
use tracing::{debug, info};

/// Result of running a chain: which strategy answered and who was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub strategy: String,
    pub items: Vec<ScoredItem>,
    pub skipped: Vec<(String, FallbackReason)>,
}

impl ChainOutcome {
    pub fn fell_back(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Strategies in fallback order.
///
/// ## Usage
/// ```ignore
/// let chain = FallbackChain::new()
///     .add_strategy(WarmStrategy::new(slot.clone()))
///     .add_strategy(FeatureOverlapStrategy::new(store.clone()))
///     .add_strategy(PopularityStrategy::new(store.clone(), 2));
///
/// let outcome = chain.run(&request)?;
/// ```
pub struct FallbackChain<R> {
    strategies: Vec<Box<dyn Strategy<R>>>,
}

impl<R> FallbackChain<R> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy (builder pattern). Earlier strategies win.
    pub fn add_strategy(mut self, strategy: impl Strategy<R> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy in order; an empty answer counts as a fallback.
    pub fn run(&self, request: &R) -> Result<ChainOutcome> {
        let mut skipped = Vec::new();
        for strategy in &self.strategies {
            match strategy.try_predict(request) {
                Ok(items) if !items.is_empty() => {
                    if !skipped.is_empty() {
                        info!(
                            strategy = strategy.name(),
                            skipped = skipped.len(),
                            "Answered by fallback strategy"
                        );
                    }
                    return Ok(ChainOutcome {
                        strategy: strategy.name().to_string(),
                        items,
                        skipped,
                    });
                }
                Ok(_) => {
                    debug!(strategy = strategy.name(), "Strategy returned nothing");
                    skipped.push((
                        strategy.name().to_string(),
                        FallbackReason::NoSignal("empty result".to_string()),
                    ));
                }
                Err(reason) => {
                    debug!(strategy = strategy.name(), reason = %reason, "Falling back");
                    skipped.push((strategy.name().to_string(), reason));
                }
            }
        }
        Err(PipelineError::Exhausted { skipped })
    }
}

impl<R> Default for FallbackChain<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, std::result::Result<Vec<ScoredItem>, FallbackReason>);

    impl Strategy<u32> for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn try_predict(&self, _request: &u32) -> std::result::Result<Vec<ScoredItem>, FallbackReason> {
            self.1.clone()
        }
    }

    #[test]
    fn test_first_answer_wins() {
        let chain = FallbackChain::new()
            .add_strategy(Fixed("a", Ok(vec![ScoredItem::new(1, 1.0)])))
            .add_strategy(Fixed("b", Ok(vec![ScoredItem::new(2, 1.0)])));

        let outcome = chain.run(&7).unwrap();
        assert_eq!(outcome.strategy, "a");
        assert!(!outcome.fell_back());
    }

    #[test]
    fn test_errors_and_empty_results_fall_through() {
        let chain = FallbackChain::new()
            .add_strategy(Fixed("warm", Err(FallbackReason::UnknownEntity("user 7".into()))))
            .add_strategy(Fixed("overlap", Ok(Vec::new())))
            .add_strategy(Fixed("popular", Ok(vec![ScoredItem::new(3, 4.5)])));

        let outcome = chain.run(&7).unwrap();
        assert_eq!(outcome.strategy, "popular");
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.skipped[0].0, "warm");
        assert_eq!(chain.names(), vec!["warm", "overlap", "popular"]);
    }

    #[test]
    fn test_exhausted_chain() {
        let chain = FallbackChain::new().add_strategy(Fixed("only", Err(FallbackReason::NoModel)));
        assert!(matches!(
            chain.run(&1),
            Err(PipelineError::Exhausted { ref skipped }) if skipped.len() == 1
        ));
    }
}
