//! Epsilon-greedy exploration at request granularity.

use crate::ranking::ScoredItem;
use data_loader::ItemId;
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;

pub const DEFAULT_EXPLORATION_RATE: f64 = 0.1;

/// Score given to items picked by exploration.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Outcome of the coin flip for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Draw {
    /// Answer with these catalog items, drawn uniformly at random
    Explore(Vec<ScoredItem>),
    /// Answer with the ranked list
    Exploit,
}

impl Draw {
    pub fn is_explore(&self) -> bool {
        matches!(self, Draw::Explore(_))
    }
}

/// With probability `exploration_rate` a whole request is answered with
/// uniformly random catalog items; otherwise with the ranked list.
#[derive(Debug, Clone, Copy)]
pub struct Diversifier {
    exploration_rate: f64,
    neutral_score: f32,
}

impl Default for Diversifier {
    fn default() -> Self {
        Self {
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            neutral_score: NEUTRAL_SCORE,
        }
    }
}

impl Diversifier {
    pub fn new(exploration_rate: f64) -> Self {
        Self::default().with_exploration_rate(exploration_rate)
    }

    /// Probability of exploring, clamped to [0, 1]
    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    pub fn with_neutral_score(mut self, score: f32) -> Self {
        self.neutral_score = score;
        self
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    /// Flip the coin once for the request.
    ///
    /// The ranked list is only needed on `Exploit`, so callers rank after
    /// drawing and skip the work when the request explores.
    pub fn draw<G: Rng + ?Sized>(&self, catalog: &[ItemId], k: usize, rng: &mut G) -> Draw {
        if !rng.random_bool(self.exploration_rate) {
            return Draw::Exploit;
        }
        debug!(rate = self.exploration_rate, "Exploring catalog");
        Draw::Explore(
            catalog
                .choose_multiple(rng, k)
                .map(|&item_id| ScoredItem::new(item_id, self.neutral_score))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn test_never_explores_at_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        let catalog: Vec<ItemId> = (0..100).collect();
        let div = Diversifier::new(0.0);
        for _ in 0..100 {
            assert_eq!(div.draw(&catalog, 3, &mut rng), Draw::Exploit);
        }
    }

    #[test]
    fn test_exploration_returns_distinct_neutral_items() {
        let mut rng = StdRng::seed_from_u64(2);
        let catalog: Vec<ItemId> = (100..200).collect();
        let Draw::Explore(items) = Diversifier::new(1.0).draw(&catalog, 5, &mut rng) else {
            panic!("rate 1.0 must explore");
        };

        assert_eq!(items.len(), 5);
        let ids: HashSet<ItemId> = items.iter().map(|s| s.item_id).collect();
        assert_eq!(ids.len(), 5);
        assert!(items.iter().all(|s| s.score == NEUTRAL_SCORE && s.item_id >= 100));
    }

    #[test]
    fn test_exploration_frequency_converges() {
        let mut rng = StdRng::seed_from_u64(42);
        let catalog: Vec<ItemId> = (0..50).collect();
        let div = Diversifier::new(0.3);

        let trials = 10_000;
        let explored = (0..trials)
            .filter(|_| div.draw(&catalog, 5, &mut rng).is_explore())
            .count();
        let rate = explored as f64 / trials as f64;
        assert!((rate - 0.3).abs() < 0.03, "rate = {rate}");
    }

    #[test]
    fn test_small_catalog_explores_what_it_has() {
        let mut rng = StdRng::seed_from_u64(3);
        let draw = Diversifier::new(1.0).draw(&[1, 2], 5, &mut rng);
        assert!(matches!(draw, Draw::Explore(items) if items.len() == 2));
    }

    #[test]
    fn test_rate_is_clamped() {
        assert_eq!(Diversifier::new(3.0).exploration_rate(), 1.0);
        assert_eq!(Diversifier::new(-1.0).exploration_rate(), 0.0);
    }
}
