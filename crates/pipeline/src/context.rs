//! Request context and contextual re-ranking.

use crate::ranking::{ScoredItem, rank};
use crate::traits::ContextAdjuster;
use data_loader::ItemId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where and when a request is made. Every signal is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Hour of day, 0-23
    pub hour: Option<u8>,
    /// Day of week, 0 = Monday
    pub weekday: Option<u8>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time(mut self, hour: u8, weekday: u8) -> Self {
        self.hour = Some(hour % 24);
        self.weekday = Some(weekday % 7);
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn location(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Leaves every score unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityAdjuster;

impl ContextAdjuster for IdentityAdjuster {
    fn name(&self) -> &str {
        "IdentityAdjuster"
    }

    fn adjust(&self, _item_id: ItemId, score: f32, _context: &RequestContext) -> f32 {
        score
    }
}

/// Adjusters applied in sequence, each seeing the previous one's output.
///
/// An empty chain is the identity.
#[derive(Default)]
pub struct ContextReranker {
    adjusters: Vec<Box<dyn ContextAdjuster>>,
}

impl ContextReranker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_adjuster(mut self, adjuster: impl ContextAdjuster + 'static) -> Self {
        self.adjusters.push(Box::new(adjuster));
        self
    }

    pub fn is_identity(&self) -> bool {
        self.adjusters.is_empty()
    }

    pub fn score(&self, item_id: ItemId, base: f32, context: &RequestContext) -> f32 {
        self.adjusters
            .iter()
            .fold(base, |score, adjuster| adjuster.adjust(item_id, score, context))
    }

    /// Re-score `items` under `context` and re-sort.
    pub fn rerank(&self, items: Vec<ScoredItem>, context: &RequestContext) -> Vec<ScoredItem> {
        if self.is_identity() {
            return items;
        }
        let adjusted = items
            .into_iter()
            .map(|item| ScoredItem::new(item.item_id, self.score(item.item_id, item.score, context)))
            .collect();
        let ranked = rank(adjusted);
        debug!(adjusters = self.adjusters.len(), "Contextual re-rank applied");
        ranked
    }
}
