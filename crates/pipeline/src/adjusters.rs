//! Concrete context adjusters: opening hours and distance.

use crate::context::RequestContext;
use crate::traits::ContextAdjuster;
use data_loader::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Daily opening window; `open > close` means it spans midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub open: u8,
    pub close: u8,
    /// Days it opens (0 = Monday); empty means every day
    pub days: Vec<u8>,
}

impl OpeningHours {
    pub fn daily(open: u8, close: u8) -> Self {
        Self {
            open,
            close,
            days: Vec::new(),
        }
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    pub fn is_open(&self, hour: u8, weekday: Option<u8>) -> bool {
        if let Some(day) = weekday
            && !self.days.is_empty()
            && !self.days.contains(&day)
        {
            return false;
        }
        if self.open <= self.close {
            (self.open..self.close).contains(&hour)
        } else {
            hour >= self.open || hour < self.close
        }
    }
}

/// Scales down items that are closed at the request time.
pub struct OpeningHoursAdjuster {
    hours: HashMap<ItemId, OpeningHours>,
    closed_factor: f32,
}

impl OpeningHoursAdjuster {
    pub fn new(hours: HashMap<ItemId, OpeningHours>) -> Self {
        Self {
            hours,
            closed_factor: 0.5,
        }
    }

    /// Multiplier for closed items (default: 0.5)
    pub fn with_closed_factor(mut self, factor: f32) -> Self {
        self.closed_factor = factor.clamp(0.0, 1.0);
        self
    }
}

impl ContextAdjuster for OpeningHoursAdjuster {
    fn name(&self) -> &str {
        "OpeningHoursAdjuster"
    }

    fn adjust(&self, item_id: ItemId, score: f32, context: &RequestContext) -> f32 {
        let (Some(hour), Some(hours)) = (context.hour, self.hours.get(&item_id)) else {
            return score;
        };
        if hours.is_open(hour, context.weekday) {
            score
        } else {
            score * self.closed_factor
        }
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let a = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Halves an item's score every `half_distance_km` away from the user.
pub struct DistanceAdjuster {
    locations: HashMap<ItemId, (f64, f64)>,
    half_distance_km: f64,
}

impl DistanceAdjuster {
    pub fn new(locations: HashMap<ItemId, (f64, f64)>) -> Self {
        Self {
            locations,
            half_distance_km: 5.0,
        }
    }

    /// Distance at which the score is halved (default: 5 km)
    pub fn with_half_distance_km(mut self, km: f64) -> Self {
        self.half_distance_km = km.max(f64::EPSILON);
        self
    }
}

impl ContextAdjuster for DistanceAdjuster {
    fn name(&self) -> &str {
        "DistanceAdjuster"
    }

    fn adjust(&self, item_id: ItemId, score: f32, context: &RequestContext) -> f32 {
        let (Some(user), Some(&item)) = (context.location(), self.locations.get(&item_id)) else {
            return score;
        };
        let distance = haversine_km(user, item);
        let decay = 0.5f64.powf(distance / self.half_distance_km);
        score * decay as f32
    }
}
