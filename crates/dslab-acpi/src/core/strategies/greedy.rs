//! Greedy strategy.

use std::collections::BTreeMap;

use crate::core::host::Host;
use crate::core::strategy::{SleepStrategy, TierChange, TimeframeSnapshot};

/// Hosts sleep in their energy-saving tier as soon as they are idle and are never moved to other tiers.
#[derive(Default)]
pub struct GreedyStrategy;

impl GreedyStrategy {
    pub fn new() -> Self {
        Self {}
    }
}

impl SleepStrategy for GreedyStrategy {
    fn name(&self) -> &str {
        "greedy"
    }

    fn on_timeframe(&mut self, _snapshot: &TimeframeSnapshot, _hosts: &BTreeMap<u32, Host>) -> Vec<TierChange> {
        Vec::new()
    }

    fn next_decision_time(&self, _time: f64, _hosts: &BTreeMap<u32, Host>) -> Option<f64> {
        None
    }
}
