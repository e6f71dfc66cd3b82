//! Energy-saving strategies of the datacenter controller.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::config::StrategyConfig;
use crate::core::host::Host;
use crate::core::sleep_state::{PowerState, SleepPhase};
use crate::core::strategies::adaptive::{AdaptiveStrategy, Quotas};
use crate::core::strategies::greedy::GreedyStrategy;
use crate::core::strategies::timeout::TimeoutStrategy;

/// Number of hosts in each power state.
///
/// `active` and `tiers` hold stable hosts only, transient ones are counted in `leaving` and `changing`,
/// so the buckets add up to the host count.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct PopulationCounts {
    pub active: usize,
    /// Hosts entering or staying in each tier.
    pub tiers: BTreeMap<String, usize>,
    /// Hosts leaving a tier outside of a tier change.
    pub leaving: usize,
    /// Hosts in the middle of a tier change, either leaving the old tier or active before entering the new one.
    pub changing: usize,
}

impl PopulationCounts {
    pub fn count(hosts: &BTreeMap<u32, Host>) -> Self {
        let mut counts = Self::default();
        for host in hosts.values() {
            let changing = host.sleep.is_state_changing();
            match host.sleep.state() {
                PowerState::Active if changing => counts.changing += 1,
                PowerState::Active => counts.active += 1,
                PowerState::Sleeping {
                    phase: SleepPhase::Leaving,
                    ..
                } => {
                    if changing {
                        counts.changing += 1;
                    } else {
                        counts.leaving += 1;
                    }
                }
                PowerState::Sleeping { tier, .. } => {
                    *counts.tiers.entry(tier.clone()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Total number of counted hosts.
    pub fn total(&self) -> usize {
        self.active + self.tiers.values().sum::<usize>() + self.leaving + self.changing
    }

    pub fn tier(&self, tier: &str) -> usize {
        self.tiers.get(tier).copied().unwrap_or(0)
    }
}

/// State of the datacenter at the end of a processed timeframe.
#[derive(Serialize, Clone, Debug)]
pub struct TimeframeSnapshot {
    pub time: f64,
    /// Length of the processed timeframe.
    pub time_diff: f64,
    pub host_count: usize,
    pub population: PopulationCounts,
    /// Aggregate performance metric of unfinished cloudlets.
    pub performance_metric: f64,
}

/// Request to move a staying host into another tier.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TierChange {
    pub host_id: u32,
    pub target_tier: String,
    /// Time the host stays active before entering the target tier.
    pub wait: f64,
}

/// Trait for implementation of strategies deciding sleep-tier changes.
///
/// Idle hosts go to their energy-saving tier and are woken up by the allocation policy regardless of the strategy,
/// strategies only move staying hosts between tiers.
pub trait SleepStrategy {
    fn name(&self) -> &str;

    /// Called once per processed timeframe, returns tier changes to start.
    fn on_timeframe(&mut self, snapshot: &TimeframeSnapshot, hosts: &BTreeMap<u32, Host>) -> Vec<TierChange>;

    /// Returns the time at which the strategy wants to be called again even if nothing else happens.
    fn next_decision_time(&self, time: f64, hosts: &BTreeMap<u32, Host>) -> Option<f64>;

    /// Current tier quotas if the strategy maintains them.
    fn quotas(&self) -> Option<Quotas> {
        None
    }
}

pub fn strategy_resolver(config: &StrategyConfig) -> Box<dyn SleepStrategy> {
    match config {
        StrategyConfig::Adaptive {
            check_interval,
            shallow_tier,
            deep_tier,
        } => Box::new(AdaptiveStrategy::new(
            *check_interval,
            shallow_tier.clone(),
            deep_tier.clone(),
        )),
        StrategyConfig::Greedy => Box::new(GreedyStrategy::new()),
        StrategyConfig::Timeout {
            dwell_threshold,
            reentry_wait,
            reentry_wait_overrides,
        } => Box::new(TimeoutStrategy::new(
            *dwell_threshold,
            *reentry_wait,
            reentry_wait_overrides.clone(),
        )),
    }
}
