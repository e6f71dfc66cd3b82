//! Timeout strategy.

use std::collections::BTreeMap;

use crate::core::host::Host;
use crate::core::sleep_state::SleepPhase;
use crate::core::strategy::{SleepStrategy, TierChange, TimeframeSnapshot};

/// Moves a host to the next deeper tier once it has stayed in its current tier for `dwell_threshold` seconds.
///
/// The host stays active for `reentry_wait` seconds (or its own override) between leaving the current tier
/// and entering the deeper one.
pub struct TimeoutStrategy {
    dwell_threshold: f64,
    reentry_wait: f64,
    reentry_wait_overrides: BTreeMap<u32, f64>,
}

impl TimeoutStrategy {
    pub fn new(dwell_threshold: f64, reentry_wait: f64, reentry_wait_overrides: BTreeMap<u32, f64>) -> Self {
        Self {
            dwell_threshold,
            reentry_wait,
            reentry_wait_overrides,
        }
    }

    pub fn reentry_wait(&self, host_id: u32) -> f64 {
        self.reentry_wait_overrides
            .get(&host_id)
            .copied()
            .unwrap_or(self.reentry_wait)
    }

    /// Hosts which can be moved deeper, with their deeper tier.
    fn candidates<'a>(&self, hosts: &'a BTreeMap<u32, Host>) -> impl Iterator<Item = (&'a Host, &'a str)> {
        hosts.values().filter_map(|host| {
            if !host.sleep.state().is(SleepPhase::Staying) || host.sleep.is_state_changing() {
                return None;
            }
            let tier = host.sleep.state().tier()?;
            host.sleep.next_deeper_tier(tier).map(|deeper| (host, deeper))
        })
    }
}

impl SleepStrategy for TimeoutStrategy {
    fn name(&self) -> &str {
        "timeout"
    }

    fn on_timeframe(&mut self, _snapshot: &TimeframeSnapshot, hosts: &BTreeMap<u32, Host>) -> Vec<TierChange> {
        self.candidates(hosts)
            .filter(|(host, _)| host.sleep.staying_time() + 1e-9 >= self.dwell_threshold)
            .map(|(host, deeper)| TierChange {
                host_id: host.id,
                target_tier: deeper.to_string(),
                wait: self.reentry_wait(host.id),
            })
            .collect()
    }

    fn next_decision_time(&self, time: f64, hosts: &BTreeMap<u32, Host>) -> Option<f64> {
        self.candidates(hosts)
            .map(|(host, _)| time + (self.dwell_threshold - host.sleep.staying_time()).max(0.))
            .min_by(|a, b| a.total_cmp(b))
    }
}
