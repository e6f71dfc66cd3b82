//! Adaptive strategy.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::host::Host;
use crate::core::sleep_state::SleepPhase;
use crate::core::strategy::{SleepStrategy, TierChange, TimeframeSnapshot};

/// Active host count and performance metric observed at the end of a check window.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct WindowRecord {
    pub active: usize,
    pub performance_metric: f64,
}

/// Target number of hosts in the shallow and the deep tier.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Quotas {
    pub lambda: f64,
    pub alpha: f64,
    pub shallow: usize,
    pub deep: usize,
}

/// Computes tier quotas from the active host trend and the performance metric trend.
///
/// Returns `None` if no hosts were active in the previous window.
pub fn compute_quotas(host_count: usize, active: usize, metric: f64, previous: &WindowRecord) -> Option<Quotas> {
    if previous.active == 0 {
        return None;
    }
    let lambda = active as f64 / previous.active as f64;
    let alpha = if metric != 0. {
        ((metric - previous.performance_metric) / metric + lambda).abs()
    } else {
        host_count as f64 * 0.5
    };
    let idle = host_count.saturating_sub(active);
    let shallow = ((active as f64 * alpha).min(idle as f64)).floor().max(0.) as usize;
    let deep = idle - shallow;
    Some(Quotas {
        lambda,
        alpha,
        shallow,
        deep,
    })
}

/// Keeps a mix of hosts in a shallow and a deep tier proportional to the recent load trend.
///
/// Every `check_interval` seconds the strategy recomputes the tier quotas. On every timeframe it moves
/// staying hosts from the deep tier to the shallow one while the shallow quota is unmet, and from the shallow tier
/// to the deep one while the deep quota is unmet and the shallow tier holds more hosts than its quota.
pub struct AdaptiveStrategy {
    check_interval: f64,
    shallow_tier: String,
    deep_tier: String,
    since_last_check: f64,
    previous: WindowRecord,
    quotas: Option<Quotas>,
}

impl AdaptiveStrategy {
    pub fn new(check_interval: f64, shallow_tier: String, deep_tier: String) -> Self {
        Self {
            check_interval,
            shallow_tier,
            deep_tier,
            since_last_check: 0.,
            previous: WindowRecord::default(),
            quotas: None,
        }
    }

    pub fn previous_window(&self) -> &WindowRecord {
        &self.previous
    }

    fn check_window(&mut self, snapshot: &TimeframeSnapshot) {
        let active = snapshot.population.active;
        if let Some(quotas) = compute_quotas(
            snapshot.host_count,
            active,
            snapshot.performance_metric,
            &self.previous,
        ) {
            self.quotas = Some(quotas);
        }
        self.previous = WindowRecord {
            active,
            performance_metric: snapshot.performance_metric,
        };
        self.since_last_check = 0.;
    }
}

impl SleepStrategy for AdaptiveStrategy {
    fn name(&self) -> &str {
        "adaptive"
    }

    fn on_timeframe(&mut self, snapshot: &TimeframeSnapshot, hosts: &BTreeMap<u32, Host>) -> Vec<TierChange> {
        self.since_last_check += snapshot.time_diff;
        if self.since_last_check + 1e-9 >= self.check_interval {
            self.check_window(snapshot);
        }
        let quotas = match self.quotas {
            Some(quotas) => quotas,
            None => return Vec::new(),
        };

        let mut shallow = 0;
        let mut deep = 0;
        for host in hosts.values() {
            match host.sleep.committed_tier() {
                Some(tier) if tier == self.shallow_tier => shallow += 1,
                Some(tier) if tier == self.deep_tier => deep += 1,
                _ => {}
            }
        }

        let mut changes = Vec::new();
        for host in hosts.values() {
            if !host.sleep.state().is(SleepPhase::Staying) || host.sleep.is_state_changing() {
                continue;
            }
            let tier = host.sleep.state().tier().unwrap_or_default();
            if shallow < quotas.shallow && tier == self.deep_tier {
                changes.push(TierChange {
                    host_id: host.id,
                    target_tier: self.shallow_tier.clone(),
                    wait: 0.,
                });
                shallow += 1;
                deep -= 1;
            } else if deep < quotas.deep && shallow > quotas.shallow && tier == self.shallow_tier {
                changes.push(TierChange {
                    host_id: host.id,
                    target_tier: self.deep_tier.clone(),
                    wait: 0.,
                });
                shallow -= 1;
                deep += 1;
            }
        }
        changes
    }

    fn next_decision_time(&self, time: f64, hosts: &BTreeMap<u32, Host>) -> Option<f64> {
        if hosts.values().any(|h| h.vm_count() > 0) {
            Some(time + (self.check_interval - self.since_last_check).max(0.))
        } else {
            None
        }
    }

    fn quotas(&self) -> Option<Quotas> {
        self.quotas
    }
}
