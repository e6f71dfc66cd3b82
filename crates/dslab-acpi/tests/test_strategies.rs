mod common;

use std::collections::BTreeMap;

use approx::assert_relative_eq;

use simcore::Simulation;

use dslab_acpi::core::config::{DatacenterConfig, StrategyConfig};
use dslab_acpi::core::host::Host;
use dslab_acpi::core::sleep_state::{PowerState, SleepPhase, TransitionPhase};
use dslab_acpi::core::strategies::adaptive::{compute_quotas, AdaptiveStrategy, WindowRecord};
use dslab_acpi::core::strategies::timeout::TimeoutStrategy;
use dslab_acpi::core::strategy::{PopulationCounts, SleepStrategy, TierChange, TimeframeSnapshot};
use dslab_acpi::core::vm::{CloudletSpec, VmSpec};
use dslab_acpi::simulation::AcpiSimulation;

use common::{active_host, name_wrapper, staying_host};

fn snapshot(time: f64, time_diff: f64, hosts: &BTreeMap<u32, Host>, performance_metric: f64) -> TimeframeSnapshot {
    TimeframeSnapshot {
        time,
        time_diff,
        host_count: hosts.len(),
        population: PopulationCounts::count(hosts),
        performance_metric,
    }
}

#[test]
// lambda = 8 / 10 = 0.8, alpha = |(50 - 40) / 50 + 0.8| = 1.0, shallow = min(8 * 1.0, 20 - 8) = 8.
fn test_adaptive_quotas() {
    let previous = WindowRecord {
        active: 10,
        performance_metric: 40.,
    };
    let quotas = compute_quotas(20, 8, 50., &previous).unwrap();
    assert_relative_eq!(quotas.lambda, 0.8);
    assert_relative_eq!(quotas.alpha, 1.0);
    assert_eq!(quotas.shallow, 8);
    assert_eq!(quotas.deep, 4);

    // the shallow quota is bounded by the number of idle hosts
    let quotas = compute_quotas(10, 8, 50., &previous).unwrap();
    assert_eq!(quotas.shallow, 2);
    assert_eq!(quotas.deep, 0);
}

#[test]
fn test_adaptive_quotas_without_metric() {
    let previous = WindowRecord {
        active: 4,
        performance_metric: 40.,
    };
    let quotas = compute_quotas(10, 2, 0., &previous).unwrap();
    assert_relative_eq!(quotas.lambda, 0.5);
    assert_relative_eq!(quotas.alpha, 5.);
    assert_eq!(quotas.shallow, 8);
    assert_eq!(quotas.deep, 0);

    // no active hosts in the previous window
    assert!(compute_quotas(10, 2, 10., &WindowRecord::default()).is_none());
}

#[test]
// 2 active hosts, 4 staying in S2 and 4 staying in S3.
// The first window only records the trend, the second one gives lambda = 2 / 4 = 0.5, alpha = 0.5,
// shallow quota = 1 and deep quota = 7, so three S2 hosts are moved to S3.
fn test_adaptive_moves_hosts_to_deep_tier() {
    let mut hosts = BTreeMap::new();
    for id in 0..2 {
        hosts.insert(id, active_host(id));
    }
    for id in 2..6 {
        hosts.insert(id, staying_host(id, "S2"));
    }
    for id in 6..10 {
        hosts.insert(id, staying_host(id, "S3"));
    }
    let mut strategy = AdaptiveStrategy::new(120., "S2".to_string(), "S3".to_string());

    let mut first = snapshot(120., 120., &hosts, 10.);
    first.population.active = 4;
    assert!(strategy.on_timeframe(&first, &hosts).is_empty());
    assert_eq!(strategy.quotas(), None);
    assert_eq!(strategy.previous_window().active, 4);

    // inside the window nothing changes
    assert!(strategy.on_timeframe(&snapshot(180., 60., &hosts, 10.), &hosts).is_empty());

    let changes = strategy.on_timeframe(&snapshot(240., 60., &hosts, 10.), &hosts);
    let quotas = strategy.quotas().unwrap();
    assert_eq!((quotas.shallow, quotas.deep), (1, 7));
    let expected: Vec<TierChange> = (2..5)
        .map(|host_id| TierChange {
            host_id,
            target_tier: "S3".to_string(),
            wait: 0.,
        })
        .collect();
    assert_eq!(changes, expected);
}

#[test]
// High load trend raises the shallow quota, deep hosts are moved to the shallow tier.
fn test_adaptive_moves_hosts_to_shallow_tier() {
    let mut hosts = BTreeMap::new();
    for id in 0..4 {
        hosts.insert(id, active_host(id));
    }
    for id in 4..8 {
        hosts.insert(id, staying_host(id, "S3"));
    }
    let mut strategy = AdaptiveStrategy::new(10., "S2".to_string(), "S3".to_string());
    let mut first = snapshot(10., 10., &hosts, 10.);
    first.population.active = 2;
    strategy.on_timeframe(&first, &hosts);

    // lambda = 2, alpha = |(20 - 10) / 20 + 2| = 2.5, shallow = min(10, 4) = 4
    let changes = strategy.on_timeframe(&snapshot(20., 10., &hosts, 20.), &hosts);
    assert_eq!(strategy.quotas().unwrap().shallow, 4);
    assert_eq!(changes.len(), 4);
    assert!(changes.iter().all(|c| c.target_tier == "S2"));

    // hosts already moving are not counted twice
    for change in changes.iter() {
        hosts
            .get_mut(&change.host_id)
            .unwrap()
            .sleep
            .begin_retier(20., &change.target_tier, change.wait)
            .unwrap();
    }
    assert!(strategy.on_timeframe(&snapshot(21., 1., &hosts, 20.), &hosts).is_empty());
}

#[test]
fn test_timeout_decisions() {
    let mut overrides = BTreeMap::new();
    overrides.insert(1, 60.);
    let mut strategy = TimeoutStrategy::new(75., 40., overrides);

    let mut hosts = BTreeMap::new();
    hosts.insert(0, staying_host(0, "S2"));
    hosts.insert(1, staying_host(1, "S3"));
    hosts.insert(2, staying_host(2, "G2"));
    hosts.insert(3, active_host(3));

    hosts.get_mut(&0).unwrap().sleep.accrue(50.).unwrap();
    hosts.get_mut(&1).unwrap().sleep.accrue(74.).unwrap();
    hosts.get_mut(&2).unwrap().sleep.accrue(500.).unwrap();
    assert_eq!(strategy.next_decision_time(100., &hosts), Some(101.));
    assert!(strategy.on_timeframe(&snapshot(100., 1., &hosts, 0.), &hosts).is_empty());

    for host in hosts.values_mut() {
        host.sleep.accrue(1.).unwrap();
    }
    let changes = strategy.on_timeframe(&snapshot(101., 1., &hosts, 0.), &hosts);
    assert_eq!(
        changes,
        vec![TierChange {
            host_id: 1,
            target_tier: "G2".to_string(),
            wait: 60.,
        }]
    );
    assert_eq!(strategy.reentry_wait(0), 40.);
}

fn timeout_sim(config: DatacenterConfig) -> AcpiSimulation {
    let mut sim = AcpiSimulation::new(Simulation::new(123), config).unwrap();
    sim.change_sleep_state(0, TransitionPhase::Entering);
    sim
}

fn state(sim: &AcpiSimulation) -> PowerState {
    sim.host(0).unwrap().sleep.state().clone()
}

fn sleeping(tier: &str, phase: SleepPhase) -> PowerState {
    PowerState::Sleeping {
        tier: tier.to_string(),
        phase,
    }
}

#[test]
// The host stays in S2 from t = 3, after 75 s it leaves S2 (8 s), stays active for 40 s
// and enters S3 (7 s), then the same happens for G2 which is the deepest tier.
fn test_timeout_escalation() {
    let config = DatacenterConfig::from_file(&name_wrapper("timeout.yaml")).unwrap();
    let mut sim = timeout_sim(config);

    sim.step_until_time(77.5);
    assert_eq!(state(&sim), sleeping("S2", SleepPhase::Staying));
    assert_relative_eq!(sim.host(0).unwrap().sleep.staying_time(), 74.);

    sim.step_until_time(78.);
    assert_eq!(sim.current_time(), 78.);
    assert_eq!(state(&sim), sleeping("S2", SleepPhase::Leaving));
    assert_eq!(sim.host(0).unwrap().sleep.staying_time(), 0.);
    assert!(sim.host(0).unwrap().sleep.is_state_changing());
    assert_relative_eq!(sim.report().sleep_energy, 27. * 3. + 6.2 * 75., epsilon = 1e-9);
    let plan_id = sim.host(0).unwrap().sleep.plan().unwrap().id;

    // the chain is started only once
    sim.step_until_time(120.);
    assert_eq!(state(&sim), PowerState::Active);
    assert_eq!(sim.host(0).unwrap().sleep.plan().unwrap().id, plan_id);

    sim.step_until_time(126.);
    assert_eq!(state(&sim), sleeping("S3", SleepPhase::Entering));
    sim.step_until_time(133.);
    assert_eq!(state(&sim), sleeping("S3", SleepPhase::Staying));
    assert!(!sim.host(0).unwrap().sleep.is_state_changing());

    sim.step_until_no_events();
    assert_eq!(state(&sim), sleeping("G2", SleepPhase::Staying));
    // S3 staying from 133, leaving at 208, active at 236, entering G2 at 276, staying at 280
    assert_eq!(sim.current_time(), 280.);
}

#[test]
fn test_timeout_reentry_override() {
    let mut config = DatacenterConfig::from_file(&name_wrapper("timeout.yaml")).unwrap();
    let mut overrides = BTreeMap::new();
    overrides.insert(0, 60.);
    config.strategy = StrategyConfig::Timeout {
        dwell_threshold: 75.,
        reentry_wait: 40.,
        reentry_wait_overrides: overrides,
    };
    let mut sim = timeout_sim(config);

    sim.step_until_time(145.);
    assert_eq!(state(&sim), PowerState::Active);
    sim.step_until_time(146.);
    assert_eq!(state(&sim), sleeping("S3", SleepPhase::Entering));
}

const ADAPTIVE_POOL: &str = "
tick_interval: 1.0
power_on_off: false
strategy:
  type: adaptive
  check_interval: 10
  shallow_tier: S2
  deep_tier: S3
hosts:
  - name_prefix: host
    count: 4
    cores: 1
    core_mips: 1000
    memory: 4096
    power_model:
      type: dvfs_table
      idle: [90]
      full: [170]
    sleep_states:
      S2:
        entering: { power: 27, time: 3 }
        leaving: { power: 36, time: 8 }
        staying: { power: 6.2, time: 0 }
      S3:
        entering: { power: 36, time: 7 }
        leaving: { power: 42, time: 28 }
        staying: { power: 0, time: 5 }
";

#[test]
// Host 0 runs a 30 s VM, hosts 1-3 finish 2 s VMs and sleep in S2 from t = 5.
// The window at t = 10 records 1 active host, the one at t = 20 gives lambda = alpha = 1,
// shallow quota 1 and deep quota 2, so hosts 1 and 2 move to S3 (leaving 20-28, entering 28-35).
// At t = 30 host 0 becomes idle, the metric drops to 0 and the deep quota covers the whole pool:
// host 3 moves at t = 30 and host 0 once it stays in S2 at t = 33, reaching S3 at t = 48.
fn test_adaptive_pool_moves_to_deep_tier() {
    let config = DatacenterConfig::from_str(ADAPTIVE_POOL).unwrap();
    let mut sim = AcpiSimulation::new(Simulation::new(123), config).unwrap();
    let user = sim.add_user("user");
    sim.submit_vm_now(user, VmSpec::new(0, 0, 1000., 512, vec![CloudletSpec::new(0, 30000., 1.)]));
    for id in 1..4 {
        sim.submit_vm_now(user, VmSpec::new(id, 0, 1000., 512, vec![CloudletSpec::new(id, 2000., 1.)]));
    }

    sim.step_until_time(10.);
    for id in 1..4 {
        assert_eq!(sim.host(id).unwrap().sleep.state(), &sleeping("S2", SleepPhase::Staying));
    }

    sim.step_until_time(20.);
    assert_eq!(sim.host(1).unwrap().sleep.state(), &sleeping("S2", SleepPhase::Leaving));
    assert_eq!(sim.host(2).unwrap().sleep.state(), &sleeping("S2", SleepPhase::Leaving));
    assert_eq!(sim.host(3).unwrap().sleep.state(), &sleeping("S2", SleepPhase::Staying));
    assert!(sim.host(1).unwrap().sleep.is_state_changing());

    sim.step_until_time(35.);
    assert_eq!(sim.host(1).unwrap().sleep.state(), &sleeping("S3", SleepPhase::Staying));
    assert_eq!(sim.host(3).unwrap().sleep.state(), &sleeping("S2", SleepPhase::Leaving));

    sim.step_until_no_events();
    assert_eq!(sim.current_time(), 48.);
    for id in 0..4 {
        assert_eq!(sim.host(id).unwrap().sleep.state(), &sleeping("S3", SleepPhase::Staying));
        assert!(!sim.host(id).unwrap().sleep.is_state_changing());
    }
    assert_eq!(sim.user(user).borrow().returned_cloudlets().len(), 4);

    let report = sim.report();
    assert!(report.population_history.iter().all(|s| {
        s.active + s.tiers.values().sum::<usize>() + s.leaving + s.changing == 4
    }));
    let last = report.population_history.last().unwrap();
    assert_eq!(last.tiers.get("S3"), Some(&4));
}
