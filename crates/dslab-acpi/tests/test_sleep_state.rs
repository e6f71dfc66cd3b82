mod common;

use approx::assert_relative_eq;

use dslab_acpi::core::error::SleepSimError;
use dslab_acpi::core::sleep_state::{PowerState, SleepPhase, SleepStateMachine, TransitionPhase};

use common::tiers;

fn machine() -> SleepStateMachine {
    SleepStateMachine::new(0, tiers(), None, true).unwrap()
}

fn sleeping(tier: &str, phase: SleepPhase) -> PowerState {
    PowerState::Sleeping {
        tier: tier.to_string(),
        phase,
    }
}

#[test]
fn test_sleep_and_wake() {
    let mut m = machine();
    assert_eq!(m.energy_saving_tier(), Some("S2"));

    let plan_id = m.begin_sleep(0.).unwrap();
    assert_eq!(m.state(), &sleeping("S2", SleepPhase::Entering));
    assert_eq!(m.next_step(), Some((plan_id, 3.)));
    assert_relative_eq!(m.accrue(3.).unwrap(), 81.);

    assert!(m.advance(3., plan_id).unwrap());
    assert_eq!(m.state(), &sleeping("S2", SleepPhase::Staying));
    assert!(m.plan().is_none());

    assert_relative_eq!(m.accrue(10.).unwrap(), 62.);
    assert_relative_eq!(m.staying_time(), 10.);

    let leave = m.begin_wake(13.).unwrap();
    assert_eq!(leave, 8.);
    assert_eq!(m.leaving_time(), 8.);
    assert_relative_eq!(m.accrue(3.).unwrap(), 108.);
    assert_eq!(m.leaving_time(), 5.);

    let (plan_id, time) = m.next_step().unwrap();
    assert_eq!(time, 21.);
    assert!(m.advance(time, plan_id).unwrap());
    assert_eq!(m.state(), &PowerState::Active);
    assert_eq!(m.leaving_time(), 0.);
    assert_eq!(m.accrue(5.).unwrap(), 0.);
}

#[test]
// Requests for the phase the host is already in change nothing.
fn test_phase_requests_are_idempotent() {
    let mut m = machine();
    let plan_id = m.begin_sleep(0.).unwrap();
    assert!(!m.apply_phase(TransitionPhase::Entering).unwrap());
    m.advance(3., plan_id).unwrap();
    m.accrue(20.).unwrap();

    assert!(!m.apply_phase(TransitionPhase::Staying).unwrap());
    assert_eq!(m.staying_time(), 20.);
    assert_eq!(m.state(), &sleeping("S2", SleepPhase::Staying));
}

#[test]
fn test_invalid_transitions() {
    let mut m = machine();
    for phase in [TransitionPhase::Staying, TransitionPhase::Leaving] {
        let err = m.apply_phase(phase).unwrap_err();
        assert!(matches!(err, SleepSimError::InvalidTransition { .. }));
        assert!(!err.is_fatal());
    }
    assert!(m.begin_wake(0.).is_err());

    m.begin_sleep(0.).unwrap();
    assert!(m.apply_phase(TransitionPhase::Active).is_err());
    assert!(m.apply_phase(TransitionPhase::Leaving).is_err());
    assert!(m.change_tier("S3").is_err());
    assert!(m.begin_sleep(0.).is_err());
}

#[test]
fn test_missing_tier_config() {
    let err = SleepStateMachine::new(3, tiers(), Some("S5".to_string()), true).err().unwrap();
    assert!(matches!(err, SleepSimError::MissingTierConfig { host_id: 3, .. }));
    assert!(err.is_fatal());

    let mut m = machine();
    assert!(m.change_tier("S5").unwrap_err().is_fatal());
}

#[test]
fn test_energy_saving_disabled() {
    let mut m = SleepStateMachine::new(0, tiers(), None, false).unwrap();
    assert_eq!(m.energy_saving_tier(), None);
    assert!(m.begin_sleep(0.).is_err());
    assert_eq!(m.state(), &PowerState::Active);
}

#[test]
// Staying in S2 -> leaving S2 -> active -> entering S3 after 40 s -> staying in S3.
fn test_chained_tier_change() {
    let mut m = machine();
    let plan_id = m.begin_sleep(0.).unwrap();
    m.advance(3., plan_id).unwrap();
    m.accrue(97.).unwrap();

    let plan_id = m.begin_retier(100., "S3", 40.).unwrap();
    assert_eq!(m.state(), &sleeping("S2", SleepPhase::Leaving));
    assert!(m.is_state_changing());
    assert_eq!(m.staying_time(), 0.);
    assert_eq!(m.committed_tier(), Some("S3"));
    assert_eq!(m.next_step(), Some((plan_id, 108.)));

    // a second request while the chain is in flight is rejected
    assert!(m.begin_retier(100., "G2", 0.).is_err());

    m.advance(108., plan_id).unwrap();
    assert_eq!(m.state(), &PowerState::Active);
    assert!(m.is_state_changing());
    assert_eq!(m.next_step(), Some((plan_id, 148.)));

    m.advance(148., plan_id).unwrap();
    assert_eq!(m.state(), &sleeping("S3", SleepPhase::Entering));
    assert!(m.is_state_changing());
    assert_eq!(m.next_step(), Some((plan_id, 155.)));

    m.advance(155., plan_id).unwrap();
    assert_eq!(m.state(), &sleeping("S3", SleepPhase::Staying));
    assert!(!m.is_state_changing());
    assert!(m.plan().is_none());
}

#[test]
fn test_zero_wait_chain_is_applied_at_once() {
    let mut m = machine();
    m.enter_tier(0., "S3").unwrap();
    let (plan_id, time) = m.next_step().unwrap();
    m.advance(time, plan_id).unwrap();

    let plan_id = m.begin_retier(10., "S2", 0.).unwrap();
    assert!(m.advance(38., plan_id).unwrap());
    assert_eq!(m.state(), &sleeping("S2", SleepPhase::Entering));
    assert_eq!(m.next_step(), Some((plan_id, 41.)));
}

#[test]
fn test_stale_plan_is_ignored() {
    let mut m = machine();
    let old_plan = m.begin_sleep(0.).unwrap();
    m.advance(3., old_plan).unwrap();
    assert_eq!(m.begin_wake(5.).unwrap(), 8.);

    assert!(!m.advance(13., old_plan).unwrap());
    assert_eq!(m.state(), &sleeping("S2", SleepPhase::Leaving));
}

#[test]
fn test_tier_order() {
    let m = machine();
    assert_eq!(m.depth("S2"), Some(0));
    assert_eq!(m.depth("G2"), Some(2));
    assert_eq!(m.next_deeper_tier("S2"), Some("S3"));
    assert_eq!(m.next_deeper_tier("S3"), Some("G2"));
    assert_eq!(m.next_deeper_tier("G2"), None);
}

#[test]
fn test_phase_costs() {
    let m = machine();
    let s3 = m.tier_data("S3").unwrap();
    assert_eq!(s3.cost(SleepPhase::Entering).power, 36.);
    assert_eq!(s3.cost(SleepPhase::Leaving).time, 28.);
    assert_eq!(s3.cost(SleepPhase::Staying).power, 0.);
}

#[test]
fn test_phase_codes() {
    for code in 0..4 {
        assert_eq!(TransitionPhase::from_code(code).unwrap().code(), code);
    }
    assert_eq!(TransitionPhase::from_code(4), None);
}
