//! Host sleep-state machine.
//!
//! A host is either active or sleeping in one of its tiers. A sleeping host is entering the tier, staying in it
//! or leaving it. Multi-step transitions are kept as a [`TransitionPlan`] of timed steps owned by the machine,
//! the controller advances the plan when its next step is due.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::core::config::{AcpiStateData, SleepStateTable};
use crate::core::error::{Result, SleepSimError};

/// Phase of a host transition, with the numeric codes used in phase change requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionPhase {
    Active = 0,
    Entering = 1,
    Leaving = 2,
    Staying = 3,
}

impl TransitionPhase {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TransitionPhase::Active),
            1 => Some(TransitionPhase::Entering),
            2 => Some(TransitionPhase::Leaving),
            3 => Some(TransitionPhase::Staying),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Phase of a sleeping host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SleepPhase {
    Entering,
    Leaving,
    Staying,
}

impl From<SleepPhase> for TransitionPhase {
    fn from(phase: SleepPhase) -> Self {
        match phase {
            SleepPhase::Entering => TransitionPhase::Entering,
            SleepPhase::Leaving => TransitionPhase::Leaving,
            SleepPhase::Staying => TransitionPhase::Staying,
        }
    }
}

/// Power state of a host.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PowerState {
    Active,
    Sleeping { tier: String, phase: SleepPhase },
}

impl PowerState {
    pub fn phase(&self) -> TransitionPhase {
        match self {
            PowerState::Active => TransitionPhase::Active,
            PowerState::Sleeping { phase, .. } => (*phase).into(),
        }
    }

    pub fn tier(&self) -> Option<&str> {
        match self {
            PowerState::Active => None,
            PowerState::Sleeping { tier, .. } => Some(tier),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PowerState::Active)
    }

    pub fn is(&self, phase: SleepPhase) -> bool {
        matches!(self, PowerState::Sleeping { phase: p, .. } if *p == phase)
    }
}

impl Display for PowerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Active => write!(f, "Active"),
            PowerState::Sleeping { tier, phase } => write!(f, "{}/{:?}", tier, phase),
        }
    }
}

/// Single action of a transition plan.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PlanStep {
    Phase(TransitionPhase),
    /// Switch to the tier and start entering it.
    Tier(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimedStep {
    pub time: f64,
    pub step: PlanStep,
}

/// Ordered timed steps of an in-flight transition.
#[derive(Clone, Debug, Serialize)]
pub struct TransitionPlan {
    pub id: u64,
    pub steps: VecDeque<TimedStep>,
}

/// Tolerance used when comparing step times with the current time.
const STEP_TIME_EPSILON: f64 = 1e-9;

pub struct SleepStateMachine {
    host_id: u32,
    tiers: SleepStateTable,
    energy_saving_tier: Option<String>,
    state: PowerState,
    staying_time: f64,
    leaving_time: f64,
    state_changing: bool,
    plan: Option<TransitionPlan>,
    next_plan_id: u64,
}

impl SleepStateMachine {
    /// Creates an active host state machine.
    ///
    /// If `energy_saving` is set and the host has sleep tiers, the host goes to `energy_saving_tier`
    /// (the shallowest tier if not specified) when it becomes idle.
    pub fn new(
        host_id: u32,
        tiers: SleepStateTable,
        energy_saving_tier: Option<String>,
        energy_saving: bool,
    ) -> Result<Self> {
        for (name, data) in tiers.iter() {
            data.validate(name)?;
        }
        let energy_saving_tier = if energy_saving && !tiers.is_empty() {
            let tier = energy_saving_tier.unwrap_or_else(|| tiers.keys().next().cloned().unwrap_or_default());
            if !tiers.contains_key(&tier) {
                return Err(SleepSimError::MissingTierConfig { host_id, tier });
            }
            Some(tier)
        } else {
            None
        };
        Ok(Self {
            host_id,
            tiers,
            energy_saving_tier,
            state: PowerState::Active,
            staying_time: 0.,
            leaving_time: 0.,
            state_changing: false,
            plan: None,
            next_plan_id: 0,
        })
    }

    pub fn state(&self) -> &PowerState {
        &self.state
    }

    pub fn phase(&self) -> TransitionPhase {
        self.state.phase()
    }

    /// Accumulated time spent staying in the current tier.
    pub fn staying_time(&self) -> f64 {
        self.staying_time
    }

    /// Remaining time until the host is active again if it is leaving a tier.
    pub fn leaving_time(&self) -> f64 {
        self.leaving_time
    }

    /// Whether a chained tier change is in flight.
    pub fn is_state_changing(&self) -> bool {
        self.state_changing
    }

    pub fn energy_saving_tier(&self) -> Option<&str> {
        self.energy_saving_tier.as_deref()
    }

    pub fn tiers(&self) -> &SleepStateTable {
        &self.tiers
    }

    pub fn plan(&self) -> Option<&TransitionPlan> {
        self.plan.as_ref()
    }

    /// Returns the position of the tier in the shallow to deep order.
    pub fn depth(&self, tier: &str) -> Option<usize> {
        self.tiers.get_index_of(tier)
    }

    /// Returns the tier following the given one in depth order.
    pub fn next_deeper_tier(&self, tier: &str) -> Option<&str> {
        let depth = self.depth(tier)?;
        self.tiers.get_index(depth + 1).map(|(name, _)| name.as_str())
    }

    pub fn tier_data(&self, tier: &str) -> Result<&AcpiStateData> {
        self.tiers.get(tier).ok_or_else(|| SleepSimError::MissingTierConfig {
            host_id: self.host_id,
            tier: tier.to_string(),
        })
    }

    /// Returns the tier the host will end up in once the current plan completes,
    /// or the current tier if the host is not leaving it.
    pub fn committed_tier(&self) -> Option<&str> {
        if let Some(plan) = &self.plan {
            if let Some(tier) = plan.steps.iter().rev().find_map(|s| match &s.step {
                PlanStep::Tier(tier) => Some(tier.as_str()),
                _ => None,
            }) {
                return Some(tier);
            }
        }
        match &self.state {
            PowerState::Sleeping { tier, phase } if *phase != SleepPhase::Leaving => Some(tier),
            _ => None,
        }
    }

    fn invalid(&self, to: impl ToString) -> SleepSimError {
        SleepSimError::InvalidTransition {
            host_id: self.host_id,
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    /// Moves the host to the given phase.
    ///
    /// Returns `Ok(false)` if the host is already in this phase.
    pub fn apply_phase(&mut self, phase: TransitionPhase) -> Result<bool> {
        if self.phase() == phase {
            return Ok(false);
        }
        let next = match (&self.state, phase) {
            (PowerState::Active, TransitionPhase::Entering) => match &self.energy_saving_tier {
                Some(tier) => PowerState::Sleeping {
                    tier: tier.clone(),
                    phase: SleepPhase::Entering,
                },
                None => return Err(self.invalid("Entering")),
            },
            (PowerState::Sleeping { tier, phase: SleepPhase::Entering }, TransitionPhase::Staying) => {
                self.staying_time = 0.;
                self.state_changing = false;
                PowerState::Sleeping {
                    tier: tier.clone(),
                    phase: SleepPhase::Staying,
                }
            }
            (PowerState::Sleeping { tier, phase: SleepPhase::Staying }, TransitionPhase::Leaving) => {
                self.leaving_time = self.tier_data(tier)?.leaving.time;
                PowerState::Sleeping {
                    tier: tier.clone(),
                    phase: SleepPhase::Leaving,
                }
            }
            (PowerState::Sleeping { phase: SleepPhase::Leaving, .. }, TransitionPhase::Active) => {
                self.leaving_time = 0.;
                PowerState::Active
            }
            (_, phase) => return Err(self.invalid(format!("{:?}", phase))),
        };
        self.state = next;
        Ok(true)
    }

    /// Switches the host to the given tier and starts entering it.
    /// Allowed for active hosts and for hosts leaving another tier.
    pub fn change_tier(&mut self, tier: &str) -> Result<()> {
        self.tier_data(tier)?;
        let allowed = self.state.is_active() || self.state.is(SleepPhase::Leaving);
        if !allowed {
            return Err(self.invalid(format!("{}/Entering", tier)));
        }
        self.leaving_time = 0.;
        self.state = PowerState::Sleeping {
            tier: tier.to_string(),
            phase: SleepPhase::Entering,
        };
        Ok(())
    }

    /// Accounts for `dt` seconds passed in the current state, returns the sleep-state energy consumed.
    /// Active hosts consume no sleep-state energy.
    pub fn accrue(&mut self, dt: f64) -> Result<f64> {
        let (tier, phase) = match &self.state {
            PowerState::Active => return Ok(0.),
            PowerState::Sleeping { tier, phase } => (tier, *phase),
        };
        let energy = self.tier_data(tier)?.cost(phase).power * dt;
        match phase {
            SleepPhase::Staying => self.staying_time += dt,
            SleepPhase::Leaving => self.leaving_time = (self.leaving_time - dt).max(0.),
            SleepPhase::Entering => {}
        }
        Ok(energy)
    }

    fn new_plan(&mut self, steps: Vec<TimedStep>) -> u64 {
        let id = self.next_plan_id;
        self.next_plan_id += 1;
        self.plan = Some(TransitionPlan {
            id,
            steps: steps.into(),
        });
        id
    }

    /// Puts an active host into its energy-saving tier.
    pub fn begin_sleep(&mut self, now: f64) -> Result<u64> {
        if !self.state.is_active() {
            return Err(self.invalid("Entering"));
        }
        self.apply_phase(TransitionPhase::Entering)?;
        self.plan_staying(now)
    }

    fn plan_staying(&mut self, now: f64) -> Result<u64> {
        let tier = self.state.tier().unwrap_or_default().to_string();
        let enter = self.tier_data(&tier)?.entering.time;
        Ok(self.new_plan(vec![TimedStep {
            time: now + enter,
            step: PlanStep::Phase(TransitionPhase::Staying),
        }]))
    }

    /// Switches the host to the given tier and plans its staying phase.
    pub fn enter_tier(&mut self, now: f64, tier: &str) -> Result<u64> {
        self.change_tier(tier)?;
        self.plan_staying(now)
    }

    /// Starts waking a sleeping host, returns the time until it becomes active.
    pub fn begin_wake(&mut self, now: f64) -> Result<f64> {
        if !self.state.is(SleepPhase::Staying) {
            return Err(self.invalid("Leaving"));
        }
        self.apply_phase(TransitionPhase::Leaving)?;
        let leave = self.leaving_time;
        self.new_plan(vec![TimedStep {
            time: now + leave,
            step: PlanStep::Phase(TransitionPhase::Active),
        }]);
        Ok(leave)
    }

    /// Moves a staying host into another tier: the host leaves its current tier, becomes active
    /// and after `wait` more seconds starts entering the target tier.
    ///
    /// The host is marked as state-changing until it reaches the staying phase of the target tier.
    pub fn begin_retier(&mut self, now: f64, target: &str, wait: f64) -> Result<u64> {
        self.tier_data(target)?;
        if !self.state.is(SleepPhase::Staying) || self.state_changing {
            return Err(self.invalid(format!("{}/Entering", target)));
        }
        self.apply_phase(TransitionPhase::Leaving)?;
        self.state_changing = true;
        self.staying_time = 0.;
        let leave = self.leaving_time;
        Ok(self.new_plan(vec![
            TimedStep {
                time: now + leave,
                step: PlanStep::Phase(TransitionPhase::Active),
            },
            TimedStep {
                time: now + leave + wait,
                step: PlanStep::Tier(target.to_string()),
            },
        ]))
    }

    /// Returns the id of the current plan and the time of its next step.
    pub fn next_step(&self) -> Option<(u64, f64)> {
        let plan = self.plan.as_ref()?;
        plan.steps.front().map(|s| (plan.id, s.time))
    }

    /// Applies all plan steps due at `now`.
    ///
    /// Returns `Ok(false)` if `plan_id` does not match the current plan. On error the plan is dropped.
    pub fn advance(&mut self, now: f64, plan_id: u64) -> Result<bool> {
        match &self.plan {
            Some(plan) if plan.id == plan_id => {}
            _ => return Ok(false),
        }
        loop {
            let step = match self.plan.as_mut().and_then(|plan| {
                if plan.steps.front().map_or(false, |s| s.time <= now + STEP_TIME_EPSILON) {
                    plan.steps.pop_front()
                } else {
                    None
                }
            }) {
                Some(step) => step,
                None => break,
            };
            let res = match step.step {
                PlanStep::Phase(phase) => self.apply_phase(phase).map(|_| ()),
                PlanStep::Tier(tier) => self.change_tier(&tier).and_then(|_| {
                    let enter = self.tier_data(&tier)?.entering.time;
                    if let Some(plan) = self.plan.as_mut() {
                        plan.steps.push_front(TimedStep {
                            time: now + enter,
                            step: PlanStep::Phase(TransitionPhase::Staying),
                        });
                    }
                    Ok(())
                }),
            };
            if let Err(e) = res {
                self.plan = None;
                self.state_changing = false;
                return Err(e);
            }
        }
        if self.plan.as_ref().map_or(false, |p| p.steps.is_empty()) {
            self.plan = None;
        }
        Ok(true)
    }
}
