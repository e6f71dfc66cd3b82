//! Datacenter controller.

use std::collections::BTreeMap;

use simcore::cast;
use simcore::{log_debug, log_error, log_trace, log_warn};
use simcore::{Event, EventHandler, SimulationContext};

use crate::core::allocation_policy::{AcpiAllocationPolicy, VmAllocationPolicy};
use crate::core::config::{DatacenterConfig, StrategyConfig};
use crate::core::energy_report::{EnergyReport, HostEnergy, PopulationSample};
use crate::core::error::{Result, SleepSimError};
use crate::core::events::controller::{EndOfSimulation, PeriodicTick};
use crate::core::events::power::{AdvanceTransition, HostChangeSleepState, HostChangeTier};
use crate::core::events::vm::{CloudletReturn, VmCreate, VmCreateAck, VmMigrate};
use crate::core::host::{CompletedCloudlet, Host};
use crate::core::sleep_state::TransitionPhase;
use crate::core::strategies::adaptive::Quotas;
use crate::core::strategy::{strategy_resolver, PopulationCounts, SleepStrategy, TierChange, TimeframeSnapshot};
use crate::core::vm::VmSpec;

/// Lower bound for the delay of the next periodic tick.
const MIN_TICK_DELAY: f64 = 1e-9;

fn abort(ctx: &SimulationContext, err: SleepSimError) -> ! {
    log_error!(ctx, "fatal error: {}", err);
    panic!("{}", err)
}

fn report_error(ctx: &SimulationContext, err: SleepSimError) {
    if err.is_fatal() {
        abort(ctx, err);
    }
    log_warn!(ctx, "{}", err);
}

/// Owns the hosts, integrates their energy and drives their power states.
///
/// The controller processes the elapsed timeframe on every received event before handling the event itself,
/// so that energy and workload progress are always accounted under the power states of that timeframe.
pub struct Datacenter {
    hosts: BTreeMap<u32, Host>,
    policy: Box<dyn VmAllocationPolicy>,
    strategy: Box<dyn SleepStrategy>,
    tick_interval: f64,
    last_process_time: f64,
    finished: bool,
    performance_metric: f64,
    active_energy: f64,
    sleep_energy: f64,
    wake_latency: f64,
    last_quotas: Option<Quotas>,
    population_history: Vec<PopulationSample>,
    ctx: SimulationContext,
}

impl Datacenter {
    /// Creates hosts from the config, host ids are assigned from 0 in config order.
    pub fn new(config: &DatacenterConfig, ctx: SimulationContext) -> Result<Self> {
        config.validate()?;
        let mut hosts = BTreeMap::new();
        for host_config in config.hosts.iter() {
            for name in host_config.host_names()? {
                let id = hosts.len() as u32;
                let host = Host::new(id, name, host_config, config.power_on_off, config.energy_saving)?;
                hosts.insert(id, host);
            }
        }
        if let StrategyConfig::Adaptive {
            shallow_tier,
            deep_tier,
            ..
        } = &config.strategy
        {
            for host in hosts.values().filter(|h| h.sleep.energy_saving_tier().is_some()) {
                host.sleep.tier_data(shallow_tier)?;
                host.sleep.tier_data(deep_tier)?;
            }
        }
        Ok(Self {
            hosts,
            policy: Box::new(AcpiAllocationPolicy::new()),
            strategy: strategy_resolver(&config.strategy),
            tick_interval: config.tick_interval,
            last_process_time: 0.,
            finished: false,
            performance_metric: 0.,
            active_energy: 0.,
            sleep_energy: 0.,
            wake_latency: 0.,
            last_quotas: None,
            population_history: Vec::new(),
            ctx,
        })
    }

    pub fn id(&self) -> u32 {
        self.ctx.id()
    }

    pub fn host(&self, id: u32) -> Option<&Host> {
        self.hosts.get(&id)
    }

    pub fn hosts(&self) -> &BTreeMap<u32, Host> {
        &self.hosts
    }

    pub fn host_of(&self, vm_id: u32) -> Option<u32> {
        self.policy.host_of(vm_id)
    }

    pub fn performance_metric(&self) -> f64 {
        self.performance_metric
    }

    pub fn active_energy(&self) -> f64 {
        self.active_energy
    }

    pub fn sleep_energy(&self) -> f64 {
        self.sleep_energy
    }

    pub fn total_energy(&self) -> f64 {
        self.active_energy + self.sleep_energy
    }

    pub fn wake_latency(&self) -> f64 {
        self.wake_latency
    }

    pub fn population_history(&self) -> &[PopulationSample] {
        &self.population_history
    }

    pub fn report(&self) -> EnergyReport {
        EnergyReport {
            strategy: self.strategy.name().to_string(),
            time: self.last_process_time,
            total_energy: self.total_energy(),
            active_energy: self.active_energy,
            sleep_energy: self.sleep_energy,
            wake_latency: self.wake_latency,
            hosts: self
                .hosts
                .values()
                .map(|h| HostEnergy {
                    id: h.id,
                    name: h.name.clone(),
                    active_energy: h.active_energy(),
                    sleep_energy: h.sleep_energy(),
                })
                .collect(),
            population_history: self.population_history.clone(),
        }
    }

    /// Consolidation is not available while hosts are power-managed.
    pub fn optimize_allocation(&mut self) -> Result<Vec<(u32, u32)>> {
        self.policy.optimize_allocation(&mut self.hosts)
    }

    fn process_timeframe(&mut self) {
        let time = self.ctx.time();
        let time_diff = time - self.last_process_time;

        let mut completed = Vec::new();
        for host in self.hosts.values_mut() {
            completed.extend(host.update_processing(time));
        }

        if time_diff > 0. {
            for host in self.hosts.values_mut() {
                match host.accrue_energy(time_diff) {
                    Ok((active, sleep)) => {
                        self.active_energy += active;
                        self.sleep_energy += sleep;
                    }
                    Err(e) => abort(&self.ctx, e),
                }
                log_trace!(
                    self.ctx,
                    "host {}: state {}, utilization {:.3}, energy {:.3}",
                    host.name,
                    host.sleep.state(),
                    host.utilization(),
                    host.total_energy()
                );
            }
        }

        self.return_cloudlets(completed);
        self.release_finished_vms(time);

        if time_diff > 0. {
            let snapshot = TimeframeSnapshot {
                time,
                time_diff,
                host_count: self.hosts.len(),
                population: PopulationCounts::count(&self.hosts),
                performance_metric: self.performance_metric,
            };
            let changes = self.strategy.on_timeframe(&snapshot, &self.hosts);
            let quotas = self.strategy.quotas();
            if quotas != self.last_quotas {
                if let Some(q) = &quotas {
                    log_debug!(
                        self.ctx,
                        "new tier quotas: lambda {:.3}, alpha {:.3}, shallow {}, deep {}",
                        q.lambda,
                        q.alpha,
                        q.shallow,
                        q.deep
                    );
                }
                self.last_quotas = quotas;
            }
            for change in changes {
                self.start_tier_change(time, change);
            }
            for host in self.hosts.values_mut() {
                host.apply_governors();
            }
            let population = PopulationCounts::count(&self.hosts);
            self.population_history.push(PopulationSample {
                time,
                active: population.active,
                tiers: population.tiers,
                leaving: population.leaving,
                changing: population.changing,
            });
            self.last_process_time = time;
        }
    }

    fn return_cloudlets(&mut self, completed: Vec<CompletedCloudlet>) {
        for c in completed {
            self.performance_metric -= c.cloudlet.performance_metric;
            let host_id = self.policy.host_of(c.vm_id).unwrap_or(u32::MAX);
            log_debug!(self.ctx, "cloudlet {} of vm {} completed", c.cloudlet.id, c.vm_id);
            self.ctx.emit_now(
                CloudletReturn {
                    cloudlet_id: c.cloudlet.id,
                    vm_id: c.vm_id,
                    host_id,
                    performance_metric: c.cloudlet.performance_metric,
                },
                c.owner,
            );
        }
    }

    fn release_finished_vms(&mut self, time: f64) {
        let finished: Vec<(u32, u32)> = self
            .hosts
            .values()
            .flat_map(|h| h.finished_vms().into_iter().map(move |vm_id| (h.id, vm_id)))
            .collect();
        for (host_id, vm_id) in finished {
            self.policy.deallocate(vm_id, &mut self.hosts);
            log_debug!(self.ctx, "vm {} finished and released from host {}", vm_id, host_id);
            let host = match self.hosts.get_mut(&host_id) {
                Some(host) => host,
                None => continue,
            };
            if host.vm_count() > 0
                || !host.sleep.state().is_active()
                || host.sleep.is_state_changing()
                || host.sleep.energy_saving_tier().is_none()
            {
                continue;
            }
            match host.sleep.begin_sleep(time) {
                Ok(_) => {
                    host.refresh_utilization();
                    log_debug!(self.ctx, "host {} is idle, going to {}", host.name, host.sleep.state());
                    self.schedule_transition(host_id);
                }
                Err(e) => report_error(&self.ctx, e),
            }
        }
    }

    fn start_tier_change(&mut self, time: f64, change: TierChange) {
        let host = match self.hosts.get_mut(&change.host_id) {
            Some(host) => host,
            None => return report_error(&self.ctx, SleepSimError::UnknownHost(change.host_id)),
        };
        match host.sleep.begin_retier(time, &change.target_tier, change.wait) {
            Ok(_) => {
                log_debug!(
                    self.ctx,
                    "host {} moves to tier {} after {} s",
                    host.name,
                    change.target_tier,
                    change.wait
                );
                self.schedule_transition(change.host_id);
            }
            Err(e) => report_error(&self.ctx, e),
        }
    }

    /// Keeps a single pending transition event per host, for the next step of its current plan.
    fn schedule_transition(&mut self, host_id: u32) {
        let dc_id = self.ctx.id();
        self.ctx.cancel_events(|e| {
            e.dst == dc_id
                && e
                    .data
                    .downcast_ref::<AdvanceTransition>()
                    .map_or(false, |a| a.host_id == host_id)
        });
        if let Some((plan_id, time)) = self.hosts.get(&host_id).and_then(|h| h.sleep.next_step()) {
            let delay = (time - self.ctx.time()).max(0.);
            self.ctx.emit_self(AdvanceTransition { host_id, plan_id }, delay);
        }
    }

    fn reschedule_tick(&mut self) {
        if self.finished {
            return;
        }
        self.ctx.cancel_self_events::<PeriodicTick>();
        let time = self.ctx.time();
        let next = self
            .hosts
            .values()
            .filter_map(|h| h.next_event_time())
            .chain(self.strategy.next_decision_time(time, &self.hosts))
            .min_by(|a, b| a.total_cmp(b));
        if let Some(next) = next {
            let delay = (next - time).min(self.tick_interval).max(MIN_TICK_DELAY);
            self.ctx.emit_self(PeriodicTick {}, delay);
        }
    }

    fn on_vm_create(&mut self, vm: VmSpec) {
        let time = self.ctx.time();
        let vm_id = vm.id;
        let owner = vm.owner;
        let metric = vm.performance_metric();
        if vm.cloudlets.is_empty() {
            log_warn!(self.ctx, "vm {} has no cloudlets to run, rejected", vm_id);
            return self.nack(vm_id, owner);
        }
        match self.policy.allocate(vm, &mut self.hosts, time) {
            Ok(Some(placement)) => {
                self.performance_metric += metric;
                self.wake_latency += placement.latency;
                log_debug!(
                    self.ctx,
                    "vm {} placed on host {} with latency {}",
                    vm_id,
                    placement.host_id,
                    placement.latency
                );
                self.schedule_transition(placement.host_id);
                self.ctx.emit(
                    VmCreateAck {
                        datacenter_id: self.ctx.id(),
                        vm_id,
                        success: true,
                    },
                    owner,
                    placement.latency,
                );
            }
            Ok(None) => {
                log_debug!(self.ctx, "no suitable host for vm {}", vm_id);
                self.nack(vm_id, owner);
            }
            Err(e) => {
                report_error(&self.ctx, e);
                self.nack(vm_id, owner);
            }
        }
    }

    fn nack(&self, vm_id: u32, owner: u32) {
        self.ctx.emit_now(
            VmCreateAck {
                datacenter_id: self.ctx.id(),
                vm_id,
                success: false,
            },
            owner,
        );
    }

    fn on_change_sleep_state(&mut self, host_id: u32, code: u8) {
        let phase = match TransitionPhase::from_code(code) {
            Some(phase) => phase,
            None => {
                log_warn!(self.ctx, "unknown phase code {} for host {}", code, host_id);
                return;
            }
        };
        let time = self.ctx.time();
        let host = match self.hosts.get_mut(&host_id) {
            Some(host) => host,
            None => return report_error(&self.ctx, SleepSimError::UnknownHost(host_id)),
        };
        let res = match (host.sleep.phase(), phase) {
            (TransitionPhase::Active, TransitionPhase::Entering) if host.vm_count() > 0 => {
                Err(SleepSimError::InvalidTransition {
                    host_id,
                    from: format!("{} with {} vms", host.sleep.state(), host.vm_count()),
                    to: "Entering".to_string(),
                })
            }
            (TransitionPhase::Active, TransitionPhase::Entering) => host.sleep.begin_sleep(time).map(|_| true),
            (TransitionPhase::Staying, TransitionPhase::Leaving) => host.sleep.begin_wake(time).map(|_| true),
            _ => host.sleep.apply_phase(phase),
        };
        match res {
            Ok(true) => {
                host.refresh_utilization();
                log_debug!(self.ctx, "host {} changed state to {}", host.name, host.sleep.state());
                self.schedule_transition(host_id);
            }
            Ok(false) => {}
            Err(e) => report_error(&self.ctx, e),
        }
    }

    fn on_change_tier(&mut self, host_id: u32, tier: String) {
        let time = self.ctx.time();
        let host = match self.hosts.get_mut(&host_id) {
            Some(host) => host,
            None => return report_error(&self.ctx, SleepSimError::UnknownHost(host_id)),
        };
        if host.vm_count() > 0 {
            return report_error(
                &self.ctx,
                SleepSimError::InvalidTransition {
                    host_id,
                    from: format!("{} with {} vms", host.sleep.state(), host.vm_count()),
                    to: format!("{}/Entering", tier),
                },
            );
        }
        match host.sleep.enter_tier(time, &tier) {
            Ok(_) => {
                host.refresh_utilization();
                log_debug!(self.ctx, "host {} changed state to {}", host.name, host.sleep.state());
                self.schedule_transition(host_id);
            }
            Err(e) => report_error(&self.ctx, e),
        }
    }

    fn on_advance_transition(&mut self, host_id: u32, plan_id: u64) {
        let time = self.ctx.time();
        let host = match self.hosts.get_mut(&host_id) {
            Some(host) => host,
            None => return report_error(&self.ctx, SleepSimError::UnknownHost(host_id)),
        };
        match host.sleep.advance(time, plan_id) {
            Ok(true) => {
                host.refresh_utilization();
                log_debug!(self.ctx, "host {} changed state to {}", host.name, host.sleep.state());
                self.schedule_transition(host_id);
            }
            Ok(false) => {
                log_trace!(self.ctx, "stale transition plan {} of host {}", plan_id, host_id);
            }
            Err(e) => report_error(&self.ctx, e),
        }
    }
}

impl EventHandler for Datacenter {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            PeriodicTick {} => {
                self.process_timeframe();
                self.reschedule_tick();
            }
            VmCreate { vm } => {
                self.process_timeframe();
                self.on_vm_create(vm);
                self.reschedule_tick();
            }
            AdvanceTransition { host_id, plan_id } => {
                self.process_timeframe();
                self.on_advance_transition(host_id, plan_id);
                self.process_timeframe();
                self.reschedule_tick();
            }
            HostChangeSleepState { host_id, phase } => {
                self.process_timeframe();
                self.on_change_sleep_state(host_id, phase);
                self.process_timeframe();
                self.reschedule_tick();
            }
            HostChangeTier { host_id, tier } => {
                self.process_timeframe();
                self.on_change_tier(host_id, tier);
                self.process_timeframe();
                self.reschedule_tick();
            }
            VmMigrate { vm_id, target_host } => {
                log_warn!(
                    self.ctx,
                    "migration of vm {} to host {} ignored: migrations are disabled for power-managed hosts",
                    vm_id,
                    target_host
                );
            }
            EndOfSimulation {} => {
                self.process_timeframe();
                self.finished = true;
                self.ctx.cancel_self_events::<PeriodicTick>();
                log_debug!(self.ctx, "simulation finished, total energy {:.3}", self.total_energy());
            }
        })
    }
}
