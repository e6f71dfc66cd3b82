use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use sugars::{rc, refcell};

use simcore::{Simulation, SimulationContext};

use crate::core::config::DatacenterConfig;
use crate::core::datacenter::Datacenter;
use crate::core::energy_report::EnergyReport;
use crate::core::error::Result;
use crate::core::events::controller::EndOfSimulation;
use crate::core::events::power::{HostChangeSleepState, HostChangeTier};
use crate::core::events::vm::VmMigrate;
use crate::core::host::Host;
use crate::core::sleep_state::TransitionPhase;
use crate::core::user::CloudUser;
use crate::core::vm::VmSpec;

/// Power-managed datacenter simulation.
pub struct AcpiSimulation {
    datacenter: Rc<RefCell<Datacenter>>,
    datacenter_id: u32,
    users: BTreeMap<u32, Rc<RefCell<CloudUser>>>,
    sim: Simulation,
    ctx: SimulationContext,
}

impl AcpiSimulation {
    pub fn new(mut sim: Simulation, config: DatacenterConfig) -> Result<Self> {
        let datacenter = rc!(refcell!(Datacenter::new(&config, sim.create_context("datacenter"))?));
        let datacenter_id = sim.add_handler("datacenter", datacenter.clone());
        let ctx = sim.create_context("simulation");
        Ok(Self {
            datacenter,
            datacenter_id,
            users: BTreeMap::new(),
            sim,
            ctx,
        })
    }

    pub fn add_user(&mut self, name: &str) -> u32 {
        let user = rc!(refcell!(CloudUser::new(self.datacenter_id, self.sim.create_context(name))));
        let id = self.sim.add_handler(name, user.clone());
        self.users.insert(id, user);
        id
    }

    pub fn submit_vm_now(&mut self, user_id: u32, vm: VmSpec) {
        self.submit_vm_with_delay(user_id, vm, 0.);
    }

    /// Submits VM on behalf of the user. Panics if there is no such user.
    pub fn submit_vm_with_delay(&mut self, user_id: u32, vm: VmSpec, delay: f64) {
        self.users[&user_id].borrow().submit_vm(vm, delay);
    }

    /// Requests host phase change, see [`HostChangeSleepState`].
    pub fn change_sleep_state(&mut self, host_id: u32, phase: TransitionPhase) {
        self.ctx.emit_now(
            HostChangeSleepState {
                host_id,
                phase: phase.code(),
            },
            self.datacenter_id,
        );
    }

    pub fn change_tier(&mut self, host_id: u32, tier: &str) {
        self.ctx.emit_now(
            HostChangeTier {
                host_id,
                tier: tier.to_string(),
            },
            self.datacenter_id,
        );
    }

    pub fn migrate_vm(&mut self, vm_id: u32, target_host: u32) {
        self.ctx.emit_now(VmMigrate { vm_id, target_host }, self.datacenter_id);
    }

    /// Stops periodic processing at the given time.
    pub fn end_at(&mut self, time: f64) {
        let delay = (time - self.ctx.time()).max(0.);
        self.ctx.emit(EndOfSimulation {}, self.datacenter_id, delay);
    }

    pub fn datacenter(&self) -> Rc<RefCell<Datacenter>> {
        self.datacenter.clone()
    }

    pub fn datacenter_id(&self) -> u32 {
        self.datacenter_id
    }

    pub fn host(&self, host_id: u32) -> Option<Ref<Host>> {
        Ref::filter_map(self.datacenter.borrow(), |dc| dc.host(host_id)).ok()
    }

    pub fn user(&self, user_id: u32) -> Rc<RefCell<CloudUser>> {
        self.users[&user_id].clone()
    }

    pub fn report(&self) -> EnergyReport {
        self.datacenter.borrow().report()
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    pub fn sim(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    pub fn steps(&mut self, step_count: u64) -> bool {
        self.sim.steps(step_count)
    }

    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events();
    }

    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        self.sim.step_for_duration(duration)
    }

    pub fn step_until_time(&mut self, time: f64) -> bool {
        self.sim.step_until_time(time)
    }
}
