//! Physical host.

use std::collections::BTreeMap;

use crate::core::common::AllocationVerdict;
use crate::core::config::HostConfig;
use crate::core::dvfs::Core;
use crate::core::error::{Result, SleepSimError};
use crate::core::power_model::{energy_linear_interpolation, power_model_resolver, PowerModel};
use crate::core::sleep_state::SleepStateMachine;
use crate::core::vm::{CloudletSpec, VirtualMachine, VmSpec};

/// Cloudlet completed on a host.
#[derive(Clone, Debug)]
pub struct CompletedCloudlet {
    pub vm_id: u32,
    pub owner: u32,
    pub cloudlet: CloudletSpec,
}

pub struct Host {
    pub id: u32,
    pub name: String,

    cores: Vec<Core>,
    frequencies: Vec<f64>,

    memory_total: u64,
    mips_allocated: f64,
    memory_allocated: u64,

    power_model: Box<dyn PowerModel>,
    power_on_off: bool,
    pub sleep: SleepStateMachine,

    vms: BTreeMap<u32, VirtualMachine>,

    previous_utilization: f64,
    utilization: f64,
    last_update: f64,

    active_energy: f64,
    sleep_energy: f64,
}

impl Host {
    pub fn new(id: u32, name: String, config: &HostConfig, power_on_off: bool, energy_saving: bool) -> Result<Self> {
        if config.cores == 0 || !(config.core_mips > 0.) {
            return Err(SleepSimError::InvalidConfig(format!(
                "host {} should have positive number of cores and core MIPS",
                name
            )));
        }
        let frequencies = config.frequencies.clone();
        if frequencies.is_empty()
            || frequencies.iter().any(|f| !(*f > 0.))
            || frequencies.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(SleepSimError::InvalidConfig(format!(
                "host {} frequencies should be positive and ascending, got {:?}",
                name, frequencies
            )));
        }
        let power_model = power_model_resolver(&config.power_model)?;
        if let Some(steps) = power_model.steps() {
            if steps < frequencies.len() {
                return Err(SleepSimError::FrequencyIndexOutOfRange {
                    index: frequencies.len() - 1,
                    steps,
                });
            }
            if steps > frequencies.len() {
                return Err(SleepSimError::InvalidConfig(format!(
                    "host {} has {} frequencies but power model has {} steps",
                    name,
                    frequencies.len(),
                    steps
                )));
            }
        }
        let cores = (0..config.cores)
            .map(|_| Core::new(config.core_mips, config.governor.clone(), frequencies.len()))
            .collect::<Result<Vec<_>>>()?;
        let sleep = SleepStateMachine::new(
            id,
            config.sleep_states.clone(),
            config.energy_saving_tier.clone(),
            energy_saving,
        )?;
        Ok(Self {
            id,
            name,
            cores,
            frequencies,
            memory_total: config.memory,
            mips_allocated: 0.,
            memory_allocated: 0,
            power_model,
            power_on_off,
            sleep,
            vms: BTreeMap::new(),
            previous_utilization: 0.,
            utilization: 0.,
            last_update: 0.,
            active_energy: 0.,
            sleep_energy: 0.,
        })
    }

    /// MIPS of all cores at the highest frequency.
    pub fn max_capacity(&self) -> f64 {
        let top = self.frequencies.len() - 1;
        self.cores.iter().map(|c| c.mips_at(&self.frequencies, top)).sum()
    }

    /// MIPS of all cores at their current frequencies.
    pub fn capacity(&self) -> f64 {
        self.cores.iter().map(|c| c.capacity(&self.frequencies)).sum()
    }

    /// Total MIPS requested by running VMs.
    pub fn demand(&self) -> f64 {
        self.vms.values().map(|vm| vm.demand()).sum()
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// Frequency step driving the power model, taken from the first core.
    pub fn frequency_index(&self) -> usize {
        self.cores[0].frequency_index
    }

    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    pub fn previous_utilization(&self) -> f64 {
        self.previous_utilization
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

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.vms.values()
    }

    pub fn vm(&self, vm_id: u32) -> Option<&VirtualMachine> {
        self.vms.get(&vm_id)
    }

    pub fn can_allocate(&self, vm: &VmSpec) -> AllocationVerdict {
        if self.mips_allocated + vm.mips > self.max_capacity() {
            return AllocationVerdict::NotEnoughCPU;
        }
        if self.memory_allocated + vm.memory > self.memory_total {
            return AllocationVerdict::NotEnoughMemory;
        }
        AllocationVerdict::Success
    }

    pub fn add_vm(&mut self, vm: VmSpec, time: f64) {
        self.mips_allocated += vm.mips;
        self.memory_allocated += vm.memory;
        self.vms.insert(vm.id, VirtualMachine::new(vm, time));
        self.refresh_utilization();
    }

    pub fn remove_vm(&mut self, vm_id: u32) -> Option<VirtualMachine> {
        let vm = self.vms.remove(&vm_id)?;
        self.mips_allocated = (self.mips_allocated - vm.spec.mips).max(0.);
        self.memory_allocated -= vm.spec.memory;
        self.refresh_utilization();
        Some(vm)
    }

    /// Returns ids of VMs whose cloudlets have all completed.
    pub fn finished_vms(&self) -> Vec<u32> {
        self.vms.values().filter(|vm| vm.is_finished()).map(|vm| vm.id()).collect()
    }

    /// Recomputes utilization after the VM set or the power state has changed.
    pub fn refresh_utilization(&mut self) {
        self.utilization = if self.sleep.state().is_active() {
            (self.demand() / self.capacity()).min(1.)
        } else {
            0.
        };
    }

    /// Executes VMs since the last update, returns completed cloudlets.
    ///
    /// VMs share the current capacity proportionally to their demand and make no progress
    /// while the host is not active.
    pub fn update_processing(&mut self, time: f64) -> Vec<CompletedCloudlet> {
        let dt = time - self.last_update;
        let mut completed = Vec::new();
        if dt > 0. {
            self.previous_utilization = self.utilization;
            if self.sleep.state().is_active() {
                let scale = self.rate_scale();
                for vm in self.vms.values_mut() {
                    let rate = vm.demand() * scale;
                    if rate > 0. {
                        for cloudlet in vm.progress(rate, dt) {
                            completed.push(CompletedCloudlet {
                                vm_id: vm.id(),
                                owner: vm.spec.owner,
                                cloudlet,
                            });
                        }
                    }
                }
            }
            self.last_update = time;
        }
        self.refresh_utilization();
        completed
    }

    fn rate_scale(&self) -> f64 {
        let demand = self.demand();
        let capacity = self.capacity();
        if demand > capacity {
            capacity / demand
        } else {
            1.
        }
    }

    /// Returns the time of the earliest cloudlet completion.
    pub fn next_event_time(&self) -> Option<f64> {
        if !self.sleep.state().is_active() {
            return None;
        }
        let scale = self.rate_scale();
        self.vms
            .values()
            .filter_map(|vm| vm.time_to_next_completion(vm.demand() * scale))
            .min_by(|a, b| a.total_cmp(b))
            .map(|t| self.last_update + t)
    }

    /// Accounts the energy consumed during the last `dt` seconds, returns `(active, sleep)` energy.
    pub fn accrue_energy(&mut self, dt: f64) -> Result<(f64, f64)> {
        if self.sleep.state().is_active() {
            let energy = energy_linear_interpolation(
                self.power_model.as_ref(),
                self.previous_utilization,
                self.utilization,
                self.frequency_index(),
                dt,
                self.power_on_off,
            )?;
            self.active_energy += energy;
            Ok((energy, 0.))
        } else {
            let energy = self.sleep.accrue(dt)?;
            self.sleep_energy += energy;
            Ok((0., energy))
        }
    }

    /// Lets the core governors pick frequencies for the current demand.
    pub fn apply_governors(&mut self) {
        let per_core = self.demand() / self.cores.len() as f64;
        for core in self.cores.iter_mut() {
            core.apply_governor(&self.frequencies, per_core);
        }
        self.refresh_utilization();
    }
}
