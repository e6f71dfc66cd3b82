//! VM allocation policies.

use std::collections::{BTreeMap, HashMap};

use crate::core::common::{AllocationVerdict, Placement};
use crate::core::error::{Result, SleepSimError};
use crate::core::host::Host;
use crate::core::sleep_state::{PowerState, SleepPhase};
use crate::core::vm::{VirtualMachine, VmSpec};

/// Trait for implementation of VM allocation policies.
///
/// The policy selects host for a new VM, places the VM on it and keeps track of VM locations.
/// If the selected host is sleeping, the policy is responsible for starting its wake-up.
pub trait VmAllocationPolicy {
    /// Places VM on some host, returns `None` if there is no suitable host.
    fn allocate(&mut self, vm: VmSpec, hosts: &mut BTreeMap<u32, Host>, time: f64) -> Result<Option<Placement>>;

    /// Removes VM from its host.
    fn deallocate(&mut self, vm_id: u32, hosts: &mut BTreeMap<u32, Host>) -> Option<VirtualMachine>;

    fn host_of(&self, vm_id: u32) -> Option<u32>;

    /// Live consolidation of VMs across hosts.
    fn optimize_allocation(&mut self, _hosts: &mut BTreeMap<u32, Host>) -> Result<Vec<(u32, u32)>> {
        Err(SleepSimError::Unsupported("VM consolidation"))
    }
}

/// Sleep-state aware allocation policy.
///
/// Hosts are tried in the following order, the first host able to accept the VM wins:
///
/// 1. active hosts;
/// 2. hosts leaving a sleep tier, from the shallowest tier to the deepest one;
/// 3. hosts staying in a sleep tier, from the shallowest tier to the deepest one. Such host is woken up.
///
/// Hosts entering a tier and hosts in the middle of a tier change are never chosen.
/// The placement latency is the time left until the host becomes active.
#[derive(Default)]
pub struct AcpiAllocationPolicy {
    vm_hosts: HashMap<u32, u32>,
}

impl AcpiAllocationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    fn select_host(vm: &VmSpec, hosts: &BTreeMap<u32, Host>) -> Option<u32> {
        let mut leaving = Vec::new();
        let mut staying = Vec::new();
        for host in hosts.values() {
            if host.sleep.is_state_changing() || host.can_allocate(vm) != AllocationVerdict::Success {
                continue;
            }
            match host.sleep.state() {
                PowerState::Active => return Some(host.id),
                PowerState::Sleeping { tier, phase } => {
                    let depth = host.sleep.depth(tier).unwrap_or(usize::MAX);
                    match phase {
                        SleepPhase::Leaving => leaving.push((depth, host.id)),
                        SleepPhase::Staying => staying.push((depth, host.id)),
                        SleepPhase::Entering => {}
                    }
                }
            }
        }
        leaving.sort();
        staying.sort();
        leaving.first().or_else(|| staying.first()).map(|(_, id)| *id)
    }
}

impl VmAllocationPolicy for AcpiAllocationPolicy {
    fn allocate(&mut self, vm: VmSpec, hosts: &mut BTreeMap<u32, Host>, time: f64) -> Result<Option<Placement>> {
        let host_id = match Self::select_host(&vm, hosts) {
            Some(id) => id,
            None => return Ok(None),
        };
        let host = hosts.get_mut(&host_id).ok_or(SleepSimError::UnknownHost(host_id))?;
        let latency = match host.sleep.state() {
            PowerState::Active => 0.,
            PowerState::Sleeping {
                phase: SleepPhase::Leaving,
                ..
            } => host.sleep.leaving_time(),
            PowerState::Sleeping { .. } => host.sleep.begin_wake(time)?,
        };
        self.vm_hosts.insert(vm.id, host_id);
        host.add_vm(vm, time);
        Ok(Some(Placement { host_id, latency }))
    }

    fn deallocate(&mut self, vm_id: u32, hosts: &mut BTreeMap<u32, Host>) -> Option<VirtualMachine> {
        let host_id = self.vm_hosts.remove(&vm_id)?;
        hosts.get_mut(&host_id)?.remove_vm(vm_id)
    }

    fn host_of(&self, vm_id: u32) -> Option<u32> {
        self.vm_hosts.get(&vm_id).copied()
    }
}
