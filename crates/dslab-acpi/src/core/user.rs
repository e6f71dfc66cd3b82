//! Datacenter user.

use serde::Serialize;

use simcore::cast;
use simcore::log_debug;
use simcore::{Event, EventHandler, SimulationContext};

use crate::core::events::vm::{CloudletReturn, VmCreate, VmCreateAck};
use crate::core::vm::VmSpec;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AckRecord {
    pub time: f64,
    pub vm_id: u32,
    pub success: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CloudletRecord {
    pub time: f64,
    pub cloudlet_id: u32,
    pub vm_id: u32,
    pub host_id: u32,
}

/// Submits VMs to the datacenter and records the responses.
pub struct CloudUser {
    pub id: u32,
    datacenter_id: u32,
    acks: Vec<AckRecord>,
    cloudlets: Vec<CloudletRecord>,
    ctx: SimulationContext,
}

impl CloudUser {
    pub fn new(datacenter_id: u32, ctx: SimulationContext) -> Self {
        Self {
            id: ctx.id(),
            datacenter_id,
            acks: Vec::new(),
            cloudlets: Vec::new(),
            ctx,
        }
    }

    /// Sends VM creation request, `vm.owner` is set to this user.
    pub fn submit_vm(&self, mut vm: VmSpec, delay: f64) {
        vm.owner = self.id;
        self.ctx.emit(VmCreate { vm }, self.datacenter_id, delay);
    }

    pub fn acks(&self) -> &[AckRecord] {
        &self.acks
    }

    pub fn ack(&self, vm_id: u32) -> Option<&AckRecord> {
        self.acks.iter().find(|a| a.vm_id == vm_id)
    }

    pub fn returned_cloudlets(&self) -> &[CloudletRecord] {
        &self.cloudlets
    }
}

impl EventHandler for CloudUser {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            VmCreateAck {
                datacenter_id: _,
                vm_id,
                success,
            } => {
                log_debug!(self.ctx, "vm {} created: {}", vm_id, success);
                self.acks.push(AckRecord {
                    time: self.ctx.time(),
                    vm_id,
                    success,
                });
            }
            CloudletReturn {
                cloudlet_id,
                vm_id,
                host_id,
                performance_metric: _,
            } => {
                log_debug!(self.ctx, "cloudlet {} of vm {} returned", cloudlet_id, vm_id);
                self.cloudlets.push(CloudletRecord {
                    time: self.ctx.time(),
                    cloudlet_id,
                    vm_id,
                    host_id,
                });
            }
        })
    }
}
