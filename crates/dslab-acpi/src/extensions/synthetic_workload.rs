//! Random workload generator.

use serde::{Deserialize, Serialize};

use simcore::Simulation;

use crate::core::vm::{CloudletSpec, VmSpec};
use crate::simulation::AcpiSimulation;

/// Parameters of generated workload, values are drawn uniformly from the given ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticWorkload {
    pub vm_count: u32,
    /// VM arrival times are drawn from `[0, arrival_window)`.
    pub arrival_window: f64,
    pub vm_mips: (f64, f64),
    pub vm_memory: u64,
    /// Inclusive range of cloudlet count per VM.
    pub cloudlets_per_vm: (u32, u32),
    pub cloudlet_length: (f64, f64),
    pub performance_metric: f64,
}

/// Generated VM request with its arrival time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmRequest {
    pub start_time: f64,
    pub vm: VmSpec,
}

fn uniform(sim: &mut Simulation, range: (f64, f64)) -> f64 {
    if range.1 > range.0 {
        sim.gen_range(range.0..range.1)
    } else {
        range.0
    }
}

impl SyntheticWorkload {
    /// Draws VM requests from the simulation random generator, returns them ordered by arrival time.
    pub fn generate(&self, sim: &mut Simulation) -> Vec<VmRequest> {
        let mut cloudlet_id = 0;
        let mut requests = Vec::with_capacity(self.vm_count as usize);
        for vm_id in 0..self.vm_count {
            let start_time = uniform(sim, (0., self.arrival_window));
            let mips = uniform(sim, self.vm_mips);
            let (min_count, max_count) = self.cloudlets_per_vm;
            let count = if max_count > min_count {
                sim.gen_range(min_count..=max_count)
            } else {
                min_count
            };
            let cloudlets = (0..count)
                .map(|_| {
                    cloudlet_id += 1;
                    CloudletSpec::new(
                        cloudlet_id - 1,
                        uniform(sim, self.cloudlet_length),
                        self.performance_metric,
                    )
                })
                .collect();
            requests.push(VmRequest {
                start_time,
                vm: VmSpec::new(vm_id, 0, mips, self.vm_memory, cloudlets),
            });
        }
        requests.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        requests
    }

    /// Generates workload and submits it on behalf of the user, returns the number of submitted VMs.
    pub fn submit(&self, sim: &mut AcpiSimulation, user_id: u32) -> usize {
        let requests = self.generate(sim.sim());
        let now = sim.current_time();
        for request in requests.iter() {
            sim.submit_vm_with_delay(user_id, request.vm.clone(), (request.start_time - now).max(0.));
        }
        requests.len()
    }
}
