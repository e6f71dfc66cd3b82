//! Virtual machines and their cloudlets.

use serde::Serialize;

/// Unit of work executed by a VM.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CloudletSpec {
    pub id: u32,
    /// Length in MI.
    pub length: f64,
    /// Load weight contributed to the aggregate performance metric while the cloudlet is not finished.
    pub performance_metric: f64,
}

impl CloudletSpec {
    pub fn new(id: u32, length: f64, performance_metric: f64) -> Self {
        Self {
            id,
            length,
            performance_metric,
        }
    }
}

/// VM creation request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VmSpec {
    pub id: u32,
    /// Component id of the VM owner.
    pub owner: u32,
    /// Requested CPU capacity.
    pub mips: f64,
    /// Requested memory in MB.
    pub memory: u64,
    /// Cloudlets executed one after another.
    pub cloudlets: Vec<CloudletSpec>,
}

impl VmSpec {
    pub fn new(id: u32, owner: u32, mips: f64, memory: u64, cloudlets: Vec<CloudletSpec>) -> Self {
        Self {
            id,
            owner,
            mips,
            memory,
            cloudlets,
        }
    }

    /// Sum of performance metric weights of all cloudlets.
    pub fn performance_metric(&self) -> f64 {
        self.cloudlets.iter().map(|c| c.performance_metric).sum()
    }
}

/// Work amount in MI below which a cloudlet is considered completed.
const COMPLETION_TOLERANCE: f64 = 1e-6;

/// VM placed on a host.
#[derive(Clone, Debug, Serialize)]
pub struct VirtualMachine {
    pub spec: VmSpec,
    pub placement_time: f64,
    current: usize,
    remaining: f64,
}

impl VirtualMachine {
    pub fn new(spec: VmSpec, placement_time: f64) -> Self {
        let remaining = spec.cloudlets.first().map_or(0., |c| c.length);
        Self {
            spec,
            placement_time,
            current: 0,
            remaining,
        }
    }

    pub fn id(&self) -> u32 {
        self.spec.id
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.spec.cloudlets.len()
    }

    /// CPU demand in MIPS, zero once all cloudlets are finished.
    pub fn demand(&self) -> f64 {
        if self.is_finished() {
            0.
        } else {
            self.spec.mips
        }
    }

    /// Currently running cloudlet.
    pub fn current_cloudlet(&self) -> Option<&CloudletSpec> {
        self.spec.cloudlets.get(self.current)
    }

    /// Remaining work of the running cloudlet in MI.
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Executes cloudlets at `rate` MIPS for `dt` seconds, returns the cloudlets completed meanwhile.
    /// Time left after a cloudlet completes is passed to the next one.
    pub fn progress(&mut self, rate: f64, dt: f64) -> Vec<CloudletSpec> {
        let mut completed = Vec::new();
        let mut budget = rate * dt;
        while !self.is_finished() {
            if self.remaining <= budget + COMPLETION_TOLERANCE {
                budget = (budget - self.remaining).max(0.);
                completed.push(self.spec.cloudlets[self.current].clone());
                self.current += 1;
                self.remaining = self.current_cloudlet().map_or(0., |c| c.length);
            } else {
                self.remaining -= budget;
                break;
            }
        }
        completed
    }

    /// Time until the running cloudlet completes at `rate` MIPS.
    pub fn time_to_next_completion(&self, rate: f64) -> Option<f64> {
        if self.is_finished() || rate <= 0. {
            None
        } else {
            Some(self.remaining / rate)
        }
    }
}
