//! End-of-run energy report.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HostEnergy {
    pub id: u32,
    pub name: String,
    pub active_energy: f64,
    pub sleep_energy: f64,
}

/// Host population after a processed timeframe.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PopulationSample {
    pub time: f64,
    pub active: usize,
    pub tiers: BTreeMap<String, usize>,
    pub leaving: usize,
    pub changing: usize,
}

/// Energy consumption of the datacenter, all energy values are in W·s.
#[derive(Serialize, Clone, Debug)]
pub struct EnergyReport {
    pub strategy: String,
    pub time: f64,
    pub total_energy: f64,
    pub active_energy: f64,
    pub sleep_energy: f64,
    /// Sum of VM creation delays caused by host wake-ups, in seconds.
    pub wake_latency: f64,
    pub hosts: Vec<HostEnergy>,
    pub population_history: Vec<PopulationSample>,
}

impl EnergyReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn host(&self, id: u32) -> Option<&HostEnergy> {
        self.hosts.iter().find(|h| h.id == id)
    }
}
