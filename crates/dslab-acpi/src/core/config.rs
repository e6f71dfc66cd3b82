//! Datacenter configuration.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SleepSimError};
use crate::core::sleep_state::SleepPhase;

/// Power draw in W and duration in seconds of a single sleep-state phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseCost {
    pub power: f64,
    pub time: f64,
}

/// Costs of a sleep tier: entering it, leaving it and staying in it.
///
/// `staying.power` is the steady draw per second, zero models a true power-off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcpiStateData {
    pub entering: PhaseCost,
    pub leaving: PhaseCost,
    pub staying: PhaseCost,
}

impl AcpiStateData {
    /// Creates tier costs from `(power, time)` pairs.
    pub fn new(entering: (f64, f64), leaving: (f64, f64), staying: (f64, f64)) -> Self {
        Self {
            entering: PhaseCost {
                power: entering.0,
                time: entering.1,
            },
            leaving: PhaseCost {
                power: leaving.0,
                time: leaving.1,
            },
            staying: PhaseCost {
                power: staying.0,
                time: staying.1,
            },
        }
    }

    /// Returns the cost of the given sleep phase.
    pub fn cost(&self, phase: SleepPhase) -> PhaseCost {
        match phase {
            SleepPhase::Entering => self.entering,
            SleepPhase::Leaving => self.leaving,
            SleepPhase::Staying => self.staying,
        }
    }

    pub(crate) fn validate(&self, tier: &str) -> Result<()> {
        for (name, cost) in [
            ("entering", self.entering),
            ("leaving", self.leaving),
            ("staying", self.staying),
        ] {
            if !(cost.time >= 0.) || !(cost.power >= 0.) {
                return Err(SleepSimError::InvalidConfig(format!(
                    "tier {} has negative {} cost ({} W, {} s)",
                    tier, name, cost.power, cost.time
                )));
            }
        }
        Ok(())
    }
}

/// Sleep tiers of a host ordered from the shallowest to the deepest one.
pub type SleepStateTable = IndexMap<String, AcpiStateData>;

/// Host power model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PowerModelConfig {
    /// Idle and full-load power for each frequency step.
    DvfsTable { idle: Vec<f64>, full: Vec<f64> },
    /// Frequency-independent linear model.
    Linear { idle: f64, full: f64 },
}

/// DVFS governor configuration, thresholds are in percent of utilization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernorConfig {
    Performance,
    Powersave,
    Userspace { index: usize },
    Ondemand { up_threshold: f64 },
    Conservative { up_threshold: f64, down_threshold: f64 },
}

impl Default for GovernorConfig {
    fn default() -> Self {
        GovernorConfig::Performance
    }
}

/// Energy-saving strategy of the datacenter controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Population-trend driven mix of a shallow and a deep tier.
    Adaptive {
        check_interval: f64,
        shallow_tier: String,
        deep_tier: String,
    },
    /// Sleep as soon as the host is empty, wake as soon as a VM is assigned.
    Greedy,
    /// Escalate to the next deeper tier after a fixed dwell time.
    Timeout {
        #[serde(default = "default_dwell_threshold")]
        dwell_threshold: f64,
        #[serde(default = "default_reentry_wait")]
        reentry_wait: f64,
        #[serde(default)]
        reentry_wait_overrides: BTreeMap<u32, f64>,
    },
}

fn default_dwell_threshold() -> f64 {
    75.
}

fn default_reentry_wait() -> f64 {
    40.
}

impl StrategyConfig {
    /// Timeout strategy with default dwell threshold and re-entry wait.
    pub fn timeout() -> Self {
        StrategyConfig::Timeout {
            dwell_threshold: default_dwell_threshold(),
            reentry_wait: default_reentry_wait(),
            reentry_wait_overrides: BTreeMap::new(),
        }
    }
}

fn default_frequencies() -> Vec<f64> {
    vec![100.]
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Full name is produced by appending host instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Number of such hosts.
    pub count: Option<u32>,
    /// Number of CPU cores.
    pub cores: u32,
    /// MIPS of a single core at the highest frequency.
    pub core_mips: f64,
    /// Memory capacity in MB.
    pub memory: u64,
    /// Available CPU frequencies in percent of the highest one, in increasing order.
    #[serde(default = "default_frequencies")]
    pub frequencies: Vec<f64>,
    /// Governor used by all cores of the host.
    #[serde(default)]
    pub governor: GovernorConfig,
    pub power_model: PowerModelConfig,
    #[serde(default)]
    pub sleep_states: SleepStateTable,
    /// Tier the host enters when it becomes idle, the shallowest tier by default.
    pub energy_saving_tier: Option<String>,
}

impl HostConfig {
    /// Returns the names of hosts described by this entry.
    pub fn host_names(&self) -> Result<Vec<String>> {
        let count = self.count.unwrap_or(1);
        if count == 1 {
            if let Some(name) = &self.name {
                return Ok(vec![name.clone()]);
            }
        }
        match &self.name_prefix {
            Some(prefix) => Ok((1..=count).map(|i| format!("{}{}", prefix, i)).collect()),
            None => Err(SleepSimError::InvalidConfig(
                "host config should have name (count = 1) or name_prefix".to_string(),
            )),
        }
    }
}

/// Holds raw datacenter config parsed from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDatacenterConfig {
    pub tick_interval: Option<f64>,
    pub power_on_off: Option<bool>,
    pub energy_saving: Option<bool>,
    pub strategy: Option<StrategyConfig>,
    pub hosts: Option<Vec<HostConfig>>,
}

/// Represents datacenter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacenterConfig {
    /// Interval in seconds between periodic controller ticks.
    pub tick_interval: f64,
    /// Whether an active host without load draws no power.
    pub power_on_off: bool,
    /// Whether hosts are put into sleep tiers.
    pub energy_saving: bool,
    pub strategy: StrategyConfig,
    pub hosts: Vec<HostConfig>,
}

impl Default for DatacenterConfig {
    fn default() -> Self {
        Self {
            tick_interval: 1.,
            power_on_off: true,
            energy_saving: true,
            strategy: StrategyConfig::Greedy,
            hosts: Vec::new(),
        }
    }
}

impl DatacenterConfig {
    /// Creates datacenter config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self> {
        let data = std::fs::read_to_string(file_name).map_err(|source| SleepSimError::ConfigIo {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_str(&data)
    }

    /// Creates datacenter config from YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(data: &str) -> Result<Self> {
        let raw: RawDatacenterConfig = serde_yaml::from_str(data)?;
        let default = Self::default();
        let config = Self {
            tick_interval: raw.tick_interval.unwrap_or(default.tick_interval),
            power_on_off: raw.power_on_off.unwrap_or(default.power_on_off),
            energy_saving: raw.energy_saving.unwrap_or(default.energy_saving),
            strategy: raw.strategy.unwrap_or(default.strategy),
            hosts: raw.hosts.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks values which do not depend on a particular host.
    pub fn validate(&self) -> Result<()> {
        if !(self.tick_interval > 0.) {
            return Err(SleepSimError::InvalidConfig(format!(
                "tick interval should be positive, got {}",
                self.tick_interval
            )));
        }
        match &self.strategy {
            StrategyConfig::Adaptive {
                check_interval,
                shallow_tier,
                deep_tier,
            } => {
                if !(*check_interval > 0.) {
                    return Err(SleepSimError::InvalidConfig(format!(
                        "check interval should be positive, got {}",
                        check_interval
                    )));
                }
                if shallow_tier == deep_tier {
                    return Err(SleepSimError::InvalidConfig(format!(
                        "shallow and deep tiers should differ, both are {}",
                        shallow_tier
                    )));
                }
            }
            StrategyConfig::Timeout {
                dwell_threshold,
                reentry_wait,
                reentry_wait_overrides,
            } => {
                if *dwell_threshold < 0. || *reentry_wait < 0. || reentry_wait_overrides.values().any(|w| *w < 0.) {
                    return Err(SleepSimError::InvalidConfig(
                        "timeout strategy durations should be non-negative".to_string(),
                    ));
                }
            }
            StrategyConfig::Greedy => {}
        }
        Ok(())
    }
}
