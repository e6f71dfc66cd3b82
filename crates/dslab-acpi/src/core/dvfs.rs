//! CPU cores with frequency scaling governors.

use serde::Serialize;

use crate::core::config::GovernorConfig;
use crate::core::error::{Result, SleepSimError};

/// A CPU core running at one of the host frequency steps.
#[derive(Clone, Debug, Serialize)]
pub struct Core {
    /// MIPS at the highest frequency.
    pub mips: f64,
    pub frequency_index: usize,
    pub governor: GovernorConfig,
}

impl Core {
    /// Creates a core, initial frequency is chosen by the governor for an idle core.
    pub fn new(mips: f64, governor: GovernorConfig, steps: usize) -> Result<Self> {
        if steps == 0 {
            return Err(SleepSimError::InvalidConfig("host has no frequency steps".to_string()));
        }
        let frequency_index = match governor {
            GovernorConfig::Powersave => 0,
            GovernorConfig::Userspace { index } => {
                if index >= steps {
                    return Err(SleepSimError::FrequencyIndexOutOfRange { index, steps });
                }
                index
            }
            GovernorConfig::Performance | GovernorConfig::Ondemand { .. } | GovernorConfig::Conservative { .. } => {
                steps - 1
            }
        };
        Ok(Self {
            mips,
            frequency_index,
            governor,
        })
    }

    /// Returns MIPS available at the given frequency step.
    pub fn mips_at(&self, frequencies: &[f64], index: usize) -> f64 {
        self.mips * frequencies[index] / 100.
    }

    /// Returns MIPS available at the current frequency.
    pub fn capacity(&self, frequencies: &[f64]) -> f64 {
        self.mips_at(frequencies, self.frequency_index)
    }

    /// Updates the frequency according to the governor given the demand in MIPS placed on this core.
    pub fn apply_governor(&mut self, frequencies: &[f64], demand: f64) {
        let top = frequencies.len() - 1;
        let utilization = (demand / self.capacity(frequencies)).min(1.) * 100.;
        self.frequency_index = match self.governor {
            GovernorConfig::Performance => top,
            GovernorConfig::Powersave => 0,
            GovernorConfig::Userspace { index } => index,
            GovernorConfig::Ondemand { up_threshold } => {
                if utilization >= up_threshold {
                    top
                } else {
                    (0..=top)
                        .find(|&i| demand / self.mips_at(frequencies, i) * 100. < up_threshold)
                        .unwrap_or(top)
                }
            }
            GovernorConfig::Conservative {
                up_threshold,
                down_threshold,
            } => {
                if utilization > up_threshold && self.frequency_index < top {
                    self.frequency_index + 1
                } else if utilization < down_threshold && self.frequency_index > 0 {
                    self.frequency_index - 1
                } else {
                    self.frequency_index
                }
            }
        };
    }
}
