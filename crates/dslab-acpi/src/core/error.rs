//! Errors raised by the power-state scheduler.

use thiserror::Error;

/// Error type of the crate.
///
/// Use [`SleepSimError::is_fatal`] to tell configuration errors, which make simulation results meaningless,
/// from recoverable ones.
#[derive(Error, Debug)]
pub enum SleepSimError {
    /// A sleep tier has no entry in the host's sleep-state table.
    #[error("host #{host_id} has no sleep-state configuration for tier {tier}")]
    MissingTierConfig { host_id: u32, tier: String },

    /// A frequency index is outside of the power model table.
    #[error("frequency index {index} is out of range, {steps} frequency steps are configured")]
    FrequencyIndexOutOfRange { index: usize, steps: usize },

    /// Operation is not supported by the current policy.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// Requested phase or tier change is not allowed from the current state.
    #[error("host #{host_id} can't change state from {from} to {to}")]
    InvalidTransition { host_id: u32, from: String, to: String },

    /// Host with specified id does not exist.
    #[error("unknown host #{0}")]
    UnknownHost(u32),

    /// Inconsistent configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file can't be read.
    #[error("can't read file {path}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not a valid YAML config.
    #[error("can't parse YAML config")]
    ConfigParse(#[from] serde_yaml::Error),
}

impl SleepSimError {
    /// Returns true if the error indicates an inconsistent simulation setup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SleepSimError::MissingTierConfig { .. }
                | SleepSimError::FrequencyIndexOutOfRange { .. }
                | SleepSimError::InvalidConfig(_)
                | SleepSimError::ConfigIo { .. }
                | SleepSimError::ConfigParse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SleepSimError>;
