//! Host power consumption models.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::config::PowerModelConfig;
use crate::core::error::{Result, SleepSimError};

/// Power model is a function, which computes the power consumption of an active host
/// based on its CPU utilization and current frequency step.
pub trait PowerModel: DynClone {
    /// Returns the power consumption in W.
    ///
    /// - `utilization` - host CPU utilization in [0, 1].
    /// - `frequency_index` - current frequency step of the host.
    fn get_power(&self, utilization: f64, frequency_index: usize) -> Result<f64>;

    /// Returns the number of frequency steps the model knows about, `None` if it is frequency-independent.
    fn steps(&self) -> Option<usize>;
}

clone_trait_object!(PowerModel);

/// Power model based on per-frequency idle and full-load power tables.
///
/// Computes power as `(1 - u) * idle[f] + u * full[f]`.
#[derive(Clone, Debug)]
pub struct DvfsTablePowerModel {
    idle: Vec<f64>,
    full: Vec<f64>,
}

impl DvfsTablePowerModel {
    pub fn new(idle: Vec<f64>, full: Vec<f64>) -> Result<Self> {
        if idle.is_empty() || idle.len() != full.len() {
            return Err(SleepSimError::InvalidConfig(format!(
                "power tables should be non-empty and of equal size, got {} idle and {} full values",
                idle.len(),
                full.len()
            )));
        }
        if idle.iter().zip(full.iter()).any(|(i, f)| *i < 0. || f < i) {
            return Err(SleepSimError::InvalidConfig(
                "full-load power should not be less than idle power".to_string(),
            ));
        }
        Ok(Self { idle, full })
    }

    /// SPECpower measurements of a six-step DVFS server.
    pub fn specpower_lad1() -> Self {
        Self {
            idle: vec![90., 94., 100., 104., 107., 34.],
            full: vec![170., 176., 182., 188., 193., 58.],
        }
    }
}

impl PowerModel for DvfsTablePowerModel {
    fn get_power(&self, utilization: f64, frequency_index: usize) -> Result<f64> {
        match (self.idle.get(frequency_index), self.full.get(frequency_index)) {
            (Some(idle), Some(full)) => Ok((1. - utilization) * idle + utilization * full),
            _ => Err(SleepSimError::FrequencyIndexOutOfRange {
                index: frequency_index,
                steps: self.idle.len(),
            }),
        }
    }

    fn steps(&self) -> Option<usize> {
        Some(self.idle.len())
    }
}

/// Simple linear power model which ignores the frequency.
#[derive(Clone, Debug)]
pub struct LinearPowerModel {
    idle: f64,
    full: f64,
}

impl LinearPowerModel {
    pub fn new(idle: f64, full: f64) -> Self {
        Self { idle, full }
    }
}

impl PowerModel for LinearPowerModel {
    fn get_power(&self, utilization: f64, _frequency_index: usize) -> Result<f64> {
        Ok(self.idle + utilization * (self.full - self.idle))
    }

    fn steps(&self) -> Option<usize> {
        None
    }
}

/// Builds power model from its configuration.
pub fn power_model_resolver(config: &PowerModelConfig) -> Result<Box<dyn PowerModel>> {
    match config {
        PowerModelConfig::DvfsTable { idle, full } => {
            Ok(Box::new(DvfsTablePowerModel::new(idle.clone(), full.clone())?))
        }
        PowerModelConfig::Linear { idle, full } => Ok(Box::new(LinearPowerModel::new(*idle, *full))),
    }
}

/// Computes the energy in W·s consumed by an active host over a timeframe of length `dt`
/// during which its utilization changed from `from` to `to`, using the trapezoid rule.
///
/// If `power_on_off` is set and the host had no load at the beginning of the timeframe,
/// the host is considered powered off and the energy is zero.
pub fn energy_linear_interpolation(
    model: &dyn PowerModel,
    from: f64,
    to: f64,
    frequency_index: usize,
    dt: f64,
    power_on_off: bool,
) -> Result<f64> {
    if power_on_off && from == 0. {
        return Ok(0.);
    }
    let p_from = model.get_power(from, frequency_index)?;
    let p_to = model.get_power(to, frequency_index)?;
    Ok((p_from + p_to) / 2. * dt)
}
