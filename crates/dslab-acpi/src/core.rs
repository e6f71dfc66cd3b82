pub mod allocation_policy;
pub mod common;
pub mod config;
pub mod datacenter;
pub mod dvfs;
pub mod energy_report;
pub mod error;
pub mod events;
pub mod host;
pub mod power_model;
pub mod sleep_state;
pub mod strategies;
pub mod strategy;
pub mod user;
pub mod vm;
