#![allow(dead_code)]

use std::io::Write;

use env_logger::Builder;

use dslab_acpi::core::config::{AcpiStateData, GovernorConfig, HostConfig, PowerModelConfig, SleepStateTable};
use dslab_acpi::core::host::Host;

/// Message-only logger, enabled with `RUST_LOG`.
pub fn init_logger() {
    let _ = Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .is_test(true)
        .try_init();
}

pub fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

/// S2, S3 and G2 tiers ordered from the shallowest one.
pub fn tiers() -> SleepStateTable {
    let mut tiers = SleepStateTable::new();
    tiers.insert("S2".to_string(), AcpiStateData::new((27., 3.), (36., 8.), (6.2, 0.)));
    tiers.insert("S3".to_string(), AcpiStateData::new((36., 7.), (42., 28.), (0., 5.)));
    tiers.insert("G2".to_string(), AcpiStateData::new((30., 4.), (40., 44.), (5., 0.)));
    tiers
}

pub fn host_config(energy_saving_tier: Option<&str>) -> HostConfig {
    HostConfig {
        name: Some("host".to_string()),
        name_prefix: None,
        count: None,
        cores: 1,
        core_mips: 1000.,
        memory: 4096,
        frequencies: vec![100.],
        governor: GovernorConfig::Performance,
        power_model: PowerModelConfig::DvfsTable {
            idle: vec![90.],
            full: vec![170.],
        },
        sleep_states: tiers(),
        energy_saving_tier: energy_saving_tier.map(|t| t.to_string()),
    }
}

pub fn active_host(id: u32) -> Host {
    Host::new(id, format!("host{}", id), &host_config(None), false, true).unwrap()
}

/// Host staying in the given tier since time 0.
pub fn staying_host(id: u32, tier: &str) -> Host {
    let mut host = active_host(id);
    host.sleep.enter_tier(0., tier).unwrap();
    let (plan_id, time) = host.sleep.next_step().unwrap();
    host.sleep.advance(time, plan_id).unwrap();
    host
}

/// Host which started leaving the given tier at time 0.
pub fn leaving_host(id: u32, tier: &str) -> Host {
    let mut host = staying_host(id, tier);
    host.sleep.begin_wake(0.).unwrap();
    host
}
