//! Datacenter events.

// CONTROLLER EVENTS ///////////////////////////////////////////////////////////////////////////////

pub mod controller {
    use serde::Serialize;

    /// Wakes up the controller to process the elapsed timeframe.
    #[derive(Serialize, Clone)]
    pub struct PeriodicTick {}

    /// Stops periodic processing.
    #[derive(Serialize, Clone)]
    pub struct EndOfSimulation {}
}

// VM EVENTS ///////////////////////////////////////////////////////////////////////////////////////

pub mod vm {
    use serde::Serialize;

    use crate::core::vm::VmSpec;

    #[derive(Serialize, Clone)]
    pub struct VmCreate {
        pub vm: VmSpec,
    }

    #[derive(Serialize, Clone)]
    pub struct VmCreateAck {
        pub datacenter_id: u32,
        pub vm_id: u32,
        pub success: bool,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletReturn {
        pub cloudlet_id: u32,
        pub vm_id: u32,
        pub host_id: u32,
        pub performance_metric: f64,
    }

    #[derive(Serialize, Clone)]
    pub struct VmMigrate {
        pub vm_id: u32,
        pub target_host: u32,
    }
}

// POWER STATE EVENTS //////////////////////////////////////////////////////////////////////////////

pub mod power {
    use serde::Serialize;

    /// Requests host phase change, `phase` is the numeric code of
    /// [`TransitionPhase`](crate::core::sleep_state::TransitionPhase).
    #[derive(Serialize, Clone)]
    pub struct HostChangeSleepState {
        pub host_id: u32,
        pub phase: u8,
    }

    /// Switches host to the given tier and starts entering it.
    #[derive(Serialize, Clone)]
    pub struct HostChangeTier {
        pub host_id: u32,
        pub tier: String,
    }

    /// Next step of the host transition plan is due.
    #[derive(Serialize, Clone)]
    pub struct AdvanceTransition {
        pub host_id: u32,
        pub plan_id: u64,
    }
}
