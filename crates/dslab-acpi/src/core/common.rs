use serde::Serialize;

#[derive(Debug, PartialEq)]
pub enum AllocationVerdict {
    NotEnoughCPU,
    NotEnoughMemory,
    Success,
}

/// Result of a successful VM placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub host_id: u32,
    /// Time until the host is able to run the VM.
    pub latency: f64,
}
