pub mod synthetic_workload;
