//! `wattgate-agent` -- hardware side of wattgate.
//!
//! Binds the decision core to real GPUs through NVML and runs the
//! background safety monitor on tokio.

pub mod monitor;
pub mod nvml;

pub use monitor::{MonitorReading, SafetyMonitor};
pub use nvml::{open_engine, NvmlSource};
