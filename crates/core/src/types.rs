//! Telemetry value types shared by sources and the decision engine.

use serde::{Deserialize, Serialize};

/// One point-in-time reading of accelerator power and clock state.
///
/// Produced fresh by every [`TelemetrySource::sample`](crate::telemetry::TelemetrySource::sample)
/// call and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerMetrics {
    /// Current power draw in watts.
    pub power_usage: f64,
    /// GPU core temperature in degrees Celsius.
    pub temperature: f64,
    /// Graphics clock in MHz.
    pub clock_speed: u32,
    /// Memory clock in MHz.
    pub memory_clock: u32,
}

impl PowerMetrics {
    pub fn new(power_usage: f64, temperature: f64, clock_speed: u32, memory_clock: u32) -> Self {
        Self {
            power_usage,
            temperature,
            clock_speed,
            memory_clock,
        }
    }
}
