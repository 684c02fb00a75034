//! Safety gate for workload loops.
//!
//! Pure evaluation of a sample against power and temperature ceilings. The
//! engine supplies a fresh sample on every call; nothing here is cached.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PowerError, Result};
use crate::types::PowerMetrics;

/// Temperature ceiling used when the caller only supplies a power limit.
pub const DEFAULT_TEMPERATURE_LIMIT_C: f64 = 80.0;

/// Upper bounds a workload must stay under to keep running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub power_watts: f64,
    pub temperature_celsius: f64,
}

impl SafetyLimits {
    /// Limits with the default 80 °C temperature ceiling.
    pub fn new(power_watts: f64) -> Self {
        Self {
            power_watts,
            temperature_celsius: DEFAULT_TEMPERATURE_LIMIT_C,
        }
    }

    pub fn with_temperature(mut self, temperature_celsius: f64) -> Self {
        self.temperature_celsius = temperature_celsius;
        self
    }

    /// Reject limits that would make every comparison false.
    pub fn validate(&self) -> Result<()> {
        if !self.power_watts.is_finite() {
            return Err(PowerError::InvalidInput(format!(
                "power limit must be finite, got {}",
                self.power_watts
            )));
        }
        if !self.temperature_celsius.is_finite() {
            return Err(PowerError::InvalidInput(format!(
                "temperature limit must be finite, got {}",
                self.temperature_celsius
            )));
        }
        Ok(())
    }
}

/// Outcome of one safety-gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SafetyStatus {
    WithinLimits,
    PowerExceeded { current_watts: f64, limit_watts: f64 },
    TemperatureExceeded { current_celsius: f64, limit_celsius: f64 },
}

impl SafetyStatus {
    pub fn is_within_limits(&self) -> bool {
        matches!(self, Self::WithinLimits)
    }
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WithinLimits => write!(f, "within limits"),
            Self::PowerExceeded {
                current_watts,
                limit_watts,
            } => write!(f, "power {current_watts:.1} W exceeds limit {limit_watts:.1} W"),
            Self::TemperatureExceeded {
                current_celsius,
                limit_celsius,
            } => write!(
                f,
                "temperature {current_celsius:.1} °C exceeds limit {limit_celsius:.1} °C"
            ),
        }
    }
}

/// Compare a sample against `limits`. Equality counts as within limits.
///
/// Power is checked before temperature, so a sample breaching both reports
/// the power breach. A NaN reading cannot be shown to be under its limit and
/// is reported as a breach.
pub fn evaluate(metrics: &PowerMetrics, limits: &SafetyLimits) -> SafetyStatus {
    let power_ok = metrics.power_usage <= limits.power_watts;
    if !power_ok {
        return SafetyStatus::PowerExceeded {
            current_watts: metrics.power_usage,
            limit_watts: limits.power_watts,
        };
    }
    let temperature_ok = metrics.temperature <= limits.temperature_celsius;
    if !temperature_ok {
        return SafetyStatus::TemperatureExceeded {
            current_celsius: metrics.temperature,
            limit_celsius: limits.temperature_celsius,
        };
    }
    SafetyStatus::WithinLimits
}
