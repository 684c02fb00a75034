//! Batch scaling and efficiency recommendations.
//!
//! Pure logic: every function here works on samples the caller already has,
//! so it can be tested without a telemetry source.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PowerError, Result};
use crate::types::PowerMetrics;

/// Memory-management tips returned with every recommendation.
pub const MEMORY_TIPS: &[&str] = &[
    "Load large tensors to GPU only when needed",
    "Delete unnecessary intermediate results",
    "Use torch.no_grad() when gradient computation is not needed",
];

/// Runtime-optimization tips returned with every recommendation.
pub const RUNTIME_TIPS: &[&str] = &[
    "Perform data preprocessing on CPU",
    "Use half precision (FP16) when possible",
    "Consider integrating batch normalization layers",
];

/// What to do when the current power reading is zero and a ratio against it
/// is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroPowerPolicy {
    /// Treat the power ratio as neutral (1.0) and log a warning.
    #[default]
    Substitute,
    /// Fail with [`PowerError::DivisionGuardTriggered`].
    Reject,
}

impl fmt::Display for ZeroPowerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Substitute => write!(f, "substitute"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for ZeroPowerPolicy {
    type Err = PowerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substitute" => Ok(Self::Substitute),
            "reject" => Ok(Self::Reject),
            other => Err(PowerError::InvalidInput(format!(
                "unknown zero power policy '{other}' (expected 'substitute' or 'reject')"
            ))),
        }
    }
}

/// Structured power-efficiency recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyConfig {
    /// Suggested multiplier for the batch size, in `[0, 1]`.
    pub batch_factor: f64,
    pub memory_tips: &'static [&'static str],
    pub runtime_tips: &'static [&'static str],
}

impl EfficiencyConfig {
    pub fn new(batch_factor: f64) -> Self {
        Self {
            batch_factor,
            memory_tips: MEMORY_TIPS,
            runtime_tips: RUNTIME_TIPS,
        }
    }
}

/// Scale `requested` down in proportion to how far `current_power` overshoots
/// `target_power`.
///
/// Treats power draw as roughly linear in batch size. Returns `requested`
/// unchanged when the device is at or below target, including when it reports
/// zero power (nothing to divide by, nothing to scale).
pub fn scale_batch_size(requested: usize, target_power: f64, current_power: f64) -> usize {
    let overshoots = current_power > target_power;
    if current_power <= 0.0 || !overshoots {
        return requested;
    }

    let scaled = (requested as f64 * (target_power / current_power)).floor();
    (scaled as usize).clamp(1, requested.max(1))
}

/// Headroom of the `current` sample relative to `baseline`.
///
/// `min(power_factor * temp_factor, 1.0)` with
/// `power_factor = baseline.power / current.power` and
/// `temp_factor = 1 - current.temperature / 100`, floored at 0.
pub fn batch_factor(
    baseline: &PowerMetrics,
    current: &PowerMetrics,
    policy: ZeroPowerPolicy,
) -> Result<f64> {
    let temp_factor = 1.0 - current.temperature / 100.0;

    let power_factor = if current.power_usage > 0.0 {
        baseline.power_usage / current.power_usage
    } else {
        match policy {
            ZeroPowerPolicy::Substitute => {
                tracing::warn!(
                    baseline_watts = baseline.power_usage,
                    "Current power reads zero, using neutral power factor",
                );
                1.0
            }
            ZeroPowerPolicy::Reject => {
                return Err(PowerError::DivisionGuardTriggered {
                    operation: "batch_factor",
                })
            }
        }
    };

    Ok((power_factor * temp_factor).clamp(0.0, 1.0))
}
