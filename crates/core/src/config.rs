//! Environment-driven configuration for the power guard.
//!
//! Every setting has a default, so an empty environment yields a usable
//! single-GPU configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::efficiency::ZeroPowerPolicy;
use crate::error::{PowerError, Result};
use crate::safety::{SafetyLimits, DEFAULT_TEMPERATURE_LIMIT_C};

pub const ENV_DEVICE_INDEX: &str = "WATTGATE_DEVICE_INDEX";
pub const ENV_TARGET_POWER_WATTS: &str = "WATTGATE_TARGET_POWER_WATTS";
pub const ENV_POWER_LIMIT_WATTS: &str = "WATTGATE_POWER_LIMIT_WATTS";
pub const ENV_TEMPERATURE_LIMIT_C: &str = "WATTGATE_TEMPERATURE_LIMIT_C";
pub const ENV_SAMPLE_TIMEOUT_MS: &str = "WATTGATE_SAMPLE_TIMEOUT_MS";
pub const ENV_MONITOR_INTERVAL_MS: &str = "WATTGATE_MONITOR_INTERVAL_MS";
pub const ENV_ZERO_POWER_POLICY: &str = "WATTGATE_ZERO_POWER_POLICY";

const DEFAULT_TARGET_POWER_WATTS: f64 = 200.0;
const DEFAULT_POWER_LIMIT_WATTS: f64 = 250.0;
const DEFAULT_SAMPLE_TIMEOUT_MS: u64 = 500;
const DEFAULT_MONITOR_INTERVAL_MS: u64 = 1000;

/// Power-guard configuration loaded from environment variables.
///
/// All fields have defaults matching a single-GPU training box; override via
/// environment variables or a `.env` file.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    /// NVML device index to bind (default: `0`).
    pub device_index: u32,
    /// Power draw the batch-size optimizer aims for (default: `200` W).
    pub target_power_watts: f64,
    /// Safety gate ceilings (default: `250` W, `80` °C).
    pub limits: SafetyLimits,
    /// Upper bound on one telemetry sample (default: `500` ms).
    pub sample_timeout: Duration,
    /// Background monitor polling interval (default: `1000` ms).
    pub monitor_interval: Duration,
    pub zero_power_policy: ZeroPowerPolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            target_power_watts: DEFAULT_TARGET_POWER_WATTS,
            limits: SafetyLimits::new(DEFAULT_POWER_LIMIT_WATTS),
            sample_timeout: Duration::from_millis(DEFAULT_SAMPLE_TIMEOUT_MS),
            monitor_interval: Duration::from_millis(DEFAULT_MONITOR_INTERVAL_MS),
            zero_power_policy: ZeroPowerPolicy::default(),
        }
    }
}

impl GuardConfig {
    /// Load `.env` (if present) and then read the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default      |
    /// |--------------------------------|--------------|
    /// | `WATTGATE_DEVICE_INDEX`        | `0`          |
    /// | `WATTGATE_TARGET_POWER_WATTS`  | `200.0`      |
    /// | `WATTGATE_POWER_LIMIT_WATTS`   | `250.0`      |
    /// | `WATTGATE_TEMPERATURE_LIMIT_C` | `80.0`       |
    /// | `WATTGATE_SAMPLE_TIMEOUT_MS`   | `500`        |
    /// | `WATTGATE_MONITOR_INTERVAL_MS` | `1000`       |
    /// | `WATTGATE_ZERO_POWER_POLICY`   | `substitute` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let device_index = parse_var(&lookup, ENV_DEVICE_INDEX, 0u32)?;
        let target_power_watts = parse_var(&lookup, ENV_TARGET_POWER_WATTS, DEFAULT_TARGET_POWER_WATTS)?;
        let power_limit = parse_var(&lookup, ENV_POWER_LIMIT_WATTS, DEFAULT_POWER_LIMIT_WATTS)?;
        let temperature_limit =
            parse_var(&lookup, ENV_TEMPERATURE_LIMIT_C, DEFAULT_TEMPERATURE_LIMIT_C)?;
        let sample_timeout_ms = parse_var(&lookup, ENV_SAMPLE_TIMEOUT_MS, DEFAULT_SAMPLE_TIMEOUT_MS)?;
        let monitor_interval_ms =
            parse_var(&lookup, ENV_MONITOR_INTERVAL_MS, DEFAULT_MONITOR_INTERVAL_MS)?;
        let zero_power_policy = parse_var(&lookup, ENV_ZERO_POWER_POLICY, ZeroPowerPolicy::default())?;

        let config = Self {
            device_index,
            target_power_watts,
            limits: SafetyLimits::new(power_limit).with_temperature(temperature_limit),
            sample_timeout: Duration::from_millis(sample_timeout_ms),
            monitor_interval: Duration::from_millis(monitor_interval_ms),
            zero_power_policy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.target_power_watts.is_finite() && self.target_power_watts > 0.0) {
            return Err(PowerError::Config(format!(
                "{ENV_TARGET_POWER_WATTS} must be positive, got {}",
                self.target_power_watts
            )));
        }
        self.limits
            .validate()
            .map_err(|e| PowerError::Config(e.to_string()))?;
        if self.sample_timeout.is_zero() {
            return Err(PowerError::Config(format!("{ENV_SAMPLE_TIMEOUT_MS} must be non-zero")));
        }
        if self.monitor_interval.is_zero() {
            return Err(PowerError::Config(format!("{ENV_MONITOR_INTERVAL_MS} must be non-zero")));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| PowerError::Config(format!("{key} is invalid ({raw:?}): {e}"))),
        _ => Ok(default),
    }
}
