//! NVML-backed telemetry source.
//!
//! [`NvmlSource`] owns an initialised NVIDIA Management Library session and
//! reads one device by index. The session is shut down when the source is
//! released or dropped, so a failed engine construction never leaks it.

use std::fmt;

use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;

use wattgate_core::{
    GuardConfig, PowerDecisionEngine, PowerError, PowerMetrics, Result, TelemetrySource,
    TimedSource,
};

const MILLIWATTS_PER_WATT: f64 = 1000.0;

/// NVML reports power draw in milliwatts.
pub fn milliwatts_to_watts(milliwatts: u32) -> f64 {
    f64::from(milliwatts) / MILLIWATTS_PER_WATT
}

/// Telemetry for a single NVIDIA GPU.
pub struct NvmlSource {
    nvml: Nvml,
    device_index: u32,
}

impl NvmlSource {
    /// Initialise NVML and bind GPU `device_index`.
    ///
    /// Fails with [`PowerError::DeviceInitFailed`] when NVML is missing
    /// (no drivers, no NVIDIA hardware) or the index is out of range.
    pub fn open(device_index: u32) -> Result<Self> {
        let nvml = Nvml::init().map_err(|e| {
            tracing::warn!(error = %e, "NVML unavailable -- GPU telemetry cannot be sampled");
            PowerError::DeviceInitFailed(format!("NVML initialisation failed: {e}"))
        })?;

        let device_count = nvml.device_count().map_err(|e| {
            PowerError::DeviceInitFailed(format!("failed to query GPU device count: {e}"))
        })?;
        if device_index >= device_count {
            return Err(PowerError::DeviceInitFailed(format!(
                "GPU index {device_index} out of range ({device_count} visible)"
            )));
        }

        let name = nvml
            .device_by_index(device_index)
            .and_then(|device| device.name())
            .map_err(|e| {
                PowerError::DeviceInitFailed(format!("failed to open GPU {device_index}: {e}"))
            })?;

        tracing::info!(gpu_index = device_index, gpu_name = %name, "NVML device bound");

        Ok(Self { nvml, device_index })
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    fn read(&self) -> std::result::Result<PowerMetrics, NvmlError> {
        let device = self.nvml.device_by_index(self.device_index)?;

        let power_milliwatts = device.power_usage()?;
        let temperature = device.temperature(TemperatureSensor::Gpu)?;
        let clock_speed = device.clock_info(Clock::Graphics)?;
        let memory_clock = device.clock_info(Clock::Memory)?;

        Ok(PowerMetrics {
            power_usage: milliwatts_to_watts(power_milliwatts),
            temperature: f64::from(temperature),
            clock_speed,
            memory_clock,
        })
    }
}

impl fmt::Debug for NvmlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmlSource")
            .field("device", &self.describe())
            .finish_non_exhaustive()
    }
}

impl TelemetrySource for NvmlSource {
    fn sample(&self) -> Result<PowerMetrics> {
        self.read().map_err(|e| {
            PowerError::TelemetryUnavailable(format!(
                "NVML query on GPU {} failed: {e}",
                self.device_index
            ))
        })
    }

    fn describe(&self) -> String {
        format!("nvml:gpu{}", self.device_index)
    }

    fn release(self) -> Result<()> {
        self.nvml
            .shutdown()
            .map_err(|e| PowerError::TelemetryUnavailable(format!("NVML shutdown failed: {e}")))
    }
}

/// Open the configured GPU behind a sample deadline and capture its baseline.
pub fn open_engine(config: &GuardConfig) -> Result<PowerDecisionEngine<TimedSource<NvmlSource>>> {
    config.validate()?;
    PowerDecisionEngine::acquire_with_policy(
        || {
            let source = NvmlSource::open(config.device_index)?;
            Ok(TimedSource::new(source, config.sample_timeout))
        },
        config.zero_power_policy,
    )
}
