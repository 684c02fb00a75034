//! Telemetry-driven decision engine.
//!
//! [`PowerDecisionEngine`] captures a baseline sample when it is built and
//! answers every later question from a fresh sample compared against that
//! baseline. The baseline is never re-sampled, so the engine can be shared
//! across threads without locking whenever its source is `Sync`.

use crate::efficiency::{self, EfficiencyConfig, ZeroPowerPolicy};
use crate::error::{PowerError, Result};
use crate::safety::{self, SafetyLimits, SafetyStatus};
use crate::telemetry::TelemetrySource;
use crate::types::PowerMetrics;
use crate::workload::{self, BatchWorkload, OptimizationReport, PowerOptimizable};

/// Decision engine bound to one telemetry source for its whole life.
#[derive(Debug)]
pub struct PowerDecisionEngine<S: TelemetrySource> {
    source: S,
    baseline: PowerMetrics,
    zero_power_policy: ZeroPowerPolicy,
}

impl<S: TelemetrySource> PowerDecisionEngine<S> {
    /// Bind `source` and capture the baseline with the default zero-power policy.
    pub fn new(source: S) -> Result<Self> {
        Self::with_policy(source, ZeroPowerPolicy::default())
    }

    /// Bind `source` and capture the baseline.
    ///
    /// If the baseline sample fails the source is dropped before returning,
    /// which releases whatever handle it holds.
    pub fn with_policy(source: S, zero_power_policy: ZeroPowerPolicy) -> Result<Self> {
        let baseline = match source.sample() {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::error!(source = %source.describe(), error = %e, "Baseline telemetry sample failed");
                return Err(e.into_init_failure());
            }
        };

        tracing::info!(
            source = %source.describe(),
            power_watts = baseline.power_usage,
            temperature_c = baseline.temperature,
            clock_mhz = baseline.clock_speed,
            memory_clock_mhz = baseline.memory_clock,
            policy = %zero_power_policy,
            "Baseline telemetry captured",
        );

        Ok(Self {
            source,
            baseline,
            zero_power_policy,
        })
    }

    /// Acquire a source with `acquire`, then capture the baseline.
    ///
    /// Any failure, in acquisition or in the first sample, is reported as
    /// [`PowerError::DeviceInitFailed`].
    pub fn acquire<F>(acquire: F) -> Result<Self>
    where
        F: FnOnce() -> Result<S>,
    {
        Self::acquire_with_policy(acquire, ZeroPowerPolicy::default())
    }

    pub fn acquire_with_policy<F>(acquire: F, zero_power_policy: ZeroPowerPolicy) -> Result<Self>
    where
        F: FnOnce() -> Result<S>,
    {
        let source = acquire().map_err(PowerError::into_init_failure)?;
        Self::with_policy(source, zero_power_policy)
    }

    /// The construction-time sample.
    pub fn baseline(&self) -> &PowerMetrics {
        &self.baseline
    }

    pub fn zero_power_policy(&self) -> ZeroPowerPolicy {
        self.zero_power_policy
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Take a fresh sample from the bound source.
    pub fn sample(&self) -> Result<PowerMetrics> {
        let metrics = self.source.sample()?;
        tracing::debug!(
            power_watts = metrics.power_usage,
            temperature_c = metrics.temperature,
            clock_mhz = metrics.clock_speed,
            memory_clock_mhz = metrics.memory_clock,
            "Telemetry sampled",
        );
        Ok(metrics)
    }

    /// Batch size that keeps power draw near `target_power` watts.
    ///
    /// Returns `requested_batch_size` unchanged when the device is at or
    /// below target (including a zero reading). Otherwise scales it down to
    /// `max(1, floor(requested * target / current))`.
    pub fn optimize_batch_size(&self, requested_batch_size: usize, target_power: f64) -> Result<usize> {
        if requested_batch_size == 0 {
            return Err(PowerError::InvalidInput(
                "requested batch size must be positive".into(),
            ));
        }
        if !(target_power.is_finite() && target_power > 0.0) {
            return Err(PowerError::InvalidInput(format!(
                "target power must be a positive number of watts, got {target_power}"
            )));
        }

        let current = self.sample()?;
        let size = efficiency::scale_batch_size(requested_batch_size, target_power, current.power_usage);

        if size != requested_batch_size {
            tracing::info!(
                requested = requested_batch_size,
                recommended = size,
                current_watts = current.power_usage,
                target_watts = target_power,
                "Batch size scaled down to meet power target",
            );
        }

        Ok(size)
    }

    /// [`optimize_batch_size`](Self::optimize_batch_size) for a workload
    /// descriptor's batch dimension.
    pub fn optimize_batch_for<W>(&self, workload: &W, target_power: f64) -> Result<usize>
    where
        W: BatchWorkload + ?Sized,
    {
        self.optimize_batch_size(workload.batch_size(), target_power)
    }

    /// Sample the device and build a power-efficiency recommendation.
    pub fn suggest_efficient_config(&self) -> Result<EfficiencyConfig> {
        let current = self.sample()?;
        let factor = self.batch_factor(&current)?;
        Ok(EfficiencyConfig::new(factor))
    }

    /// Headroom of `current` relative to the baseline, in `[0, 1]`.
    pub fn batch_factor(&self, current: &PowerMetrics) -> Result<f64> {
        efficiency::batch_factor(&self.baseline, current, self.zero_power_policy)
    }

    /// Evaluate the safety gate against a fresh sample.
    pub fn check_safety(&self, limits: &SafetyLimits) -> Result<SafetyStatus> {
        limits.validate()?;
        let current = self.sample()?;
        let status = safety::evaluate(&current, limits);
        if !status.is_within_limits() {
            tracing::warn!(%status, "Safety limits exceeded");
        }
        Ok(status)
    }

    /// `false` iff current power or temperature is above its limit.
    pub fn is_within_safety_limits(&self, limits: &SafetyLimits) -> Result<bool> {
        Ok(self.check_safety(limits)?.is_within_limits())
    }

    /// Push `workload` toward a lower power footprint.
    pub fn apply_power_optimizations<W>(&self, workload: &mut W) -> Result<OptimizationReport>
    where
        W: PowerOptimizable + ?Sized,
    {
        workload::apply_power_optimizations(workload)
    }

    /// Tear the engine down and release the device handle.
    pub fn shutdown(self) -> Result<()> {
        let description = self.source.describe();
        let result = self.source.release();
        match &result {
            Ok(()) => tracing::info!(source = %description, "Telemetry source released"),
            Err(e) => tracing::error!(source = %description, error = %e, "Telemetry source release failed"),
        }
        result
    }

    /// Tear the engine down and hand the source back.
    pub fn into_source(self) -> S {
        self.source
    }
}
