//! Caller-side workload boundary.
//!
//! The engine never sees a model or a tensor. It needs the batch dimension
//! of whatever the caller is about to run, and a handful of hooks to push a
//! workload toward a lower power footprint.

use std::fmt;

use serde::Serialize;

use crate::error::{PowerError, Result};

/// Anything with a leading batch dimension.
pub trait BatchWorkload {
    fn batch_size(&self) -> usize;
}

/// Tensor shapes: the batch dimension is the first axis.
impl BatchWorkload for [usize] {
    fn batch_size(&self) -> usize {
        self.first().copied().unwrap_or(0)
    }
}

impl BatchWorkload for Vec<usize> {
    fn batch_size(&self) -> usize {
        self.as_slice().batch_size()
    }
}

/// Power-reduction hooks a workload can expose.
pub trait PowerOptimizable {
    type Error: fmt::Display;

    /// Switch weights and activations to half precision.
    fn enable_half_precision(&mut self) -> std::result::Result<(), Self::Error>;

    /// Return cached allocator memory to the device.
    fn release_cached_memory(&mut self) -> std::result::Result<(), Self::Error>;

    /// Trade compute for memory by recomputing activations.
    ///
    /// Returns `Ok(false)` when the workload has no checkpointing support.
    fn enable_gradient_checkpointing(&mut self) -> std::result::Result<bool, Self::Error> {
        Ok(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStep {
    HalfPrecision,
    CacheRelease,
    GradientCheckpointing,
}

impl OptimizationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HalfPrecision => "half_precision",
            Self::CacheRelease => "cache_release",
            Self::GradientCheckpointing => "gradient_checkpointing",
        }
    }
}

/// Which optimizations were applied to a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationReport {
    pub applied: Vec<OptimizationStep>,
    /// Steps the workload reported as unsupported.
    pub skipped: Vec<OptimizationStep>,
}

/// Run the power optimizations in order: half precision, cache release,
/// gradient checkpointing. Stops at the first failing hook.
pub fn apply_power_optimizations<W>(workload: &mut W) -> Result<OptimizationReport>
where
    W: PowerOptimizable + ?Sized,
{
    let mut report = OptimizationReport::default();

    workload
        .enable_half_precision()
        .map_err(|e| step_failed(OptimizationStep::HalfPrecision, e))?;
    report.applied.push(OptimizationStep::HalfPrecision);

    workload
        .release_cached_memory()
        .map_err(|e| step_failed(OptimizationStep::CacheRelease, e))?;
    report.applied.push(OptimizationStep::CacheRelease);

    let checkpointing = workload
        .enable_gradient_checkpointing()
        .map_err(|e| step_failed(OptimizationStep::GradientCheckpointing, e))?;
    if checkpointing {
        report.applied.push(OptimizationStep::GradientCheckpointing);
    } else {
        report.skipped.push(OptimizationStep::GradientCheckpointing);
    }

    tracing::info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "Power optimizations applied to workload",
    );

    Ok(report)
}

fn step_failed(step: OptimizationStep, error: impl fmt::Display) -> PowerError {
    tracing::warn!(step = step.as_str(), error = %error, "Workload optimization step failed");
    PowerError::WorkloadOptimization {
        step: step.as_str(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Default)]
    struct FakeModel {
        half: bool,
        cache_cleared: bool,
        checkpointing: Option<bool>,
        fail_cache: bool,
    }

    impl PowerOptimizable for FakeModel {
        type Error = String;

        fn enable_half_precision(&mut self) -> std::result::Result<(), String> {
            self.half = true;
            Ok(())
        }

        fn release_cached_memory(&mut self) -> std::result::Result<(), String> {
            if self.fail_cache {
                return Err("allocator busy".into());
            }
            self.cache_cleared = true;
            Ok(())
        }

        fn enable_gradient_checkpointing(&mut self) -> std::result::Result<bool, String> {
            Ok(self.checkpointing.is_some())
        }
    }

    #[test]
    fn shape_batch_dimension_is_first_axis() {
        assert_eq!(vec![32usize, 3, 224, 224].batch_size(), 32);
        assert_eq!([8usize, 10].as_slice().batch_size(), 8);
        assert_eq!(Vec::<usize>::new().batch_size(), 0);
    }

    #[test]
    fn applies_all_supported_steps() {
        let mut model = FakeModel {
            checkpointing: Some(true),
            ..FakeModel::default()
        };
        let report = apply_power_optimizations(&mut model).expect("optimizations");

        assert!(model.half && model.cache_cleared);
        assert_eq!(
            report.applied,
            vec![
                OptimizationStep::HalfPrecision,
                OptimizationStep::CacheRelease,
                OptimizationStep::GradientCheckpointing
            ]
        );
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn unsupported_checkpointing_is_skipped() {
        let mut model = FakeModel::default();
        let report = apply_power_optimizations(&mut model).expect("optimizations");
        assert_eq!(report.skipped, vec![OptimizationStep::GradientCheckpointing]);
    }

    #[test]
    fn failing_step_stops_the_sequence() {
        let mut model = FakeModel {
            fail_cache: true,
            ..FakeModel::default()
        };
        assert_matches!(
            apply_power_optimizations(&mut model),
            Err(PowerError::WorkloadOptimization { step: "cache_release", reason }) if reason == "allocator busy"
        );
        assert!(model.half);
    }
}
