//! Safety-gated workload loop.

use std::fmt;

use serde::Serialize;

use crate::engine::PowerDecisionEngine;
use crate::error::{PowerError, Result};
use crate::safety::{SafetyLimits, SafetyStatus};
use crate::telemetry::TelemetrySource;

/// Outcome of [`PowerDecisionEngine::run_guarded`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardedRun {
    pub completed_iterations: usize,
    /// The breach that stopped the loop early, if any.
    pub halted_by: Option<SafetyStatus>,
}

impl GuardedRun {
    pub fn finished(&self) -> bool {
        self.halted_by.is_none()
    }
}

impl<S: TelemetrySource> PowerDecisionEngine<S> {
    /// Run up to `max_iterations` units of work, checking the safety gate
    /// before each one.
    ///
    /// Stops early on the first breach. A telemetry failure or a failing
    /// step aborts the loop with that error.
    pub fn run_guarded<F, E>(
        &self,
        limits: &SafetyLimits,
        max_iterations: usize,
        mut step: F,
    ) -> Result<GuardedRun>
    where
        F: FnMut(usize) -> std::result::Result<(), E>,
        E: fmt::Display,
    {
        for iteration in 0..max_iterations {
            let status = self.check_safety(limits)?;
            if !status.is_within_limits() {
                tracing::warn!(iteration, %status, "Halting workload loop");
                return Ok(GuardedRun {
                    completed_iterations: iteration,
                    halted_by: Some(status),
                });
            }

            step(iteration).map_err(|e| PowerError::WorkloadStep {
                iteration,
                reason: e.to_string(),
            })?;
            tracing::debug!(iteration, "Workload step completed within limits");
        }

        Ok(GuardedRun {
            completed_iterations: max_iterations,
            halted_by: None,
        })
    }
}
