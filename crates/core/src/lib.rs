//! `wattgate-core` -- telemetry-driven power decisions for GPU workloads.
//!
//! A [`PowerDecisionEngine`] binds one [`TelemetrySource`], captures a
//! baseline sample, and then answers two kinds of questions from fresh
//! samples: how large a batch keeps power draw near a target, and whether a
//! running workload is still inside its power and temperature limits.
//!
//! Hardware bindings live in `wattgate-agent`. Everything here is testable
//! against [`ScriptedSource`].

pub mod config;
pub mod efficiency;
pub mod engine;
pub mod error;
pub mod guard;
pub mod safety;
pub mod telemetry;
pub mod types;
pub mod workload;

pub use config::GuardConfig;
pub use efficiency::{EfficiencyConfig, ZeroPowerPolicy, MEMORY_TIPS, RUNTIME_TIPS};
pub use engine::PowerDecisionEngine;
pub use error::{PowerError, Result};
pub use guard::GuardedRun;
pub use safety::{SafetyLimits, SafetyStatus, DEFAULT_TEMPERATURE_LIMIT_C};
pub use telemetry::{Scripted, ScriptedSource, TelemetrySource, TimedSource};
pub use types::PowerMetrics;
pub use workload::{BatchWorkload, OptimizationReport, OptimizationStep, PowerOptimizable};
