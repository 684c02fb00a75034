//! Telemetry sources.
//!
//! A [`TelemetrySource`] is the only thing the decision engine knows about
//! the hardware. Production adapters live in `wattgate-agent`; this module
//! carries the trait, a scripted test double, and a timeout wrapper for
//! adapters whose underlying driver call may hang.

pub mod scripted;
pub mod timed;

use std::sync::Arc;

use crate::error::Result;
use crate::types::PowerMetrics;

pub use scripted::{Scripted, ScriptedSource};
pub use timed::TimedSource;

/// Provider of live device metrics.
///
/// Implementations must re-query the device on every call (no caching) and
/// must tolerate concurrent `sample` calls from several threads.
pub trait TelemetrySource: Send + Sync {
    /// Read the current device state.
    ///
    /// Fails with [`PowerError::TelemetryUnavailable`](crate::PowerError::TelemetryUnavailable)
    /// when the device handle is invalid or the query fails.
    fn sample(&self) -> Result<PowerMetrics>;

    /// Short identity used in log fields.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Release the underlying device handle.
    ///
    /// Dropping a source must release it too; this exists so callers can
    /// observe release errors at a deterministic point.
    fn release(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

impl<S: TelemetrySource + ?Sized> TelemetrySource for Arc<S> {
    fn sample(&self) -> Result<PowerMetrics> {
        (**self).sample()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<S: TelemetrySource + ?Sized> TelemetrySource for Box<S> {
    fn sample(&self) -> Result<PowerMetrics> {
        (**self).sample()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
