//! Deterministic telemetry source for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::{PowerError, Result};
use crate::telemetry::TelemetrySource;
use crate::types::PowerMetrics;

/// One scripted outcome of a `sample` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Metrics(PowerMetrics),
    Failure(String),
}

#[derive(Debug, Default)]
struct Script {
    pending: VecDeque<Scripted>,
    last: Option<Scripted>,
}

/// Replays a queue of scripted samples in order.
///
/// Once the queue is drained the last entry repeats forever, so a source
/// built with a single reading behaves like a device that never changes.
/// An empty script fails every call.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<Script>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that always reports `metrics`.
    pub fn constant(metrics: PowerMetrics) -> Self {
        Self::new().then(metrics)
    }

    /// Queue a successful reading.
    pub fn then(self, metrics: PowerMetrics) -> Self {
        self.push(Scripted::Metrics(metrics))
    }

    /// Queue a failed reading.
    pub fn then_fail(self, reason: impl Into<String>) -> Self {
        self.push(Scripted::Failure(reason.into()))
    }

    /// Block every `sample` call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `sample` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(self, step: Scripted) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .push_back(step);
        self
    }

    fn next_step(&self) -> Option<Scripted> {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        match script.pending.pop_front() {
            Some(step) => {
                script.last = Some(step.clone());
                Some(step)
            }
            None => script.last.clone(),
        }
    }
}

impl TelemetrySource for ScriptedSource {
    fn sample(&self) -> Result<PowerMetrics> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        match self.next_step() {
            Some(Scripted::Metrics(metrics)) => Ok(metrics),
            Some(Scripted::Failure(reason)) => Err(PowerError::TelemetryUnavailable(reason)),
            None => Err(PowerError::TelemetryUnavailable(
                "scripted source has no readings".into(),
            )),
        }
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}
