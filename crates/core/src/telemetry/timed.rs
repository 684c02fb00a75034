//! Deadline wrapper for sources whose driver call may block indefinitely.
//!
//! Each sample runs on a short-lived worker thread; the caller waits at most
//! `timeout` for the answer. A sampler that overruns keeps running in the
//! background and its late result is discarded. At most one sampler is in
//! flight: while an overrunning one is still running, further samples fail
//! fast instead of piling up threads behind a hung driver.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::{PowerError, Result};
use crate::telemetry::TelemetrySource;
use crate::types::PowerMetrics;

/// A [`TelemetrySource`] that gives up on samples slower than `timeout`.
pub struct TimedSource<S> {
    inner: Arc<S>,
    timeout: Duration,
    /// Result channel of a sampler that overran its deadline.
    overrun: Mutex<Option<Receiver<Result<PowerMetrics>>>>,
}

impl<S: TelemetrySource + 'static> TimedSource<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
            overrun: Mutex::new(None),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: TelemetrySource + 'static> fmt::Debug for TimedSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedSource")
            .field("inner", &self.inner.describe())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S: TelemetrySource + 'static> TelemetrySource for TimedSource<S> {
    fn sample(&self) -> Result<PowerMetrics> {
        let mut overrun = self.overrun.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = overrun.take() {
            match pending.try_recv() {
                Err(TryRecvError::Empty) => {
                    *overrun = Some(pending);
                    return Err(PowerError::TelemetryUnavailable(
                        "previous sample still in flight".into(),
                    ));
                }
                Ok(_) => tracing::debug!(
                    source = %self.inner.describe(),
                    "Discarding late result of overrun sample",
                ),
                Err(TryRecvError::Disconnected) => {}
            }
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let inner = Arc::clone(&self.inner);

        std::thread::Builder::new()
            .name("wattgate-sampler".into())
            .spawn(move || {
                // The receiver is gone if the wrapper was dropped meanwhile.
                let _ = tx.send(inner.sample());
            })
            .map_err(|e| {
                PowerError::TelemetryUnavailable(format!("failed to spawn sampler thread: {e}"))
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                *overrun = Some(rx);
                tracing::warn!(
                    source = %self.inner.describe(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Telemetry sample timed out",
                );
                Err(PowerError::TelemetryUnavailable(format!(
                    "sample timed out after {} ms",
                    self.timeout.as_millis()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PowerError::TelemetryUnavailable(
                "sampler thread exited without a result".into(),
            )),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} (timeout {} ms)",
            self.inner.describe(),
            self.timeout.as_millis()
        )
    }

    fn release(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner.release(),
            Err(_) => {
                // An overrunning sampler still holds the source; the handle is
                // dropped when that thread finishes.
                tracing::warn!("Sampler still running at release, deferring handle release to drop");
                Ok(())
            }
        }
    }
}
