//! Background safety monitor.
//!
//! [`SafetyMonitor`] polls the decision engine on a fixed interval and
//! publishes the latest verdict on a `watch` channel, so a workload loop can
//! consult the safety gate without paying for a sample on every step.
//! Each sample runs on the blocking pool under a deadline; a slow or failed
//! sample publishes [`MonitorReading::Unavailable`] and polling continues.
//! An overrunning sample is kept rather than abandoned, and no new one is
//! started until it returns.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use wattgate_core::safety;
use wattgate_core::{
    GuardConfig, PowerDecisionEngine, PowerError, PowerMetrics, Result, SafetyLimits,
    SafetyStatus, TelemetrySource,
};

/// Latest state published by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorReading {
    /// No sample has completed yet.
    Pending,
    Sampled {
        metrics: PowerMetrics,
        status: SafetyStatus,
        sampled_at: DateTime<Utc>,
    },
    Unavailable {
        reason: String,
        sampled_at: DateTime<Utc>,
    },
}

impl MonitorReading {
    /// `true` only for a completed sample inside the limits.
    ///
    /// Pending and unavailable readings are not treated as safe.
    pub fn is_confirmed_safe(&self) -> bool {
        matches!(self, Self::Sampled { status, .. } if status.is_within_limits())
    }

    fn health(&self) -> Health {
        match self {
            Self::Pending => Health::Pending,
            Self::Sampled { status, .. } if status.is_within_limits() => Health::Safe,
            Self::Sampled { .. } => Health::Breached,
            Self::Unavailable { .. } => Health::Unavailable,
        }
    }
}

/// Coarse state used to log only on changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Pending,
    Safe,
    Breached,
    Unavailable,
}

/// The new health of `reading` if it differs from `previous`.
fn transition(previous: Health, reading: &MonitorReading) -> Option<Health> {
    let current = reading.health();
    (current != previous).then_some(current)
}

type SampleTask = JoinHandle<Result<(PowerMetrics, SafetyStatus)>>;

/// Periodic sampler feeding a safety-check channel.
pub struct SafetyMonitor<S: TelemetrySource + 'static> {
    engine: Arc<PowerDecisionEngine<S>>,
    limits: SafetyLimits,
    interval: Duration,
    sample_timeout: Duration,
    tx: watch::Sender<MonitorReading>,
}

impl<S: TelemetrySource + 'static> SafetyMonitor<S> {
    pub fn new(
        engine: Arc<PowerDecisionEngine<S>>,
        limits: SafetyLimits,
        interval: Duration,
        sample_timeout: Duration,
    ) -> Result<Self> {
        limits.validate()?;
        if interval.is_zero() {
            return Err(PowerError::InvalidInput("monitor interval must be non-zero".into()));
        }
        if sample_timeout.is_zero() {
            return Err(PowerError::InvalidInput("sample timeout must be non-zero".into()));
        }

        let (tx, _rx) = watch::channel(MonitorReading::Pending);
        Ok(Self {
            engine,
            limits,
            interval,
            sample_timeout,
            tx,
        })
    }

    /// Build a monitor from the limits and timings in `config`.
    pub fn from_config(engine: Arc<PowerDecisionEngine<S>>, config: &GuardConfig) -> Result<Self> {
        Self::new(engine, config.limits, config.monitor_interval, config.sample_timeout)
    }

    /// Receiver for the published readings.
    pub fn subscribe(&self) -> watch::Receiver<MonitorReading> {
        self.tx.subscribe()
    }

    /// The most recently published reading.
    pub fn latest(&self) -> MonitorReading {
        self.tx.borrow().clone()
    }

    /// Run the polling loop until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            source = %self.engine.source().describe(),
            interval_ms = self.interval.as_millis() as u64,
            power_limit_watts = self.limits.power_watts,
            temperature_limit_c = self.limits.temperature_celsius,
            "Safety monitor started",
        );

        let mut ticker = tokio::time::interval(self.interval);
        let mut health = Health::Pending;
        let mut in_flight: Option<SampleTask> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Safety monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let reading = self.poll_once(&mut in_flight).await;
                    if let Some(next) = transition(health, &reading) {
                        match &reading {
                            MonitorReading::Sampled { status, .. } if !status.is_within_limits() => {
                                tracing::warn!(%status, "Safety monitor: limits exceeded");
                            }
                            MonitorReading::Unavailable { reason, .. } => {
                                tracing::warn!(%reason, "Safety monitor: telemetry unavailable");
                            }
                            _ => tracing::info!("Safety monitor: within limits"),
                        }
                        health = next;
                    }
                    self.tx.send_replace(reading);
                }
            }
        }
    }

    /// Move the monitor onto the runtime; the task ends when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Sample once, or report the previous sample if it is still running.
    ///
    /// A sample that overruns its deadline is parked in `in_flight`; its
    /// eventual result is stale and dropped when the next tick finds it done.
    async fn poll_once(&self, in_flight: &mut Option<SampleTask>) -> MonitorReading {
        let mut task = match in_flight.take() {
            Some(task) if !task.is_finished() => {
                *in_flight = Some(task);
                return unavailable("previous sample still in flight".into());
            }
            _ => self.start_sample(),
        };

        match tokio::time::timeout(self.sample_timeout, &mut task).await {
            Ok(Ok(Ok((metrics, status)))) => MonitorReading::Sampled {
                metrics,
                status,
                sampled_at: Utc::now(),
            },
            Ok(Ok(Err(e))) => unavailable(e.to_string()),
            Ok(Err(join_err)) => unavailable(format!("sampler task failed: {join_err}")),
            Err(_) => {
                *in_flight = Some(task);
                unavailable(format!(
                    "sample timed out after {} ms",
                    self.sample_timeout.as_millis()
                ))
            }
        }
    }

    fn start_sample(&self) -> SampleTask {
        let engine = Arc::clone(&self.engine);
        let limits = self.limits;
        tokio::task::spawn_blocking(move || {
            let metrics = engine.sample()?;
            Ok((metrics, safety::evaluate(&metrics, &limits)))
        })
    }
}

impl<S: TelemetrySource + 'static> fmt::Debug for SafetyMonitor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyMonitor")
            .field("source", &self.engine.source().describe())
            .field("limits", &self.limits)
            .field("interval", &self.interval)
            .field("sample_timeout", &self.sample_timeout)
            .finish_non_exhaustive()
    }
}

fn unavailable(reason: String) -> MonitorReading {
    tracing::debug!(%reason, "Safety monitor sample failed");
    MonitorReading::Unavailable {
        reason,
        sampled_at: Utc::now(),
    }
}
