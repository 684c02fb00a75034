/// Errors surfaced by telemetry sources and the decision engine.
#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error("Device initialisation failed: {0}")]
    DeviceInitFailed(String),

    #[error("Telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    #[error("Division guard triggered in {operation}: current power usage is zero")]
    DivisionGuardTriggered { operation: &'static str },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Workload optimization failed at {step}: {reason}")]
    WorkloadOptimization { step: &'static str, reason: String },

    #[error("Workload step {iteration} failed: {reason}")]
    WorkloadStep { iteration: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PowerError {
    /// Re-classify an error raised while an engine was being constructed.
    ///
    /// Anything that goes wrong before the baseline exists is fatal for the
    /// engine, so every variant collapses into [`PowerError::DeviceInitFailed`].
    pub fn into_init_failure(self) -> Self {
        match self {
            Self::DeviceInitFailed(reason) | Self::TelemetryUnavailable(reason) => {
                Self::DeviceInitFailed(reason)
            }
            other => Self::DeviceInitFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PowerError>;
