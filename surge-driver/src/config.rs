use std::time::Duration;

/// Period of the control loop that re-evaluates the load shape and
/// reconciles the worker pool against its target.
pub const CONTROL_INTERVAL: Duration = Duration::from_secs(1);

/// How often the control loop emits a progress log line.
pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Default per-request client timeout (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 30.0;
