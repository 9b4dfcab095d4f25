use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default bound on the number of latency samples retained per endpoint.
pub const DEFAULT_WINDOW_CAPACITY: usize = 1_000;

/// Quantiles reported for every endpoint with recorded latencies.
pub const REPORTED_QUANTILES: [f64; 3] = [0.50, 0.95, 0.99];

/// Error types for load-plan construction. All of these are fatal at load
/// time; a plan that fails validation never reaches the control loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("Stage {0}: duration offset must increase over the previous stage")]
    NonIncreasingOffset(usize),

    #[error("Stage {0}: spawn rate must be positive and finite, got {1}")]
    InvalidSpawnRate(usize, f64),

    #[error("Stage {0}: duration must be a non-negative number of seconds, got {1}")]
    InvalidDuration(usize, f64),

    #[error("Failed to load plan: {0}")]
    PlanFile(String),
}

/// One stage of a load plan as written in a JSON plan file.
///
/// `duration` is the cumulative elapsed time (seconds) at which the stage
/// ends, so a plan's `duration` values must be strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub duration: f64,
    pub users: u32,
    pub spawn_rate: f64,
}

/// Identifies one logical endpoint being measured: the HTTP method plus the
/// templated endpoint name (e.g. `GET` + `/users/[id]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub method: String,
    pub name: String,
}

impl MetricKey {
    pub fn new(method: impl Into<String>, name: impl Into<String>) -> Self {
        Self { method: method.into(), name: name.into() }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.name)
    }
}

/// Terminal result of one synthetic request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Label value used in metric exposition (`result="success"` etc).
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Latency value for one reported quantile, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentile {
    pub quantile: f64,
    pub seconds: f64,
}

/// Counters and latency percentiles for a single endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySnapshot {
    pub key: MetricKey,
    pub success: u64,
    pub failure: u64,
    /// Present only for quantiles the sample window is large enough to
    /// answer; ordered by ascending quantile.
    pub percentiles: Vec<Percentile>,
}

impl KeySnapshot {
    pub fn requests_total(&self) -> u64 {
        self.success + self.failure
    }
}

/// Point-in-time view of everything the aggregator has observed.
///
/// Entries are ordered by `MetricKey` so successive snapshots line up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub active_users: u64,
    pub entries: Vec<KeySnapshot>,
}

impl MetricsSnapshot {
    pub fn requests_total(&self) -> u64 {
        self.entries.iter().map(KeySnapshot::requests_total).sum()
    }

    pub fn failures_total(&self) -> u64 {
        self.entries.iter().map(|e| e.failure).sum()
    }

    /// Fraction of requests that failed; `0.0` before any request completes.
    pub fn error_rate(&self) -> f64 {
        let total = self.requests_total();
        if total == 0 {
            return 0.0;
        }
        self.failures_total() as f64 / total as f64
    }
}
