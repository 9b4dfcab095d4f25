use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use surge_common::{
    KeySnapshot, MetricKey, MetricsSnapshot, Outcome, Percentile, DEFAULT_WINDOW_CAPACITY,
    REPORTED_QUANTILES,
};

/// Bounded buffer of the most recent latency observations for one endpoint.
///
/// Once `capacity` samples are held the oldest is evicted on every push, so
/// memory stays fixed no matter how long the run is.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample window capacity must be non-zero");
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append one latency observation (seconds), evicting the oldest sample
    /// when the window is full.
    pub fn push(&mut self, latency_secs: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_secs);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate the current samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Copy the current samples out, sorted ascending.
    fn sorted(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_unstable_by(f64::total_cmp);
        sorted
    }
}

/// Nearest-rank percentile over an ascending-sorted slice: the sample at
/// index `floor(len * q) - 1`. Returns `None` when the slice is too small
/// for the quantile (the computed index is negative) rather than inventing
/// a zero. Exposed for deterministic testing.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let rank = (sorted.len() as f64 * q).floor() as i64 - 1;
    if rank < 0 {
        return None;
    }
    let index = (rank as usize).min(sorted.len().saturating_sub(1));
    sorted.get(index).copied()
}

#[derive(Debug)]
struct KeyStats {
    success: u64,
    failure: u64,
    window: SampleWindow,
}

impl KeyStats {
    fn new(window_capacity: usize) -> Self {
        Self { success: 0, failure: 0, window: SampleWindow::new(window_capacity) }
    }
}

/// Thread-safe accumulator for request outcomes and latencies.
///
/// Shared by `Arc` handle between every worker, the control loop, and the
/// exporter. Counters and sample windows for all keys live behind one
/// mutex; the `record` critical section is a counter bump plus a ring push,
/// short enough that one coarse lock holds up at realistic worker counts.
/// The active-user gauge is a plain atomic so the control loop never touches
/// the map lock.
#[derive(Debug)]
pub struct MetricsAggregator {
    stats: Mutex<HashMap<MetricKey, KeyStats>>,
    active_users: AtomicU64,
    window_capacity: usize,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::with_window_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    pub fn with_window_capacity(window_capacity: usize) -> Self {
        assert!(window_capacity > 0, "sample window capacity must be non-zero");
        Self {
            stats: Mutex::new(HashMap::new()),
            active_users: AtomicU64::new(0),
            window_capacity,
        }
    }

    /// Record one completed request: exactly one counter increment plus one
    /// window append. Never fails; a negative (or non-finite) latency from a
    /// misbehaving caller is clamped to zero instead of poisoning the window.
    pub fn record(&self, key: MetricKey, outcome: Outcome, latency_secs: f64) {
        let latency = if latency_secs.is_finite() && latency_secs >= 0.0 {
            latency_secs
        } else {
            0.0
        };

        let mut stats = self.stats.lock();
        let entry = stats
            .entry(key)
            .or_insert_with(|| KeyStats::new(self.window_capacity));
        match outcome {
            Outcome::Success => entry.success += 1,
            Outcome::Failure => entry.failure += 1,
        }
        entry.window.push(latency);
    }

    /// Replace the active virtual-user gauge. Last writer wins.
    pub fn set_active_users(&self, count: u64) {
        self.active_users.store(count, Ordering::Relaxed);
    }

    pub fn active_users(&self) -> u64 {
        self.active_users.load(Ordering::Relaxed)
    }

    /// Point-in-time view of every counter, the gauge, and per-endpoint
    /// latency percentiles for the reported quantiles.
    ///
    /// Runs in time proportional to the number of endpoints and their window
    /// sizes, and holds the map lock only while copying; sorting the entries
    /// happens after the lock is released.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let stats = self.stats.lock();
        let mut entries: Vec<KeySnapshot> = stats
            .iter()
            .map(|(key, key_stats)| {
                let sorted = key_stats.window.sorted();
                let percentiles = REPORTED_QUANTILES
                    .iter()
                    .filter_map(|&quantile| {
                        percentile(&sorted, quantile)
                            .map(|seconds| Percentile { quantile, seconds })
                    })
                    .collect();
                KeySnapshot {
                    key: key.clone(),
                    success: key_stats.success,
                    failure: key_stats.failure,
                    percentiles,
                }
            })
            .collect();
        drop(stats);

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        MetricsSnapshot { active_users: self.active_users(), entries }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
