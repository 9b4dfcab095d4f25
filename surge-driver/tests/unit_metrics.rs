use std::sync::Arc;
use std::thread;
use surge_common::{MetricKey, Outcome};
use surge_driver::metrics::{percentile, MetricsAggregator, SampleWindow};

fn key(method: &str, name: &str) -> MetricKey {
    MetricKey::new(method, name)
}

// --- SampleWindow ---

#[test]
fn test_window_never_exceeds_capacity() {
    let mut window = SampleWindow::new(3);
    for i in 0..100 {
        window.push(i as f64);
        assert!(window.len() <= 3, "window grew past capacity at push {i}");
    }
}

#[test]
fn test_window_keeps_the_most_recent_samples() {
    let mut window = SampleWindow::new(3);
    for i in 1..=5 {
        window.push(i as f64);
    }
    let samples: Vec<f64> = window.iter().collect();
    assert_eq!(samples, vec![3.0, 4.0, 5.0]);
}

#[test]
fn test_window_below_capacity_keeps_everything_in_order() {
    let mut window = SampleWindow::new(10);
    window.push(0.3);
    window.push(0.1);
    window.push(0.2);
    let samples: Vec<f64> = window.iter().collect();
    assert_eq!(samples, vec![0.3, 0.1, 0.2]);
    assert_eq!(window.capacity(), 10);
    assert!(!window.is_empty());
}

// --- percentile ---

#[test]
fn test_percentile_nearest_rank_examples() {
    // Five samples: p50 -> index floor(5*0.50)-1 = 1, p95 -> floor(5*0.95)-1 = 3.
    let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
    assert_eq!(percentile(&sorted, 0.50), Some(20.0));
    assert_eq!(percentile(&sorted, 0.95), Some(40.0));
    assert_eq!(percentile(&sorted, 0.99), Some(40.0));
    assert_eq!(percentile(&sorted, 1.0), Some(50.0));
}

#[test]
fn test_percentile_too_small_a_window_is_omitted() {
    // floor(1*0.5)-1 < 0: a single sample cannot answer p50.
    assert_eq!(percentile(&[7.0], 0.50), None);
    assert_eq!(percentile(&[7.0], 0.99), None);
    // Two samples can: floor(2*0.5)-1 = 0.
    assert_eq!(percentile(&[7.0, 9.0], 0.50), Some(7.0));
}

#[test]
fn test_percentile_empty_is_omitted() {
    assert_eq!(percentile(&[], 0.50), None);
    assert_eq!(percentile(&[], 0.99), None);
}

// --- MetricsAggregator ---

#[test]
fn test_record_counts_by_outcome() {
    let aggregator = MetricsAggregator::new();
    for _ in 0..3 {
        aggregator.record(key("GET", "/users"), Outcome::Success, 0.010);
    }
    aggregator.record(key("GET", "/users"), Outcome::Failure, 0.500);
    aggregator.record(key("POST", "/users"), Outcome::Success, 0.020);

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.entries.len(), 2);

    let get_users = &snapshot.entries[0];
    assert_eq!(get_users.key, key("GET", "/users"));
    assert_eq!(get_users.success, 3);
    assert_eq!(get_users.failure, 1);

    let post_users = &snapshot.entries[1];
    assert_eq!(post_users.key, key("POST", "/users"));
    assert_eq!(post_users.success, 1);
    assert_eq!(post_users.failure, 0);
}

#[test]
fn test_snapshot_entries_are_sorted_by_key() {
    let aggregator = MetricsAggregator::new();
    aggregator.record(key("POST", "/users"), Outcome::Success, 0.01);
    aggregator.record(key("GET", "/users"), Outcome::Success, 0.01);
    aggregator.record(key("GET", "/"), Outcome::Success, 0.01);

    let keys: Vec<MetricKey> =
        aggregator.snapshot().entries.into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec![key("GET", "/"), key("GET", "/users"), key("POST", "/users")]);
}

#[test]
fn test_snapshot_percentiles_use_only_the_window() {
    // Capacity 4: after ten records only the last four latencies remain,
    // so p50 = sorted([7,8,9,10])[floor(4*0.5)-1] = 8.
    let aggregator = MetricsAggregator::with_window_capacity(4);
    for i in 1..=10 {
        aggregator.record(key("GET", "/"), Outcome::Success, i as f64);
    }

    let snapshot = aggregator.snapshot();
    let entry = &snapshot.entries[0];
    assert_eq!(entry.success, 10, "counters are not windowed");

    let p50 = entry.percentiles.iter().find(|p| p.quantile == 0.50).expect("p50 present");
    assert_eq!(p50.seconds, 8.0);
    let p95 = entry.percentiles.iter().find(|p| p.quantile == 0.95).expect("p95 present");
    assert_eq!(p95.seconds, 9.0);
}

#[test]
fn test_small_window_omits_unanswerable_quantiles() {
    let aggregator = MetricsAggregator::new();
    aggregator.record(key("GET", "/"), Outcome::Success, 0.05);

    let snapshot = aggregator.snapshot();
    // One sample cannot answer any of the reported quantiles.
    assert!(snapshot.entries[0].percentiles.is_empty());
}

#[test]
fn test_negative_latency_is_clamped_to_zero() {
    let aggregator = MetricsAggregator::new();
    aggregator.record(key("GET", "/"), Outcome::Success, -5.0);
    aggregator.record(key("GET", "/"), Outcome::Success, 1.0);

    let snapshot = aggregator.snapshot();
    let p50 = snapshot.entries[0]
        .percentiles
        .iter()
        .find(|p| p.quantile == 0.50)
        .expect("p50 present");
    assert_eq!(p50.seconds, 0.0, "clamped sample should be zero, not -5");
}

#[test]
fn test_gauge_set_and_read_back() {
    let aggregator = MetricsAggregator::new();
    assert_eq!(aggregator.snapshot().active_users, 0);

    aggregator.set_active_users(42);
    assert_eq!(aggregator.active_users(), 42);
    assert_eq!(aggregator.snapshot().active_users, 42);

    aggregator.set_active_users(7);
    assert_eq!(aggregator.snapshot().active_users, 7);
}

#[test]
fn test_no_increments_are_lost_under_concurrency() {
    const THREADS: usize = 8;
    const RECORDS_PER_THREAD: usize = 500;

    let aggregator = Arc::new(MetricsAggregator::with_window_capacity(64));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || {
                for i in 0..RECORDS_PER_THREAD {
                    let outcome = if i % 5 == 0 { Outcome::Failure } else { Outcome::Success };
                    aggregator.record(key("GET", "/users"), outcome, (t + i) as f64 * 1e-4);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("recorder thread panicked");
    }

    let snapshot = aggregator.snapshot();
    let entry = &snapshot.entries[0];
    assert_eq!(
        entry.requests_total(),
        (THREADS * RECORDS_PER_THREAD) as u64,
        "every record call must be counted exactly once"
    );
    assert_eq!(entry.failure, (THREADS * RECORDS_PER_THREAD / 5) as u64);
}

#[test]
fn test_counters_never_decrease_across_snapshots() {
    let aggregator = Arc::new(MetricsAggregator::new());
    let writer = {
        let aggregator = Arc::clone(&aggregator);
        thread::spawn(move || {
            for _ in 0..2_000 {
                aggregator.record(key("GET", "/"), Outcome::Success, 0.001);
            }
        })
    };

    let mut last_total = 0;
    while !writer.is_finished() {
        let total = aggregator.snapshot().requests_total();
        assert!(total >= last_total, "counter went backwards: {last_total} -> {total}");
        last_total = total;
    }
    writer.join().expect("writer panicked");
    assert_eq!(aggregator.snapshot().requests_total(), 2_000);
}
