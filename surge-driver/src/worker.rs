use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge_common::{MetricKey, MetricsSnapshot, Outcome};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::PROGRESS_LOG_INTERVAL;
use crate::metrics::MetricsAggregator;
use crate::shape::LoadShape;
use crate::workload::{Task, WorkloadProfile};

/// Options for one load-test run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Base URL of the target service, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    pub profile: WorkloadProfile,
    /// Per-request client timeout; bounds how long shutdown can take.
    pub request_timeout: Duration,
    /// Period of the control loop. [`crate::config::CONTROL_INTERVAL`]
    /// outside of tests.
    pub control_interval: Duration,
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub snapshot: MetricsSnapshot,
    pub elapsed: Duration,
}

struct WorkerHandle {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Drive the target with the configured workload, ramping the virtual-user
/// pool according to `shape`, until the shape reports completion. Every
/// completed request is recorded into `aggregator`; the final snapshot and
/// measured run time are returned.
///
/// Errs only when the HTTP client cannot be constructed; everything that
/// goes wrong per-request is recorded as a failure outcome instead.
pub async fn run(
    shape: &LoadShape,
    options: &RunOptions,
    aggregator: Arc<MetricsAggregator>,
) -> Result<RunReport, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(options.request_timeout)
        .build()?;

    let run_start = Instant::now();
    let mut workers: Vec<WorkerHandle> = Vec::new();
    let mut retired: Vec<JoinHandle<()>> = Vec::new();
    let mut next_worker_id: u64 = 0;
    let mut ramp_credit: f64 = 0.0;
    let mut last_progress = Instant::now();

    let mut interval = tokio::time::interval(options.control_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let elapsed = run_start.elapsed();
        let Some(target) = shape.tick(elapsed) else {
            info!(elapsed_secs = elapsed.as_secs_f64(), "load plan complete, stopping workers");
            break;
        };

        let target_users = target.users as usize;
        if workers.len() == target_users {
            ramp_credit = 0.0;
        } else {
            ramp_credit += target.spawn_rate * options.control_interval.as_secs_f64();
            let (step, remaining) = ramp_step(workers.len(), target_users, ramp_credit);
            ramp_credit = remaining;
            if step > 0 {
                if workers.len() < target_users {
                    for _ in 0..step {
                        workers.push(spawn_worker(
                            next_worker_id,
                            &client,
                            options,
                            Arc::clone(&aggregator),
                        ));
                        next_worker_id += 1;
                    }
                } else {
                    for _ in 0..step {
                        if let Some(worker) = workers.pop() {
                            let _ = worker.stop.send(());
                            retired.push(worker.handle);
                        }
                    }
                }
                aggregator.set_active_users(workers.len() as u64);
                debug!(active = workers.len(), target = target.users, "reconciled worker pool");
            }
        }

        if last_progress.elapsed() >= PROGRESS_LOG_INTERVAL {
            last_progress = Instant::now();
            let snapshot = aggregator.snapshot();
            info!(
                elapsed_secs = elapsed.as_secs(),
                active = workers.len(),
                requests = snapshot.requests_total(),
                failures = snapshot.failures_total(),
                "run progress"
            );
        }
    }

    // Signal every worker first, then wait: each finishes its in-flight
    // request before exiting, so the final snapshot misses nothing.
    for worker in workers.drain(..) {
        let _ = worker.stop.send(());
        retired.push(worker.handle);
    }
    for handle in retired {
        if handle.await.is_err() {
            warn!("worker task panicked during shutdown");
        }
    }
    aggregator.set_active_users(0);

    Ok(RunReport { snapshot: aggregator.snapshot(), elapsed: run_start.elapsed() })
}

/// Number of workers to add or remove this tick: limited by the accumulated
/// ramp credit, capped by the distance to `target`. Returns the step and the
/// credit left over. Exposed for deterministic testing.
pub fn ramp_step(current: usize, target: usize, credit: f64) -> (usize, f64) {
    if current == target {
        return (0, 0.0);
    }
    let step = (credit.max(0.0).floor() as usize).min(current.abs_diff(target));
    (step, credit - step as f64)
}

fn spawn_worker(
    id: u64,
    client: &reqwest::Client,
    options: &RunOptions,
    aggregator: Arc<MetricsAggregator>,
) -> WorkerHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let client = client.clone();
    let base_url = options.base_url.clone();
    let profile = options.profile;
    let handle = tokio::spawn(async move {
        worker_loop(id, client, base_url, profile, aggregator, stop_rx).await;
    });
    WorkerHandle { stop: stop_tx, handle }
}

/// One virtual user: issue a task, record the outcome, idle, repeat until
/// stopped. A dropped stop sender counts as a stop request, so workers can
/// never outlive the control loop.
async fn worker_loop(
    id: u64,
    client: reqwest::Client,
    base_url: String,
    profile: WorkloadProfile,
    aggregator: Arc<MetricsAggregator>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut rng = SmallRng::from_entropy();
    debug!(worker = id, "virtual user started");

    loop {
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        let task = profile.sample(&mut rng);
        let started = Instant::now();
        let (key, outcome) = execute_task(&client, &base_url, task, &mut rng).await;
        aggregator.record(key, outcome, started.elapsed().as_secs_f64());

        let wait = profile.wait_time(&mut rng);
        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    debug!(worker = id, "virtual user stopped");
}

/// Issue one `task` against the target and classify the outcome.
pub async fn execute_task(
    client: &reqwest::Client,
    base_url: &str,
    task: Task,
    rng: &mut impl Rng,
) -> (MetricKey, Outcome) {
    match task {
        Task::GetRoot => {
            let outcome = classify(client.get(format!("{base_url}/")).send().await);
            (MetricKey::new("GET", "/"), outcome)
        }
        Task::ListUsers => {
            let outcome = classify(client.get(format!("{base_url}/users")).send().await);
            (MetricKey::new("GET", "/users"), outcome)
        }
        Task::GetUser => {
            let id: u32 = rng.gen_range(1..=10);
            let outcome = classify(client.get(format!("{base_url}/users/{id}")).send().await);
            (MetricKey::new("GET", "/users/[id]"), outcome)
        }
        Task::GetMissingUser => {
            let id: u32 = rng.gen_range(100..1000);
            let outcome = classify_expecting(
                client.get(format!("{base_url}/users/{id}")).send().await,
                StatusCode::NOT_FOUND,
            );
            (MetricKey::new("GET", "/users/[invalid_id]"), outcome)
        }
        Task::CreateUser => {
            let tag: u32 = rng.gen_range(1000..10000);
            let body = serde_json::json!({
                "name": format!("TestUser_{tag}"),
                "email": format!("test.{tag}@example.com"),
            });
            let outcome =
                classify(client.post(format!("{base_url}/users")).json(&body).send().await);
            (MetricKey::new("POST", "/users"), outcome)
        }
        Task::CreateInvalidUser => {
            let tag: u32 = rng.gen_range(1000..10000);
            // The required name field is deliberately missing.
            let body = serde_json::json!({
                "email": format!("test.{tag}@example.com"),
            });
            let outcome = classify_expecting(
                client.post(format!("{base_url}/users")).json(&body).send().await,
                StatusCode::BAD_REQUEST,
            );
            (MetricKey::new("POST", "/users/[invalid]"), outcome)
        }
    }
}

/// Success for any non-error status; transport failures and 4xx/5xx are
/// failures.
pub fn classify(result: Result<reqwest::Response, reqwest::Error>) -> Outcome {
    match result {
        Ok(response)
            if !response.status().is_client_error() && !response.status().is_server_error() =>
        {
            Outcome::Success
        }
        _ => Outcome::Failure,
    }
}

/// Like [`classify`], but a response with exactly `expected` status counts
/// as a success: an error-path probe finding the error it was looking for.
pub fn classify_expecting(
    result: Result<reqwest::Response, reqwest::Error>,
    expected: StatusCode,
) -> Outcome {
    match result {
        Ok(response) if response.status() == expected => Outcome::Success,
        other => classify(other),
    }
}
