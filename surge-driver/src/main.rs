use clap::Parser;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use surge_common::{PlanError, StageSpec, DEFAULT_WINDOW_CAPACITY};
use surge_driver::config::{CONTROL_INTERVAL, DEFAULT_REQUEST_TIMEOUT_SECS};
use surge_driver::exporter;
use surge_driver::metrics::MetricsAggregator;
use surge_driver::shape::LoadShape;
use surge_driver::worker::{self, RunOptions, RunReport};
use surge_driver::workload::WorkloadProfile;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "surge", about = "HTTP load-testing harness")]
struct Args {
    /// Base URL of the target service, e.g. http://127.0.0.1:8080
    #[arg(long)]
    host: String,

    /// Workload profile: baseline | spike | error-mix
    #[arg(long, default_value = "baseline")]
    workload: String,

    /// Built-in load shape: constant | spike
    #[arg(long, default_value = "constant")]
    shape: String,

    /// JSON file with custom stages; overrides --shape
    #[arg(long)]
    plan: Option<std::path::PathBuf>,

    /// Target user count for the constant shape
    #[arg(long, default_value_t = 10)]
    users: u32,

    /// Users spawned (or stopped) per second for the constant shape
    #[arg(long, default_value_t = 1.0)]
    spawn_rate: f64,

    /// How long the constant shape runs (seconds)
    #[arg(long, default_value_t = 60.0)]
    duration: f64,

    /// Latency samples retained per endpoint
    #[arg(long, default_value_t = DEFAULT_WINDOW_CAPACITY)]
    window_capacity: usize,

    /// Serve Prometheus-style metrics on this port for the duration of the run
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Per-request timeout (seconds)
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: f64,

    /// Fail if the failure rate exceeds this fraction
    #[arg(long, default_value_t = 0.01)]
    max_error_rate: f64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let profile = WorkloadProfile::from_name(&args.workload).unwrap_or_else(|| {
        eprintln!(
            "Unknown workload {:?}. Valid values: baseline, spike, error-mix",
            args.workload
        );
        process::exit(2);
    });

    let shape = build_shape(&args).unwrap_or_else(|e| {
        eprintln!("Invalid load plan: {e}");
        process::exit(2);
    });

    if args.window_capacity == 0 {
        eprintln!("--window-capacity must be at least 1");
        process::exit(2);
    }
    if !args.request_timeout.is_finite() || args.request_timeout <= 0.0 {
        eprintln!("--request-timeout must be a positive number of seconds");
        process::exit(2);
    }

    let aggregator = Arc::new(MetricsAggregator::with_window_capacity(args.window_capacity));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut exporter_handle = None;
    if let Some(port) = args.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let exporter_aggregator = Arc::clone(&aggregator);
        let exporter_shutdown = shutdown_rx.clone();
        exporter_handle = Some(tokio::spawn(async move {
            if let Err(e) = exporter::serve(addr, exporter_aggregator, ready_tx, exporter_shutdown).await {
                tracing::error!("metrics exporter failed: {e}");
            }
        }));
        match tokio::time::timeout(Duration::from_secs(5), ready_rx).await {
            Ok(Ok(bound)) => info!("serving metrics on http://{bound}/metrics"),
            _ => {
                eprintln!("Failed to start metrics exporter on port {port}");
                process::exit(3);
            }
        }
    }

    let options = RunOptions {
        base_url: args.host.trim_end_matches('/').to_string(),
        profile,
        request_timeout: Duration::from_secs_f64(args.request_timeout),
        control_interval: CONTROL_INTERVAL,
    };

    info!(
        host = %options.base_url,
        workload = profile.as_name(),
        stages = shape.stage_count(),
        "starting load test"
    );

    let report = worker::run(&shape, &options, Arc::clone(&aggregator))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to build HTTP client: {e}");
            process::exit(3);
        });

    let _ = shutdown_tx.send(true);
    if let Some(handle) = exporter_handle {
        let _ = handle.await;
    }

    print_report(&args, &report);

    let exceeded = report.snapshot.requests_total() > 0
        && report.snapshot.error_rate() > args.max_error_rate;
    process::exit(if exceeded { 1 } else { 0 });
}

fn build_shape(args: &Args) -> Result<LoadShape, PlanError> {
    if let Some(path) = &args.plan {
        return LoadShape::from_plan_file(path);
    }
    match args.shape.as_str() {
        "constant" => LoadShape::from_specs(&[StageSpec {
            duration: args.duration,
            users: args.users,
            spawn_rate: args.spawn_rate,
        }]),
        "spike" => Ok(LoadShape::spike()),
        other => Err(PlanError::PlanFile(format!(
            "unknown shape {other:?} (expected constant or spike)"
        ))),
    }
}

fn print_report(args: &Args, report: &RunReport) {
    let snapshot = &report.snapshot;
    let elapsed = report.elapsed.as_secs_f64();
    let exceeded =
        snapshot.requests_total() > 0 && snapshot.error_rate() > args.max_error_rate;

    println!("Surge Load Test Results");
    println!("=======================");
    println!("Elapsed:      {elapsed:.1} s");
    println!("Workload:     {}", args.workload);
    let throughput = if elapsed > 0.0 { snapshot.requests_total() as f64 / elapsed } else { 0.0 };
    println!("Requests:     {}", format_thousands(snapshot.requests_total()));
    println!("Throughput:   {throughput:.1} rps");
    println!("Failures:     {}", format_thousands(snapshot.failures_total()));
    println!(
        "Error rate:   {:.3}%    [threshold: {:.3}%]  {}",
        snapshot.error_rate() * 100.0,
        args.max_error_rate * 100.0,
        if exceeded { "✗" } else { "✓" },
    );
    println!();
    println!(
        "{:<7} {:<22} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "METHOD", "NAME", "REQS", "FAIL", "P50(ms)", "P95(ms)", "P99(ms)"
    );
    for entry in &snapshot.entries {
        let quantile_ms = |q: f64| {
            entry
                .percentiles
                .iter()
                .find(|p| p.quantile == q)
                .map(|p| format!("{:.1}", p.seconds * 1000.0))
                .unwrap_or_else(|| "-".to_string())
        };
        println!(
            "{:<7} {:<22} {:>9} {:>9} {:>9} {:>9} {:>9}",
            entry.key.method,
            entry.key.name,
            entry.requests_total(),
            entry.failure,
            quantile_ms(0.50),
            quantile_ms(0.95),
            quantile_ms(0.99),
        );
    }
    println!();
    println!("Result: {}", if exceeded { "FAIL" } else { "PASS" });
}

fn format_thousands(n: u64) -> String {
    if n >= 1_000_000 {
        format!("~{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("~{}K", n / 1_000)
    } else {
        n.to_string()
    }
}
