use axum::extract::State;
use axum::http::header;
use axum::routing::get;
use axum::Router;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use surge_common::MetricsSnapshot;
use tokio::sync::{oneshot, watch};

use crate::metrics::MetricsAggregator;

/// Render a snapshot in Prometheus text exposition format.
///
/// The wire text lives here and nowhere else; the aggregator only ever
/// exposes the structured snapshot.
pub fn render(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# HELP surge_requests_total Total requests issued, by endpoint and result.\n");
    out.push_str("# TYPE surge_requests_total counter\n");
    for entry in &snapshot.entries {
        let method = escape_label(&entry.key.method);
        let name = escape_label(&entry.key.name);
        let _ = writeln!(
            out,
            "surge_requests_total{{method=\"{method}\",name=\"{name}\",result=\"success\"}} {}",
            entry.success
        );
        let _ = writeln!(
            out,
            "surge_requests_total{{method=\"{method}\",name=\"{name}\",result=\"failure\"}} {}",
            entry.failure
        );
    }

    out.push_str("# HELP surge_users Current number of active virtual users.\n");
    out.push_str("# TYPE surge_users gauge\n");
    let _ = writeln!(out, "surge_users {}", snapshot.active_users);

    out.push_str("# HELP surge_response_time_seconds Recent response-time percentiles, by endpoint.\n");
    out.push_str("# TYPE surge_response_time_seconds gauge\n");
    for entry in &snapshot.entries {
        let method = escape_label(&entry.key.method);
        let name = escape_label(&entry.key.name);
        for percentile in &entry.percentiles {
            let _ = writeln!(
                out,
                "surge_response_time_seconds{{method=\"{method}\",name=\"{name}\",quantile=\"{}\"}} {}",
                percentile.quantile, percentile.seconds
            );
        }
    }

    out
}

/// Escape a value for use inside a Prometheus label: backslash, double
/// quote, and newline.
fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Router exposing `GET /metrics` over the shared aggregator.
pub fn router(aggregator: Arc<MetricsAggregator>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .with_state(aggregator)
}

async fn handle_metrics(
    State(aggregator): State<Arc<MetricsAggregator>>,
) -> ([(header::HeaderName, &'static str); 1], String) {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render(&aggregator.snapshot()),
    )
}

/// Serve the metrics endpoint until `shutdown` flips to `true`, signalling
/// `ready_tx` with the bound address once accepting connections. A dropped
/// shutdown sender counts as a shutdown request.
pub async fn serve(
    addr: SocketAddr,
    aggregator: Arc<MetricsAggregator>,
    ready_tx: oneshot::Sender<SocketAddr>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(aggregator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    ready_tx.send(local_addr).ok();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}
