//! Prometheus exporter setup and the counters/histograms recorded by the pipeline.
//!
//! Recording is always safe: without an installed recorder the `metrics` macros are no-ops.

use std::net::SocketAddr;
use tracing::{info, warn};

pub const METRICS_PORT_ENV: &str = "REGSCAN_METRICS_PORT";

/// Installs the Prometheus exporter when `REGSCAN_METRICS_PORT` is set.
pub fn init_metrics() {
    let port: u16 = match std::env::var(METRICS_PORT_ENV).ok().and_then(|s| s.parse().ok()) {
        Some(port) => port,
        None => return,
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub mod stage {
    pub fn completed(stage: &str, duration_secs: f64) {
        ::metrics::counter!("regscan_stage_runs_total", "stage" => stage.to_string()).increment(1);
        ::metrics::histogram!("regscan_stage_duration_seconds", "stage" => stage.to_string())
            .record(duration_secs);
    }

    pub fn failed(stage: &str, error_kind: &'static str) {
        ::metrics::counter!(
            "regscan_stage_failures_total",
            "stage" => stage.to_string(),
            "error" => error_kind
        )
        .increment(1);
    }
}

pub mod scan {
    pub fn completed(source_id: &str, documents: usize, duration_secs: f64) {
        ::metrics::counter!("regscan_scans_total", "source" => source_id.to_string(), "status" => "completed")
            .increment(1);
        ::metrics::histogram!("regscan_documents_per_scan", "source" => source_id.to_string())
            .record(documents as f64);
        ::metrics::histogram!("regscan_scan_duration_seconds", "source" => source_id.to_string())
            .record(duration_secs);
    }

    pub fn failed(source_id: &str) {
        ::metrics::counter!("regscan_scans_total", "source" => source_id.to_string(), "status" => "failed")
            .increment(1);
    }
}

pub mod fetch {
    pub fn retried(fetcher: &'static str) {
        ::metrics::counter!("regscan_fetch_retries_total", "fetcher" => fetcher).increment(1);
    }

    pub fn bytes(fetcher: &'static str, len: usize) {
        ::metrics::histogram!("regscan_fetch_bytes", "fetcher" => fetcher).record(len as f64);
    }
}
