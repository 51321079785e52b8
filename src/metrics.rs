//! Ingestion metrics.
//!
//! Counters are recorded through the `metrics` facade so they are no-ops until a
//! recorder is installed. `install_recorder` installs the Prometheus recorder once
//! and keeps its handle for `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Idempotent; returns `None` if another recorder
/// was already installed by someone else.
pub fn install_recorder() -> Option<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle.clone());
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(HANDLE.get_or_init(|| handle).clone()),
        Err(e) => {
            warn!("Prometheus recorder not installed: {}", e);
            None
        }
    }
}

/// Prometheus text exposition of everything recorded so far.
pub fn render() -> String {
    HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

/// Per-source ingestion counters.
pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_page_fetched(source: &'static str) {
        ::metrics::counter!("gnv_pages_fetched_total", "source" => source).increment(1);
    }

    pub fn record_event_created(source: &'static str) {
        ::metrics::counter!("gnv_events_created_total", "source" => source).increment(1);
    }

    pub fn record_duplicate(source: &'static str) {
        ::metrics::counter!("gnv_events_duplicate_total", "source" => source).increment(1);
    }

    /// An item that could not be extracted, resolved or stored.
    pub fn record_skipped(source: &'static str, stage: &'static str) {
        ::metrics::counter!("gnv_events_skipped_total", "source" => source, "stage" => stage)
            .increment(1);
    }

    pub fn record_crawl_duration(source: &'static str, elapsed: Duration) {
        ::metrics::histogram!("gnv_crawl_duration_seconds", "source" => source)
            .record(elapsed.as_secs_f64());
    }
}
