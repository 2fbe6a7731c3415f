//! Prometheus metrics for listener error handling
//!
//! Counters are labelled by handler and topic so retries and dead-lettering
//! can be alerted on per listener.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus recorder
///
/// Call this once at startup. Subsequent calls are no-ops. When another
/// recorder is already installed the call logs a warning and leaves it alone.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .map(|handle| {
                info!("Prometheus metrics initialized");
                handle
            })
            .map_err(|e| {
                warn!(error = %e, "Failed to install Prometheus recorder");
                e
            })
    });
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Error handler metrics helper
#[derive(Clone)]
pub struct ErrorHandlerMetrics {
    handler_name: String,
}

impl Default for ErrorHandlerMetrics {
    fn default() -> Self {
        Self::new("default")
    }
}

impl ErrorHandlerMetrics {
    pub fn new(handler_name: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
        }
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Record a failed delivery that will be retried
    pub fn failed_delivery(&self, topic: &str, exception_type: &str) {
        counter!(
            "listener_failed_deliveries_total",
            "handler" => self.handler_name.clone(),
            "topic" => topic.to_string(),
            "exception" => exception_type.to_string()
        )
        .increment(1);
    }

    /// Record a record handed to the recoverer successfully
    pub fn recovered(&self, topic: &str) {
        counter!(
            "listener_records_recovered_total",
            "handler" => self.handler_name.clone(),
            "topic" => topic.to_string()
        )
        .increment(1);
    }

    /// Record a recoverer failure
    pub fn recovery_failed(&self, topic: &str) {
        counter!(
            "listener_recovery_failures_total",
            "handler" => self.handler_name.clone(),
            "topic" => topic.to_string()
        )
        .increment(1);
    }
}
