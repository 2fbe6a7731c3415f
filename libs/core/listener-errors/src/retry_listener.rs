//! Hooks observing delivery failures and recovery.

use crate::error::ListenerError;
use crate::exception::ListenerException;
use crate::metrics::ErrorHandlerMetrics;
use crate::record::ConsumerRecord;

/// Observer of the retry/recovery lifecycle of failed records.
///
/// All hooks default to no-ops. They run on the handling thread, so keep them
/// cheap.
pub trait RetryListener: Send + Sync {
    /// A delivery failed and the record will be redelivered.
    fn failed_delivery(
        &self,
        _record: &ConsumerRecord,
        _exception: &ListenerException,
        _delivery_attempt: u32,
    ) {
    }

    /// The recoverer accepted the record.
    fn recovered(&self, _record: &ConsumerRecord, _exception: &ListenerException) {}

    /// The recoverer failed; the record will be redelivered.
    fn recovery_failed(
        &self,
        _record: &ConsumerRecord,
        _exception: &ListenerException,
        _failure: &ListenerError,
    ) {
    }
}

/// Publishes retry/recovery counters through [`ErrorHandlerMetrics`].
#[derive(Clone, Default)]
pub struct MetricsRetryListener {
    metrics: ErrorHandlerMetrics,
}

impl MetricsRetryListener {
    pub fn new(handler_name: impl Into<String>) -> Self {
        Self {
            metrics: ErrorHandlerMetrics::new(handler_name),
        }
    }
}

impl RetryListener for MetricsRetryListener {
    fn failed_delivery(&self, record: &ConsumerRecord, exception: &ListenerException, _: u32) {
        self.metrics.failed_delivery(&record.topic, exception.kind().name());
    }

    fn recovered(&self, record: &ConsumerRecord, _: &ListenerException) {
        self.metrics.recovered(&record.topic);
    }

    fn recovery_failed(&self, record: &ConsumerRecord, _: &ListenerException, _: &ListenerError) {
        self.metrics.recovery_failed(&record.topic);
    }
}
