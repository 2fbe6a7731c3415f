//! Retry-or-recover decisions shared by the record and batch handlers.

use crate::backoff::BackOff;
use crate::classifier::ExceptionClassifier;
use crate::error::ListenerError;
use crate::exception::ListenerException;
use crate::record::{next_offsets, Consumer, ConsumerRecord, TopicPartition};
use crate::recoverer::{ConsumerRecordRecoverer, LoggingRecoverer};
use crate::retry_listener::RetryListener;
use crate::tracker::{Attempt, FailedRecordTracker};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Picks a back-off for a new failure; `None` falls back to the default.
pub type BackOffFunction =
    Arc<dyn Fn(&ConsumerRecord, &ListenerException) -> Option<BackOff> + Send + Sync>;

/// Classification, failure tracking and recovery for one handler.
///
/// ```rust,ignore
/// let processor = FailedRecordProcessor::new(Arc::new(dead_letters))
///     .with_back_off(BackOff::exponential(Duration::from_millis(100), Duration::from_secs(5), 4))
///     .with_retry_listener(Arc::new(MetricsRetryListener::new("orders")))
///     .with_commit_recovered(true);
/// let handler = DefaultErrorHandler::from_processor(processor);
/// ```
pub struct FailedRecordProcessor {
    classifier: ExceptionClassifier,
    tracker: FailedRecordTracker,
    recoverer: Arc<dyn ConsumerRecordRecoverer>,
    back_off: BackOff,
    back_off_function: Option<BackOffFunction>,
    retry_listeners: Vec<Arc<dyn RetryListener>>,
    commit_recovered: bool,
}

impl Default for FailedRecordProcessor {
    fn default() -> Self {
        Self::new(Arc::new(LoggingRecoverer))
    }
}

impl FailedRecordProcessor {
    pub fn new(recoverer: Arc<dyn ConsumerRecordRecoverer>) -> Self {
        Self {
            classifier: ExceptionClassifier::new(),
            tracker: FailedRecordTracker::default(),
            recoverer,
            back_off: BackOff::default(),
            back_off_function: None,
            retry_listeners: Vec::new(),
            commit_recovered: false,
        }
    }

    pub fn with_back_off(mut self, back_off: BackOff) -> Self {
        self.back_off = back_off;
        self
    }

    pub fn with_back_off_function<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConsumerRecord, &ListenerException) -> Option<BackOff> + Send + Sync + 'static,
    {
        self.back_off_function = Some(Arc::new(f));
        self
    }

    /// Use `classifier` instead of a fresh one; clones share their registry
    pub fn with_classifier(mut self, classifier: ExceptionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry_listener(mut self, listener: Arc<dyn RetryListener>) -> Self {
        self.retry_listeners.push(listener);
        self
    }

    /// Commit the offset after a recovered record
    pub fn with_commit_recovered(mut self, commit_recovered: bool) -> Self {
        self.commit_recovered = commit_recovered;
        self
    }

    /// Whether a different exception type on the same record restarts its count
    pub fn with_reset_state_on_exception_change(mut self, reset: bool) -> Self {
        self.tracker = FailedRecordTracker::new(reset);
        self
    }

    pub fn classifier(&self) -> &ExceptionClassifier {
        &self.classifier
    }

    pub fn tracker(&self) -> &FailedRecordTracker {
        &self.tracker
    }

    pub fn back_off(&self) -> &BackOff {
        &self.back_off
    }

    pub fn commit_recovered(&self) -> bool {
        self.commit_recovered
    }

    /// Count a failed delivery of `record` and decide whether it gets another.
    pub(crate) fn decide(&self, record: &ConsumerRecord, exception: &ListenerException) -> Attempt {
        if !self.classifier.classify(exception) {
            debug!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                exception_type = %exception.kind(),
                "Exception is not retryable"
            );
            return Attempt::Exhausted {
                delivery_attempts: self.tracker.attempts(record) + 1,
            };
        }

        self.tracker
            .record_failure(record, exception.kind(), || self.back_off_for(record, exception))
    }

    fn back_off_for(&self, record: &ConsumerRecord, exception: &ListenerException) -> BackOff {
        self.back_off_function
            .as_ref()
            .and_then(|f| f(record, exception))
            .unwrap_or_else(|| self.back_off.clone())
    }

    /// Notify listeners of a retried delivery and wait out its back-off.
    pub(crate) async fn pause(
        &self,
        record: &ConsumerRecord,
        exception: &ListenerException,
        delivery_attempt: u32,
        delay: Duration,
    ) {
        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            delivery_attempt,
            delay_ms = delay.as_millis() as u64,
            exception_type = %exception.kind(),
            "Delivery failed, retrying"
        );

        for listener in &self.retry_listeners {
            listener.failed_delivery(record, exception, delivery_attempt);
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Hand `record` to the recoverer.
    ///
    /// On success the failure is forgotten. On failure the tracker keeps the
    /// record and the error comes back as [`ListenerError::RecoveryFailed`].
    pub(crate) async fn recover(
        &self,
        record: &ConsumerRecord,
        exception: &ListenerException,
        delivery_attempts: u32,
    ) -> Result<(), ListenerError> {
        warn!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            delivery_attempts,
            exception_type = %exception.kind(),
            error = %exception,
            "Recovering failed record"
        );

        match self.recoverer.accept(record, exception).await {
            Ok(()) => {
                self.tracker.clear(record);
                for listener in &self.retry_listeners {
                    listener.recovered(record, exception);
                }
                Ok(())
            }
            Err(e) => {
                error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Recoverer failed, record will be redelivered"
                );
                for listener in &self.retry_listeners {
                    listener.recovery_failed(record, exception, &e);
                }
                Err(ListenerError::recovery_failed(
                    record.topic_partition(),
                    record.offset,
                    e,
                ))
            }
        }
    }

    /// Commit past the recovered records when `commit_recovered` is set.
    pub(crate) fn commit_after(
        &self,
        recovered: &[ConsumerRecord],
        consumer: &mut dyn Consumer,
    ) -> Result<(), ListenerError> {
        if !self.commit_recovered || recovered.is_empty() {
            return Ok(());
        }

        let offsets = next_offsets(recovered);
        debug!(partitions = offsets.len(), "Committing recovered offsets");
        consumer.commit(&offsets)
    }

    /// 1-based number of the next delivery of `offset` on `partition`
    pub fn delivery_attempt(&self, partition: &TopicPartition, offset: i64) -> u32 {
        self.tracker.delivery_attempt(partition, offset)
    }

    pub(crate) fn clear_partitions(&self, partitions: &[TopicPartition]) {
        self.tracker.clear_partitions(partitions);
    }
}
