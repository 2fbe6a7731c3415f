use super::{BatchErrorHandler, HandleOutcome, RecordErrorHandler};
use crate::classifier::{ExceptionClassifier, RetryClassification};
use crate::error::ListenerError;
use crate::exception::{ExceptionType, ListenerException};
use crate::record::{Consumer, ConsumerRecord, TopicPartition};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Presents a [`BatchErrorHandler`] as a [`RecordErrorHandler`].
///
/// Holds nothing but the delegate. Every classification call goes to the
/// delegate and returns its answer unchanged; record failures are handed over
/// as a batch whose failed index is 0.
pub struct ErrorHandlerAdapter<B: ?Sized> {
    delegate: Arc<B>,
}

impl<B: BatchErrorHandler + ?Sized> ErrorHandlerAdapter<B> {
    pub fn new(delegate: Arc<B>) -> Self {
        Self { delegate }
    }

    pub fn delegate(&self) -> &Arc<B> {
        &self.delegate
    }
}

impl<B: ?Sized> Clone for ErrorHandlerAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
        }
    }
}

impl<B: BatchErrorHandler + ?Sized> RetryClassification for ErrorHandlerAdapter<B> {
    fn classifier(&self) -> &ExceptionClassifier {
        self.delegate.classifier()
    }

    fn add_not_retryable_exceptions(&self, types: &[ExceptionType]) {
        self.delegate.add_not_retryable_exceptions(types);
    }

    fn add_retryable_exceptions(&self, types: &[ExceptionType]) {
        self.delegate.add_retryable_exceptions(types);
    }

    fn set_classifications(
        &self,
        classifications: HashMap<ExceptionType, bool>,
        default_retryable: bool,
    ) {
        self.delegate
            .set_classifications(classifications, default_retryable);
    }

    fn remove_classification(&self, kind: ExceptionType) -> Option<bool> {
        self.delegate.remove_classification(kind)
    }

    fn default_false(&self) {
        self.delegate.default_false();
    }
}

#[async_trait]
impl<B: BatchErrorHandler + ?Sized> RecordErrorHandler for ErrorHandlerAdapter<B> {
    async fn handle_remaining(
        &self,
        exception: &ListenerException,
        records: &[ConsumerRecord],
        consumer: &mut dyn Consumer,
    ) -> Result<Option<HandleOutcome>, ListenerError> {
        self.delegate
            .handle_batch(exception, records, Some(0), consumer)
            .await
    }

    fn handle_other(&self, exception: &ListenerException) {
        self.delegate.handle_other(exception);
    }

    fn on_partitions_revoked(&self, partitions: &[TopicPartition]) {
        self.delegate.on_partitions_revoked(partitions);
    }
}
