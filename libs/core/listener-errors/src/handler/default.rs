use super::{retry_or_recover_first, HandleOutcome, RecordErrorHandler};
use crate::backoff::BackOff;
use crate::classifier::{ExceptionClassifier, RetryClassification};
use crate::error::ListenerError;
use crate::exception::ListenerException;
use crate::processor::FailedRecordProcessor;
use crate::record::{Consumer, ConsumerRecord, TopicPartition};
use crate::recoverer::ConsumerRecordRecoverer;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Retries a failed record with back-off, then hands it to the recoverer.
///
/// The whole remainder of the poll is sought back on every retry so records
/// are redelivered in order. Once the record is recovered only it is skipped.
#[derive(Default)]
pub struct DefaultErrorHandler {
    processor: FailedRecordProcessor,
}

impl DefaultErrorHandler {
    pub fn new(recoverer: Arc<dyn ConsumerRecordRecoverer>, back_off: BackOff) -> Self {
        Self::from_processor(FailedRecordProcessor::new(recoverer).with_back_off(back_off))
    }

    pub fn from_processor(processor: FailedRecordProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &FailedRecordProcessor {
        &self.processor
    }

    /// 1-based number of the next delivery of `offset` on `partition`
    pub fn delivery_attempt(&self, partition: &TopicPartition, offset: i64) -> u32 {
        self.processor.delivery_attempt(partition, offset)
    }
}

impl RetryClassification for DefaultErrorHandler {
    fn classifier(&self) -> &ExceptionClassifier {
        self.processor.classifier()
    }
}

#[async_trait]
impl RecordErrorHandler for DefaultErrorHandler {
    async fn handle_remaining(
        &self,
        exception: &ListenerException,
        records: &[ConsumerRecord],
        consumer: &mut dyn Consumer,
    ) -> Result<Option<HandleOutcome>, ListenerError> {
        if records.is_empty() {
            debug!(error = %exception, "No records to handle");
            return Ok(None);
        }

        retry_or_recover_first(&self.processor, exception, records, consumer).await
    }

    fn on_partitions_revoked(&self, partitions: &[TopicPartition]) {
        debug!(count = partitions.len(), "Clearing retry state for revoked partitions");
        self.processor.clear_partitions(partitions);
    }
}
