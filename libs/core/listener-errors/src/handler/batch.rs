use super::{retry_or_recover_first, BatchErrorHandler, HandleOutcome};
use crate::backoff::BackOff;
use crate::classifier::{ExceptionClassifier, RetryClassification};
use crate::error::ListenerError;
use crate::exception::ListenerException;
use crate::processor::FailedRecordProcessor;
use crate::record::{seek_past_all, seek_to_redeliver, Consumer, ConsumerRecord, TopicPartition};
use crate::recoverer::ConsumerRecordRecoverer;
use crate::tracker::Attempt;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Error handler for batch listeners.
///
/// When the listener reports which record failed, records before it are
/// treated as processed and the failed record is retried or recovered on its
/// own. Without that index the whole batch is retried and, once retries run
/// out, every record of it is recovered in order.
#[derive(Default)]
pub struct FallbackBatchErrorHandler {
    processor: FailedRecordProcessor,
}

impl FallbackBatchErrorHandler {
    pub fn new(recoverer: Arc<dyn ConsumerRecordRecoverer>, back_off: BackOff) -> Self {
        Self::from_processor(FailedRecordProcessor::new(recoverer).with_back_off(back_off))
    }

    pub fn from_processor(processor: FailedRecordProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &FailedRecordProcessor {
        &self.processor
    }

    async fn handle_whole_batch(
        &self,
        exception: &ListenerException,
        records: &[ConsumerRecord],
        consumer: &mut dyn Consumer,
    ) -> Result<Option<HandleOutcome>, ListenerError> {
        let first = &records[0];

        let delivery_attempts = match self.processor.decide(first, exception) {
            Attempt::Retry {
                delivery_attempt,
                delay,
            } => {
                self.processor
                    .pause(first, exception, delivery_attempt, delay)
                    .await;
                seek_to_redeliver(records, consumer);

                return Ok(Some(HandleOutcome::Retrying {
                    partition: first.topic_partition(),
                    offset: first.offset,
                    delivery_attempt,
                    delay,
                }));
            }
            Attempt::Exhausted { delivery_attempts } => delivery_attempts,
        };

        warn!(
            records = records.len(),
            delivery_attempts,
            "Retries exhausted for batch, recovering every record"
        );

        // Recovering records[0] clears its entry; keep it for a failed remainder
        let exhausted = self
            .processor
            .tracker()
            .get(&first.topic_partition())
            .filter(|failed| failed.offset == first.offset);

        for (index, record) in records.iter().enumerate() {
            if let Err(e) = self
                .processor
                .recover(record, exception, delivery_attempts)
                .await
            {
                if let Some(failed) = exhausted {
                    self.processor.tracker().carry_over(failed, record);
                }
                seek_past_all(&records[..index], &records[index..], consumer);
                return Err(e);
            }
        }

        seek_past_all(records, &[], consumer);
        self.processor.commit_after(records, consumer)?;

        Ok(Some(HandleOutcome::BatchRecovered {
            records: records.len(),
            delivery_attempts,
        }))
    }
}

impl RetryClassification for FallbackBatchErrorHandler {
    fn classifier(&self) -> &ExceptionClassifier {
        self.processor.classifier()
    }
}

#[async_trait]
impl BatchErrorHandler for FallbackBatchErrorHandler {
    async fn handle_batch(
        &self,
        exception: &ListenerException,
        records: &[ConsumerRecord],
        failed_index: Option<usize>,
        consumer: &mut dyn Consumer,
    ) -> Result<Option<HandleOutcome>, ListenerError> {
        if records.is_empty() {
            debug!(error = %exception, "Empty batch, nothing to handle");
            return Ok(None);
        }

        match failed_index.filter(|index| *index < records.len()) {
            Some(index) => {
                retry_or_recover_first(&self.processor, exception, &records[index..], consumer)
                    .await
            }
            None => {
                if let Some(index) = failed_index {
                    warn!(
                        index,
                        records = records.len(),
                        "Failed index outside batch, handling whole batch"
                    );
                }
                self.handle_whole_batch(exception, records, consumer).await
            }
        }
    }

    fn on_partitions_revoked(&self, partitions: &[TopicPartition]) {
        debug!(count = partitions.len(), "Clearing retry state for revoked partitions");
        self.processor.clear_partitions(partitions);
    }
}
