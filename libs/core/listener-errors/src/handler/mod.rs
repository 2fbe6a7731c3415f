//! Error handlers invoked by the listener container.
//!
//! [`RecordErrorHandler`] serves single-record listeners,
//! [`BatchErrorHandler`] batch listeners. [`ErrorHandlerAdapter`] lets a batch
//! handler sit where a record handler is expected.

mod adapter;
mod batch;
mod default;

pub use adapter::ErrorHandlerAdapter;
pub use batch::FallbackBatchErrorHandler;
pub use default::DefaultErrorHandler;

use crate::classifier::RetryClassification;
use crate::error::ListenerError;
use crate::exception::ListenerException;
use crate::processor::FailedRecordProcessor;
use crate::record::{seek_past, seek_to_redeliver, Consumer, ConsumerRecord, TopicPartition};
use crate::tracker::Attempt;
use async_trait::async_trait;
use std::time::Duration;
use tracing::error;

/// What a handler did with a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Sought back; the failed record is delivered again after `delay`
    Retrying {
        partition: TopicPartition,
        offset: i64,
        delivery_attempt: u32,
        delay: Duration,
    },

    /// The failed record went to the recoverer and was skipped
    Recovered {
        partition: TopicPartition,
        offset: i64,
        delivery_attempts: u32,
    },

    /// No failed index was known, so every record of the batch was recovered
    BatchRecovered { records: usize, delivery_attempts: u32 },
}

impl HandleOutcome {
    pub fn is_recovered(&self) -> bool {
        !matches!(self, HandleOutcome::Retrying { .. })
    }
}

/// Handler for failures of a single-record listener.
#[async_trait]
pub trait RecordErrorHandler: RetryClassification + Send + Sync {
    /// Handle `exception` raised for `records[0]`.
    ///
    /// `records[1..]` are the records of the same poll not yet processed; the
    /// handler seeks so they are delivered again. `Ok(None)` means there was
    /// nothing to handle.
    async fn handle_remaining(
        &self,
        exception: &ListenerException,
        records: &[ConsumerRecord],
        consumer: &mut dyn Consumer,
    ) -> Result<Option<HandleOutcome>, ListenerError>;

    /// Failure not tied to a record, e.g. a poll error
    fn handle_other(&self, exception: &ListenerException) {
        log_other(exception);
    }

    /// Drop retry state for partitions no longer assigned
    fn on_partitions_revoked(&self, _partitions: &[TopicPartition]) {}
}

/// Handler for failures of a batch listener.
#[async_trait]
pub trait BatchErrorHandler: RetryClassification + Send + Sync {
    /// Handle `exception` raised while processing `records`.
    ///
    /// `failed_index` is the position of the record that failed, when the
    /// listener knows it. Records before it count as processed.
    async fn handle_batch(
        &self,
        exception: &ListenerException,
        records: &[ConsumerRecord],
        failed_index: Option<usize>,
        consumer: &mut dyn Consumer,
    ) -> Result<Option<HandleOutcome>, ListenerError>;

    fn handle_other(&self, exception: &ListenerException) {
        log_other(exception);
    }

    fn on_partitions_revoked(&self, _partitions: &[TopicPartition]) {}
}

/// Retry or recover `records[0]`, keeping `records[1..]` for redelivery.
async fn retry_or_recover_first(
    processor: &FailedRecordProcessor,
    exception: &ListenerException,
    records: &[ConsumerRecord],
    consumer: &mut dyn Consumer,
) -> Result<Option<HandleOutcome>, ListenerError> {
    let Some(failed) = records.first() else {
        return Ok(None);
    };

    match processor.decide(failed, exception) {
        Attempt::Retry {
            delivery_attempt,
            delay,
        } => {
            processor
                .pause(failed, exception, delivery_attempt, delay)
                .await;
            seek_to_redeliver(records, consumer);

            Ok(Some(HandleOutcome::Retrying {
                partition: failed.topic_partition(),
                offset: failed.offset,
                delivery_attempt,
                delay,
            }))
        }
        Attempt::Exhausted { delivery_attempts } => {
            if let Err(e) = processor.recover(failed, exception, delivery_attempts).await {
                seek_to_redeliver(records, consumer);
                return Err(e);
            }

            seek_past(failed, &records[1..], consumer);
            processor.commit_after(std::slice::from_ref(failed), consumer)?;

            Ok(Some(HandleOutcome::Recovered {
                partition: failed.topic_partition(),
                offset: failed.offset,
                delivery_attempts,
            }))
        }
    }
}

fn log_other(exception: &ListenerException) {
    error!(
        exception_type = %exception.kind(),
        error = %exception,
        "Listener failure outside record processing"
    );
}
