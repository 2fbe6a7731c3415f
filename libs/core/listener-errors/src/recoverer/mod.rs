//! Terminal actions for records that will not be retried.
//!
//! A recoverer may be invoked twice for the same record when a worker crashes
//! between recovery and the seek past it. Implementations must tolerate that;
//! a duplicate downstream entry is acceptable, corruption is not.

mod dead_letter;
mod redis_stream;

pub use dead_letter::{
    DeadLetterPublisher, DeadLetterPublishingRecoverer, DeadLetterRecord, DestinationResolver,
    DEFAULT_DLT_SUFFIX, HEADER_EXCEPTION_CAUSE_TYPE, HEADER_EXCEPTION_MESSAGE,
    HEADER_EXCEPTION_TYPE, HEADER_ORIGINAL_OFFSET, HEADER_ORIGINAL_PARTITION,
    HEADER_ORIGINAL_TIMESTAMP, HEADER_ORIGINAL_TOPIC,
};
pub use redis_stream::RedisStreamPublisher;

use crate::error::ListenerError;
use crate::exception::ListenerException;
use crate::record::ConsumerRecord;
use async_trait::async_trait;
use tracing::error;

/// Accepts a failed record and durably records or re-routes it.
///
/// Returning `Err` means the record was *not* recovered: the handler seeks
/// back so it is redelivered and propagates the error to the container.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerRecordRecoverer: Send + Sync {
    async fn accept(
        &self,
        record: &ConsumerRecord,
        exception: &ListenerException,
    ) -> Result<(), ListenerError>;
}

/// Logs the record and drops it. Used when no recoverer is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingRecoverer;

#[async_trait]
impl ConsumerRecordRecoverer for LoggingRecoverer {
    async fn accept(
        &self,
        record: &ConsumerRecord,
        exception: &ListenerException,
    ) -> Result<(), ListenerError> {
        error!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            exception_type = %exception.kind(),
            error = %exception,
            "Retries exhausted or not retryable, dropping record"
        );
        Ok(())
    }
}

/// Custom sink built from a closure.
///
/// ```rust,ignore
/// let recoverer = FnRecoverer::new(|record, exception| {
///     audit_log.append(record.offset, exception.message());
///     Ok(())
/// });
/// ```
pub struct FnRecoverer<F> {
    f: F,
}

impl<F> FnRecoverer<F>
where
    F: Fn(&ConsumerRecord, &ListenerException) -> Result<(), ListenerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ConsumerRecordRecoverer for FnRecoverer<F>
where
    F: Fn(&ConsumerRecord, &ListenerException) -> Result<(), ListenerError> + Send + Sync,
{
    async fn accept(
        &self,
        record: &ConsumerRecord,
        exception: &ListenerException,
    ) -> Result<(), ListenerError> {
        (self.f)(record, exception)
    }
}
