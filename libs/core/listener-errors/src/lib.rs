//! Listener Error Handling
//!
//! Decides what happens when a message listener fails: retry the record with
//! back-off, skip it, or hand it to a recoverer such as a dead-letter
//! publisher.
//!
//! ## Features
//!
//! - **Hierarchy-aware classification**: `ExceptionClassifier` maps exception
//!   types (and their causes) to retryable / not retryable
//! - **Record and batch handlers**: `DefaultErrorHandler` for single-record
//!   listeners, `FallbackBatchErrorHandler` for batch listeners
//! - **Adapter**: `ErrorHandlerAdapter` drives a batch handler through the
//!   record handler API, sharing its classifier
//! - **Dead-letter publication**: `DeadLetterPublishingRecoverer` over Redis
//!   Streams or any `DeadLetterPublisher`
//! - **Prometheus metrics**: retry and recovery counters
//!
//! ## Example
//!
//! ```ignore
//! use listener_errors::{
//!     BackOff, DeadLetterPublishingRecoverer, DefaultErrorHandler, RecordErrorHandler,
//!     RedisStreamPublisher, RetryClassification, ILLEGAL_ARGUMENT,
//! };
//!
//! let publisher = RedisStreamPublisher::connect(&redis_config).await?;
//! let handler = DefaultErrorHandler::new(
//!     Arc::new(DeadLetterPublishingRecoverer::new(publisher)),
//!     BackOff::fixed(Duration::from_millis(500), 3),
//! );
//! handler.add_not_retryable_exceptions(&[ILLEGAL_ARGUMENT]);
//!
//! // in the container, when the listener fails on records[0]:
//! handler.handle_remaining(&exception, &records, &mut consumer).await?;
//! ```

mod backoff;
mod classifier;
mod config;
mod error;
mod exception;
mod handler;
pub mod metrics;
mod processor;
mod record;
mod recoverer;
mod retry_listener;
mod tracker;

// Re-export main types
pub use backoff::BackOff;
pub use classifier::{ExceptionClassifier, RetryClassification};
pub use config::ErrorHandlerConfig;
pub use error::ListenerError;
pub use exception::*;
pub use handler::{
    BatchErrorHandler, DefaultErrorHandler, ErrorHandlerAdapter, FallbackBatchErrorHandler,
    HandleOutcome, RecordErrorHandler,
};
pub use metrics::{init_metrics, ErrorHandlerMetrics};
pub use processor::{BackOffFunction, FailedRecordProcessor};
pub use record::{Consumer, ConsumerRecord, TopicPartition};
pub use recoverer::{
    ConsumerRecordRecoverer, DeadLetterPublisher, DeadLetterPublishingRecoverer,
    DeadLetterRecord, DestinationResolver, FnRecoverer, LoggingRecoverer, RedisStreamPublisher,
    DEFAULT_DLT_SUFFIX, HEADER_EXCEPTION_CAUSE_TYPE, HEADER_EXCEPTION_MESSAGE,
    HEADER_EXCEPTION_TYPE, HEADER_ORIGINAL_OFFSET, HEADER_ORIGINAL_PARTITION,
    HEADER_ORIGINAL_TIMESTAMP, HEADER_ORIGINAL_TOPIC,
};
pub use retry_listener::{MetricsRetryListener, RetryListener};
pub use tracker::{Attempt, FailedRecord, FailedRecordTracker};
