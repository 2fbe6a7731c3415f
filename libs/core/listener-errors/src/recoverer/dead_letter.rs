//! Dead-letter publication of failed records.

use super::ConsumerRecordRecoverer;
use crate::error::ListenerError;
use crate::exception::ListenerException;
use crate::record::{ConsumerRecord, TopicPartition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Suffix appended to the original topic by the default destination resolver
pub const DEFAULT_DLT_SUFFIX: &str = ".DLT";

pub const HEADER_ORIGINAL_TOPIC: &str = "dlt-original-topic";
pub const HEADER_ORIGINAL_PARTITION: &str = "dlt-original-partition";
pub const HEADER_ORIGINAL_OFFSET: &str = "dlt-original-offset";
pub const HEADER_ORIGINAL_TIMESTAMP: &str = "dlt-original-timestamp";
pub const HEADER_EXCEPTION_TYPE: &str = "dlt-exception-type";
pub const HEADER_EXCEPTION_MESSAGE: &str = "dlt-exception-message";
pub const HEADER_EXCEPTION_CAUSE_TYPE: &str = "dlt-exception-cause-type";

/// Picks the dead-letter destination; `None` discards the record.
pub type DestinationResolver =
    Arc<dyn Fn(&ConsumerRecord, &ListenerException) -> Option<TopicPartition> + Send + Sync>;

/// What gets written to the dead-letter destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Original record key
    pub key: Option<Vec<u8>>,

    /// Original record value, untouched
    pub value: Vec<u8>,

    /// Original headers followed by the `dlt-*` headers
    pub headers: Vec<(String, Vec<u8>)>,

    pub original_topic: String,
    pub original_partition: i32,
    pub original_offset: i64,
    pub original_timestamp: DateTime<Utc>,

    pub exception_type: String,
    pub exception_message: String,
    pub cause_type: Option<String>,

    /// When the record was routed to the dead-letter destination
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn from_failure(record: &ConsumerRecord, exception: &ListenerException) -> Self {
        let cause_type = exception
            .cause()
            .map(|cause| cause.kind().name().to_string());

        let mut headers = record.headers.clone();
        headers.push((HEADER_ORIGINAL_TOPIC.to_string(), record.topic.clone().into_bytes()));
        headers.push((
            HEADER_ORIGINAL_PARTITION.to_string(),
            record.partition.to_string().into_bytes(),
        ));
        headers.push((
            HEADER_ORIGINAL_OFFSET.to_string(),
            record.offset.to_string().into_bytes(),
        ));
        headers.push((
            HEADER_ORIGINAL_TIMESTAMP.to_string(),
            record.timestamp.timestamp_millis().to_string().into_bytes(),
        ));
        headers.push((
            HEADER_EXCEPTION_TYPE.to_string(),
            exception.kind().name().as_bytes().to_vec(),
        ));
        headers.push((
            HEADER_EXCEPTION_MESSAGE.to_string(),
            exception.message().as_bytes().to_vec(),
        ));
        if let Some(cause) = &cause_type {
            headers.push((HEADER_EXCEPTION_CAUSE_TYPE.to_string(), cause.clone().into_bytes()));
        }

        Self {
            key: record.key.clone(),
            value: record.value.clone(),
            headers,
            original_topic: record.topic.clone(),
            original_partition: record.partition,
            original_offset: record.offset,
            original_timestamp: record.timestamp,
            exception_type: exception.kind().name().to_string(),
            exception_message: exception.message().to_string(),
            cause_type,
            failed_at: Utc::now(),
        }
    }

    /// Last value of header `name`, if present
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }
}

/// Producer seam for dead-letter publication.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    /// Durably write `record` to `destination`, returning the destination's
    /// id for the entry.
    async fn publish(
        &self,
        destination: &TopicPartition,
        record: &DeadLetterRecord,
    ) -> Result<String, ListenerError>;
}

/// Recoverer that routes failed records to a dead-letter destination.
///
/// Publication is awaited; a failure or a send that exceeds `send_timeout`
/// fails the recovery so the record is redelivered rather than lost.
pub struct DeadLetterPublishingRecoverer<P> {
    publisher: P,
    resolver: DestinationResolver,
    send_timeout: Duration,
}

impl<P: DeadLetterPublisher> DeadLetterPublishingRecoverer<P> {
    /// Publish to the same partition of `<topic>.DLT`
    pub fn new(publisher: P) -> Self {
        Self::with_suffix(publisher, DEFAULT_DLT_SUFFIX)
    }

    /// Publish to the same partition of `<topic><suffix>`
    pub fn with_suffix(publisher: P, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self {
            publisher,
            resolver: Arc::new(move |record: &ConsumerRecord, _: &ListenerException| {
                Some(TopicPartition::new(
                    format!("{}{}", record.topic, suffix),
                    record.partition,
                ))
            }),
            send_timeout: Duration::from_secs(30),
        }
    }

    /// Replace the destination resolver
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&ConsumerRecord, &ListenerException) -> Option<TopicPartition>
            + Send
            + Sync
            + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Set how long to wait for the publisher
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

#[async_trait]
impl<P: DeadLetterPublisher> ConsumerRecordRecoverer for DeadLetterPublishingRecoverer<P> {
    async fn accept(
        &self,
        record: &ConsumerRecord,
        exception: &ListenerException,
    ) -> Result<(), ListenerError> {
        let Some(destination) = (self.resolver)(record, exception) else {
            warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "No dead-letter destination resolved, record discarded"
            );
            return Ok(());
        };

        let dead_letter = DeadLetterRecord::from_failure(record, exception);

        let id = tokio::time::timeout(
            self.send_timeout,
            self.publisher.publish(&destination, &dead_letter),
        )
        .await
        .map_err(|_| {
            ListenerError::Timeout(format!(
                "dead-letter publish to {} after {:?}",
                destination, self.send_timeout
            ))
        })??;

        info!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            destination = %destination,
            dead_letter_id = %id,
            exception_type = %exception.kind(),
            "Published record to dead-letter destination"
        );

        Ok(())
    }
}
