//! Records, partitions and the consumer position control a handler drives.

use crate::error::ListenerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A topic partition, displayed as `topic-partition`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// One record as delivered to a listener
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: Vec<(String, Vec<u8>)>,
    pub timestamp: DateTime<Utc>,
}

impl ConsumerRecord {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value: value.into(),
            headers: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
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

/// Position control the container lends to a handler for one handling pass.
///
/// `seek` repositions the next fetch for a partition; it takes effect on the
/// container's next poll.
#[cfg_attr(test, mockall::automock)]
pub trait Consumer: Send {
    fn seek(&mut self, partition: &TopicPartition, offset: i64);

    /// Synchronously commit the given next-offsets.
    fn commit(&mut self, offsets: &BTreeMap<TopicPartition, i64>) -> Result<(), ListenerError>;
}

/// Earliest offset per partition among `records`.
pub(crate) fn earliest_offsets(records: &[ConsumerRecord]) -> BTreeMap<TopicPartition, i64> {
    let mut offsets = BTreeMap::new();
    for record in records {
        offsets
            .entry(record.topic_partition())
            .and_modify(|o: &mut i64| *o = (*o).min(record.offset))
            .or_insert(record.offset);
    }
    offsets
}

/// Seek each partition of `records` back to its earliest offset so all of them
/// are redelivered.
pub(crate) fn seek_to_redeliver(records: &[ConsumerRecord], consumer: &mut dyn Consumer) {
    for (partition, offset) in earliest_offsets(records) {
        tracing::debug!(partition = %partition, offset, "Seeking for redelivery");
        consumer.seek(&partition, offset);
    }
}

/// Seek past `skipped` while keeping `remaining` for redelivery.
///
/// Partitions of `remaining` go back to their earliest offset. The partition
/// of `skipped` moves to `offset + 1` unless a remaining record shares it.
pub(crate) fn seek_past(
    skipped: &ConsumerRecord,
    remaining: &[ConsumerRecord],
    consumer: &mut dyn Consumer,
) {
    seek_past_all(std::slice::from_ref(skipped), remaining, consumer);
}

/// Like [`seek_past`] for several skipped records: each partition only found
/// in `skipped` moves past its highest skipped offset.
pub(crate) fn seek_past_all(
    skipped: &[ConsumerRecord],
    remaining: &[ConsumerRecord],
    consumer: &mut dyn Consumer,
) {
    let mut offsets = earliest_offsets(remaining);
    for (partition, next) in next_offsets(skipped) {
        offsets.entry(partition).or_insert(next);
    }

    for (partition, offset) in offsets {
        tracing::debug!(partition = %partition, offset, "Seeking past recovered records");
        consumer.seek(&partition, offset);
    }
}

/// Offset after the highest offset per partition among `records`.
pub(crate) fn next_offsets(records: &[ConsumerRecord]) -> BTreeMap<TopicPartition, i64> {
    let mut offsets = BTreeMap::new();
    for record in records {
        offsets
            .entry(record.topic_partition())
            .and_modify(|o: &mut i64| *o = (*o).max(record.offset + 1))
            .or_insert(record.offset + 1);
    }
    offsets
}
