//! Per-partition tracking of failed delivery attempts.

use crate::backoff::BackOff;
use crate::exception::ExceptionType;
use crate::record::{ConsumerRecord, TopicPartition};
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// The failure currently being retried on one partition
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRecord {
    pub offset: i64,
    pub exception_type: ExceptionType,
    pub delivery_attempts: u32,
    /// Chosen when the failure is first seen and kept until it is resolved
    pub back_off: BackOff,
    pub first_failed_at: DateTime<Utc>,
}

/// What the tracker decided for one failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Redeliver after `delay`
    Retry { delivery_attempt: u32, delay: Duration },
    /// Retries used up; recover the record
    Exhausted { delivery_attempts: u32 },
}

/// Tracks the failing record of each partition.
///
/// A failure continues the current entry when it is for the same offset and,
/// with `reset_on_exception_change`, the same exception type. Anything else
/// starts a new entry.
#[derive(Debug)]
pub struct FailedRecordTracker {
    failures: Mutex<HashMap<TopicPartition, FailedRecord>>,
    reset_on_exception_change: bool,
}

impl Default for FailedRecordTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FailedRecordTracker {
    pub fn new(reset_on_exception_change: bool) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            reset_on_exception_change,
        }
    }

    /// Count one failed delivery of `record`.
    ///
    /// `back_off` is only consulted when this starts a new failure.
    pub fn record_failure(
        &self,
        record: &ConsumerRecord,
        exception_type: ExceptionType,
        back_off: impl FnOnce() -> BackOff,
    ) -> Attempt {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);

        let start = move || FailedRecord {
            offset: record.offset,
            exception_type,
            delivery_attempts: 0,
            back_off: back_off(),
            first_failed_at: Utc::now(),
        };

        let failed = match failures.entry(record.topic_partition()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                let continues = current.offset == record.offset
                    && (!self.reset_on_exception_change
                        || current.exception_type == exception_type);
                if !continues {
                    entry.insert(start());
                }
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(start()),
        };
        failed.delivery_attempts += 1;
        failed.exception_type = exception_type;

        match failed.back_off.next_delay(failed.delivery_attempts) {
            Some(delay) => Attempt::Retry {
                delivery_attempt: failed.delivery_attempts,
                delay,
            },
            None => Attempt::Exhausted {
                delivery_attempts: failed.delivery_attempts,
            },
        }
    }

    /// Move the failure `failed` over to `record`, keeping its attempt count
    /// and back-off, so a redelivery starting at `record` is still exhausted.
    pub(crate) fn carry_over(&self, failed: FailedRecord, record: &ConsumerRecord) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.insert(
            record.topic_partition(),
            FailedRecord {
                offset: record.offset,
                ..failed
            },
        );
    }

    /// Failed attempts so far for `record`, or 0 when it is not being tracked.
    pub fn attempts(&self, record: &ConsumerRecord) -> u32 {
        self.get(&record.topic_partition())
            .filter(|failed| failed.offset == record.offset)
            .map_or(0, |failed| failed.delivery_attempts)
    }

    /// 1-based attempt number of the next delivery of `offset` on `partition`.
    pub fn delivery_attempt(&self, partition: &TopicPartition, offset: i64) -> u32 {
        self.get(partition)
            .filter(|failed| failed.offset == offset)
            .map_or(1, |failed| failed.delivery_attempts + 1)
    }

    pub fn get(&self, partition: &TopicPartition) -> Option<FailedRecord> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .cloned()
    }

    /// Forget the failure of `record`'s partition if it is for `record`.
    pub fn clear(&self, record: &ConsumerRecord) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let partition = record.topic_partition();
        if failures.get(&partition).is_some_and(|f| f.offset == record.offset) {
            failures.remove(&partition);
        }
    }

    pub fn clear_partitions(&self, partitions: &[TopicPartition]) {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        for partition in partitions {
            failures.remove(partition);
        }
    }

    pub fn len(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
