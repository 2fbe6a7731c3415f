//! Batch handling: a failed record is skipped alone, the rest stays pending.

use listener_errors::{
    BackOff, BatchErrorHandler, Consumer, ConsumerRecord, ConsumerRecordRecoverer,
    FallbackBatchErrorHandler, FnRecoverer, HandleOutcome, ListenerError, ListenerException,
    RetryClassification, TopicPartition, ILLEGAL_STATE, TIMEOUT,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingConsumer {
    seeks: Vec<(TopicPartition, i64)>,
    commits: Vec<BTreeMap<TopicPartition, i64>>,
}

impl Consumer for RecordingConsumer {
    fn seek(&mut self, partition: &TopicPartition, offset: i64) {
        self.seeks.push((partition.clone(), offset));
    }

    fn commit(&mut self, offsets: &BTreeMap<TopicPartition, i64>) -> Result<(), ListenerError> {
        self.commits.push(offsets.clone());
        Ok(())
    }
}

fn collecting_recoverer() -> (Arc<dyn ConsumerRecordRecoverer>, Arc<Mutex<Vec<i64>>>) {
    let recovered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&recovered);
    let recoverer = FnRecoverer::new(move |record: &ConsumerRecord, _: &ListenerException| {
        sink.lock().unwrap().push(record.offset);
        Ok(())
    });
    (Arc::new(recoverer), recovered)
}

fn batch(partition: i32, offsets: std::ops::Range<i64>) -> Vec<ConsumerRecord> {
    offsets
        .map(|o| ConsumerRecord::new("payments", partition, o, format!("p{o}").into_bytes()))
        .collect()
}

#[tokio::test]
async fn test_not_retryable_record_advances_past_it_only() {
    let (recoverer, recovered) = collecting_recoverer();
    let handler = FallbackBatchErrorHandler::new(recoverer, BackOff::fixed(Duration::ZERO, 5));
    handler.add_not_retryable_exceptions(&[ILLEGAL_STATE]);

    let records = batch(0, 100..106);
    let mut consumer = RecordingConsumer::default();
    let exception = ListenerException::new(ILLEGAL_STATE, "bad state");

    let outcome = handler
        .handle_batch(&exception, &records, Some(3), &mut consumer)
        .await
        .unwrap();

    assert_eq!(*recovered.lock().unwrap(), vec![103]);
    assert_eq!(consumer.seeks, vec![(TopicPartition::new("payments", 0), 104)]);
    assert_eq!(
        outcome,
        Some(HandleOutcome::Recovered {
            partition: TopicPartition::new("payments", 0),
            offset: 103,
            delivery_attempts: 1,
        })
    );
}

#[tokio::test]
async fn test_last_record_of_batch_moves_partition_forward() {
    let (recoverer, recovered) = collecting_recoverer();
    let handler = FallbackBatchErrorHandler::new(recoverer, BackOff::None);

    let mut records = batch(0, 0..3);
    records.extend(batch(1, 0..2));
    let mut consumer = RecordingConsumer::default();
    let exception = ListenerException::new(TIMEOUT, "slow downstream");

    handler
        .handle_batch(&exception, &records, Some(4), &mut consumer)
        .await
        .unwrap();

    assert_eq!(*recovered.lock().unwrap(), vec![1]);
    assert_eq!(consumer.seeks, vec![(TopicPartition::new("payments", 1), 2)]);
}

#[tokio::test]
async fn test_retry_then_recover_same_record() {
    let (recoverer, recovered) = collecting_recoverer();
    let handler = FallbackBatchErrorHandler::from_processor(
        listener_errors::FailedRecordProcessor::new(recoverer)
            .with_back_off(BackOff::fixed(Duration::ZERO, 1))
            .with_commit_recovered(true),
    );

    let records = batch(0, 10..14);
    let exception = ListenerException::new(TIMEOUT, "slow downstream");

    let mut consumer = RecordingConsumer::default();
    let outcome = handler
        .handle_batch(&exception, &records, Some(1), &mut consumer)
        .await
        .unwrap();
    assert!(matches!(outcome, Some(HandleOutcome::Retrying { offset: 11, .. })));
    assert_eq!(consumer.seeks, vec![(TopicPartition::new("payments", 0), 11)]);

    // redelivery starts at the failed record
    let redelivered = &records[1..];
    let mut consumer = RecordingConsumer::default();
    let outcome = handler
        .handle_batch(&exception, redelivered, Some(0), &mut consumer)
        .await
        .unwrap();

    assert!(outcome.is_some_and(|o| o.is_recovered()));
    assert_eq!(*recovered.lock().unwrap(), vec![11]);
    assert_eq!(consumer.seeks, vec![(TopicPartition::new("payments", 0), 12)]);
    assert_eq!(
        consumer.commits,
        vec![BTreeMap::from([(TopicPartition::new("payments", 0), 12)])]
    );
}

#[tokio::test]
async fn test_recovering_same_record_twice_only_duplicates() {
    let (recoverer, recovered) = collecting_recoverer();
    let handler = FallbackBatchErrorHandler::new(recoverer, BackOff::None);
    let records = batch(0, 0..2);
    let exception = ListenerException::new(ILLEGAL_STATE, "bad state");

    for _ in 0..2 {
        let mut consumer = RecordingConsumer::default();
        handler
            .handle_batch(&exception, &records, Some(0), &mut consumer)
            .await
            .unwrap();
        assert_eq!(consumer.seeks, vec![(TopicPartition::new("payments", 0), 1)]);
    }

    assert_eq!(*recovered.lock().unwrap(), vec![0, 0]);
}
