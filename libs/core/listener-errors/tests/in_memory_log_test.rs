//! A small container loop over an in-memory, two-partition log.
//!
//! Every record must end up either processed or dead-lettered exactly once,
//! and processing within a partition must follow offset order.

use listener_errors::{
    BackOff, Consumer, ConsumerRecord, ConsumerRecordRecoverer, DefaultErrorHandler,
    ErrorHandlerAdapter, FailedRecordProcessor, FallbackBatchErrorHandler, FnRecoverer,
    ListenerError, ListenerException, RecordErrorHandler, TopicPartition, DESERIALIZATION,
    ILLEGAL_STATE,
};
use core_config::tracing::init_tracing;
use core_config::Environment;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::assertions::assert_in_order;
use test_utils::TestDataBuilder;

const PARTITIONS: i32 = 2;
const RECORDS_PER_PARTITION: i64 = 12;
const POLL_SIZE: i64 = 3;

struct InMemoryLog {
    records: BTreeMap<TopicPartition, Vec<ConsumerRecord>>,
    positions: BTreeMap<TopicPartition, i64>,
    committed: BTreeMap<TopicPartition, i64>,
}

impl InMemoryLog {
    fn new(builder: &TestDataBuilder) -> Self {
        let topic = builder.topic("orders");
        let mut records = BTreeMap::new();
        let mut positions = BTreeMap::new();
        for partition in 0..PARTITIONS {
            let tp = TopicPartition::new(topic.clone(), partition);
            let log = (0..RECORDS_PER_PARTITION)
                .map(|offset| {
                    let index = offset as u64;
                    ConsumerRecord::new(topic.clone(), partition, offset, builder.payload(index))
                        .with_key(builder.key(index))
                })
                .collect();
            records.insert(tp.clone(), log);
            positions.insert(tp, 0);
        }
        Self {
            records,
            positions,
            committed: BTreeMap::new(),
        }
    }

    /// Next records from every partition, interleaved, advancing positions
    fn poll(&mut self) -> Vec<ConsumerRecord> {
        let mut polled = Vec::new();
        for (tp, log) in &self.records {
            let position = self.positions[tp];
            let end = (position + POLL_SIZE).min(log.len() as i64);
            for offset in position..end {
                polled.push(log[offset as usize].clone());
            }
            self.positions.insert(tp.clone(), end);
        }
        polled.sort_by_key(|r| (r.offset, r.partition));
        polled
    }
}

impl Consumer for InMemoryLog {
    fn seek(&mut self, partition: &TopicPartition, offset: i64) {
        self.positions.insert(partition.clone(), offset);
    }

    fn commit(&mut self, offsets: &BTreeMap<TopicPartition, i64>) -> Result<(), ListenerError> {
        self.committed.extend(offsets.iter().map(|(tp, o)| (tp.clone(), *o)));
        Ok(())
    }
}

/// Listener that fails in three ways:
/// offset 3 on partition 0 can never be parsed, offset 5 fails twice before
/// succeeding, offset 8 on partition 1 always fails.
struct FlakyListener {
    deliveries: HashMap<(i32, i64), u32>,
    processed: BTreeMap<i32, Vec<i64>>,
}

impl FlakyListener {
    fn new() -> Self {
        Self {
            deliveries: HashMap::new(),
            processed: BTreeMap::new(),
        }
    }

    fn on_message(&mut self, record: &ConsumerRecord) -> Result<(), ListenerException> {
        let delivery = self
            .deliveries
            .entry((record.partition, record.offset))
            .or_insert(0);
        *delivery += 1;

        match (record.partition, record.offset) {
            (0, 3) => Err(ListenerException::new(DESERIALIZATION, "unparseable payload")),
            (_, 5) if *delivery <= 2 => Err(ListenerException::new(ILLEGAL_STATE, "transient")),
            (1, 8) => Err(ListenerException::new(ILLEGAL_STATE, "downstream rejects record")),
            _ => {
                self.processed
                    .entry(record.partition)
                    .or_default()
                    .push(record.offset);
                Ok(())
            }
        }
    }
}

fn init() {
    init_tracing(&Environment::from_env());
}

async fn run_container(
    handler: &dyn RecordErrorHandler,
    log: &mut InMemoryLog,
    listener: &mut FlakyListener,
) {
    for _ in 0..200 {
        let records = log.poll();
        if records.is_empty() {
            return;
        }

        for (index, record) in records.iter().enumerate() {
            if let Err(exception) = listener.on_message(record) {
                handler
                    .handle_remaining(&exception, &records[index..], &mut *log)
                    .await
                    .unwrap();
                break;
            }
        }
    }
    panic!("container did not drain the log");
}

fn dead_letter_sink() -> (Arc<dyn ConsumerRecordRecoverer>, Arc<Mutex<Vec<(i32, i64)>>>) {
    let dead = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&dead);
    let recoverer = FnRecoverer::new(move |record: &ConsumerRecord, _: &ListenerException| {
        sink.lock().unwrap().push((record.partition, record.offset));
        Ok(())
    });
    (Arc::new(recoverer), dead)
}

fn assert_exactly_once(listener: &FlakyListener, dead: &[(i32, i64)]) {
    for partition in 0..PARTITIONS {
        let processed = listener.processed.get(&partition).cloned().unwrap_or_default();
        assert_in_order(&processed, &format!("partition {partition}"));

        let mut seen: Vec<i64> = processed.clone();
        seen.extend(dead.iter().filter(|(p, _)| *p == partition).map(|(_, o)| *o));
        seen.sort_unstable();
        assert_eq!(
            seen,
            (0..RECORDS_PER_PARTITION).collect::<Vec<_>>(),
            "partition {partition}: every record processed or dead-lettered exactly once"
        );
    }
}

#[tokio::test]
async fn test_record_handler_processes_or_dead_letters_each_record_once() {
    init();
    let builder = TestDataBuilder::from_test_name("record_handler_exactly_once");
    let (recoverer, dead) = dead_letter_sink();
    let handler = DefaultErrorHandler::from_processor(
        FailedRecordProcessor::new(recoverer)
            .with_back_off(BackOff::fixed(Duration::ZERO, 2))
            .with_commit_recovered(true),
    );

    let mut log = InMemoryLog::new(&builder);
    let mut listener = FlakyListener::new();
    run_container(&handler, &mut log, &mut listener).await;

    let dead = dead.lock().unwrap().clone();
    assert_eq!(dead, vec![(0, 3), (1, 8)]);
    assert_exactly_once(&listener, &dead);

    // offset 8 on partition 1 was delivered once plus two retries
    assert_eq!(listener.deliveries[&(1, 8)], 3);
    assert_eq!(listener.deliveries[&(0, 3)], 1);

    let topic = builder.topic("orders");
    assert_eq!(log.committed[&TopicPartition::new(topic.clone(), 0)], 4);
    assert_eq!(log.committed[&TopicPartition::new(topic, 1)], 9);
}

#[tokio::test]
async fn test_adapted_batch_handler_processes_or_dead_letters_each_record_once() {
    init();
    let builder = TestDataBuilder::from_test_name("adapted_batch_exactly_once");
    let (recoverer, dead) = dead_letter_sink();
    let delegate = Arc::new(FallbackBatchErrorHandler::new(
        recoverer,
        BackOff::fixed(Duration::ZERO, 2),
    ));
    let handler = ErrorHandlerAdapter::new(delegate);

    let mut log = InMemoryLog::new(&builder);
    let mut listener = FlakyListener::new();
    run_container(&handler, &mut log, &mut listener).await;

    let dead = dead.lock().unwrap().clone();
    assert_eq!(dead, vec![(0, 3), (1, 8)]);
    assert_exactly_once(&listener, &dead);
}
