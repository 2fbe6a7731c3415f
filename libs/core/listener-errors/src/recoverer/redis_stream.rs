//! Redis Streams dead-letter publisher
//!
//! Each dead-letter topic is a stream named after the topic. Entries carry the
//! raw `value`, the optional raw `key`, the destination `partition` and a JSON
//! `meta` field with the original coordinates, exception and headers.

use super::dead_letter::{DeadLetterPublisher, DeadLetterRecord};
use crate::error::ListenerError;
use crate::record::TopicPartition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_config::redis::RedisConfig;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

type StreamEntries = Vec<(String, Vec<(String, Vec<u8>)>)>;

/// Everything but the key and value, stored as JSON in the `meta` field
#[derive(Debug, Serialize, Deserialize)]
struct StreamMeta {
    headers: Vec<(String, Vec<u8>)>,
    original_topic: String,
    original_partition: i32,
    original_offset: i64,
    original_timestamp: DateTime<Utc>,
    exception_type: String,
    exception_message: String,
    cause_type: Option<String>,
    failed_at: DateTime<Utc>,
}

/// Publishes dead letters with `XADD ... MAXLEN ~`
#[derive(Clone)]
pub struct RedisStreamPublisher {
    redis: Arc<ConnectionManager>,
    max_length: i64,
}

impl RedisStreamPublisher {
    pub fn new(redis: Arc<ConnectionManager>) -> Self {
        Self {
            redis,
            max_length: 10_000,
        }
    }

    /// Open a managed connection from configuration
    pub async fn connect(config: &RedisConfig) -> Result<Self, ListenerError> {
        let client = redis::Client::open(config.uri.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        info!(max_length = config.max_length, "Connected dead-letter publisher to Redis");
        Ok(Self::new(Arc::new(manager)).with_max_length(config.max_length))
    }

    /// Set the approximate maximum length of each dead-letter stream
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn max_length(&self) -> i64 {
        self.max_length
    }

    /// Number of entries in the dead-letter stream of `topic`
    pub async fn len(&self, topic: &str) -> Result<i64, ListenerError> {
        let mut conn = (*self.redis).clone();
        Ok(conn.xlen(topic).await?)
    }

    /// Read back up to `count` dead letters of `topic`, oldest first
    pub async fn read(
        &self,
        topic: &str,
        count: usize,
    ) -> Result<Vec<(String, DeadLetterRecord)>, ListenerError> {
        let mut conn = (*self.redis).clone();

        let entries: StreamEntries = redis::cmd("XRANGE")
            .arg(topic)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut results = Vec::with_capacity(entries.len());
        for (id, fields) in entries {
            let field = |name: &str| {
                fields
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
            };

            let Some(meta) = field("meta") else {
                debug!(topic = %topic, id = %id, "Skipping stream entry without meta");
                continue;
            };
            let meta: StreamMeta = serde_json::from_slice(&meta)?;

            results.push((
                id,
                DeadLetterRecord {
                    key: field("key"),
                    value: field("value").unwrap_or_default(),
                    headers: meta.headers,
                    original_topic: meta.original_topic,
                    original_partition: meta.original_partition,
                    original_offset: meta.original_offset,
                    original_timestamp: meta.original_timestamp,
                    exception_type: meta.exception_type,
                    exception_message: meta.exception_message,
                    cause_type: meta.cause_type,
                    failed_at: meta.failed_at,
                },
            ));
        }

        Ok(results)
    }
}

#[async_trait]
impl DeadLetterPublisher for RedisStreamPublisher {
    async fn publish(
        &self,
        destination: &TopicPartition,
        record: &DeadLetterRecord,
    ) -> Result<String, ListenerError> {
        let meta = serde_json::to_string(&StreamMeta {
            headers: record.headers.clone(),
            original_topic: record.original_topic.clone(),
            original_partition: record.original_partition,
            original_offset: record.original_offset,
            original_timestamp: record.original_timestamp,
            exception_type: record.exception_type.clone(),
            exception_message: record.exception_message.clone(),
            cause_type: record.cause_type.clone(),
            failed_at: record.failed_at,
        })?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&destination.topic)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*");
        if let Some(key) = &record.key {
            cmd.arg("key").arg(key.as_slice());
        }
        cmd.arg("value")
            .arg(record.value.as_slice())
            .arg("partition")
            .arg(destination.partition)
            .arg("meta")
            .arg(&meta);

        let mut conn = (*self.redis).clone();
        let id: String = cmd.query_async(&mut conn).await.map_err(|e| {
            ListenerError::DeadLetterPublish(format!("XADD to {destination} failed: {e}"))
        })?;

        debug!(
            destination = %destination,
            dead_letter_id = %id,
            original_offset = record.original_offset,
            "Appended dead letter to stream"
        );

        Ok(id)
    }
}
