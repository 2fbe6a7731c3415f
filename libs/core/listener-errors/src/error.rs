//! Error types for the handling pass.
//!
//! A [`ListenerError`] returned from a handler means the pass did not finish:
//! the container decides whether to stop the worker or run the pass again.
//! Records are never reported as recovered when one is returned.

use crate::record::TopicPartition;
use thiserror::Error;

/// Errors surfaced by handlers, recoverers and publishers
#[derive(Error, Debug)]
pub enum ListenerError {
    /// The recoverer failed; the record was sought back for redelivery
    #[error("Recovery failed for {partition}@{offset}: {source}")]
    RecoveryFailed {
        partition: TopicPartition,
        offset: i64,
        #[source]
        source: Box<ListenerError>,
    },

    /// Dead-letter publication failed
    #[error("Dead-letter publish failed: {0}")]
    DeadLetterPublish(String),

    /// A blocking operation did not complete in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Committing offsets through the consumer failed
    #[error("Offset commit failed: {0}")]
    Commit(String),

    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ListenerError {
    pub(crate) fn recovery_failed(
        partition: TopicPartition,
        offset: i64,
        source: ListenerError,
    ) -> Self {
        ListenerError::RecoveryFailed {
            partition,
            offset,
            source: Box::new(source),
        }
    }

    /// Whether the recoverer, rather than the container plumbing, failed
    pub fn is_recovery_failure(&self) -> bool {
        matches!(self, ListenerError::RecoveryFailed { .. })
    }
}

impl From<serde_json::Error> for ListenerError {
    fn from(err: serde_json::Error) -> Self {
        ListenerError::Serialization(err.to_string())
    }
}

impl From<core_config::ConfigError> for ListenerError {
    fn from(err: core_config::ConfigError) -> Self {
        ListenerError::Config(err.to_string())
    }
}
