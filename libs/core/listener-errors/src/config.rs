//! Error handler configuration
//!
//! `ErrorHandlerConfig` carries the retry and dead-letter settings shared by
//! both handler shapes. Build it in code or load it with [`FromEnv`].

use crate::backoff::BackOff;
use crate::processor::FailedRecordProcessor;
use crate::recoverer::{
    ConsumerRecordRecoverer, DeadLetterPublisher, DeadLetterPublishingRecoverer,
    DEFAULT_DLT_SUFFIX,
};
use core_config::{env_flag, env_or_default, env_parse, ConfigError, FromEnv};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for error handlers
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorHandlerConfig {
    /// Back-off applied to retryable failures
    pub back_off: BackOff,

    /// Commit the offset after each recovered record
    pub commit_recovered: bool,

    /// Restart the attempt count when the exception type changes
    pub reset_on_exception_change: bool,

    /// Suffix of the default dead-letter topic
    pub dlt_suffix: String,

    /// How long to wait for a dead-letter publish
    pub dlt_send_timeout: Duration,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            back_off: BackOff::default(),
            commit_recovered: false,
            reset_on_exception_change: true,
            dlt_suffix: DEFAULT_DLT_SUFFIX.to_string(),
            dlt_send_timeout: Duration::from_secs(30),
        }
    }
}

impl ErrorHandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the back-off
    pub fn with_back_off(mut self, back_off: BackOff) -> Self {
        self.back_off = back_off;
        self
    }

    /// Commit recovered offsets
    pub fn with_commit_recovered(mut self, commit: bool) -> Self {
        self.commit_recovered = commit;
        self
    }

    pub fn with_reset_on_exception_change(mut self, reset: bool) -> Self {
        self.reset_on_exception_change = reset;
        self
    }

    /// Set the dead-letter topic suffix
    pub fn with_dlt_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.dlt_suffix = suffix.into();
        self
    }

    pub fn with_dlt_send_timeout(mut self, timeout: Duration) -> Self {
        self.dlt_send_timeout = timeout;
        self
    }

    /// Processor using these settings and `recoverer`
    pub fn processor(&self, recoverer: Arc<dyn ConsumerRecordRecoverer>) -> FailedRecordProcessor {
        FailedRecordProcessor::new(recoverer)
            .with_back_off(self.back_off.clone())
            .with_commit_recovered(self.commit_recovered)
            .with_reset_state_on_exception_change(self.reset_on_exception_change)
    }

    /// Dead-letter recoverer using the configured suffix and send timeout
    pub fn dead_letter_recoverer<P: DeadLetterPublisher>(
        &self,
        publisher: P,
    ) -> DeadLetterPublishingRecoverer<P> {
        DeadLetterPublishingRecoverer::with_suffix(publisher, self.dlt_suffix.clone())
            .with_send_timeout(self.dlt_send_timeout)
    }
}

fn back_off_from_env() -> Result<BackOff, ConfigError> {
    let kind = env_or_default("LISTENER_BACKOFF", "fixed");
    let interval = Duration::from_millis(env_parse("LISTENER_BACKOFF_INTERVAL_MS", 0u64)?);
    let max_interval =
        Duration::from_millis(env_parse("LISTENER_BACKOFF_MAX_INTERVAL_MS", 30_000u64)?);
    let max_retries = env_parse("LISTENER_MAX_RETRIES", 9u32)?;

    match kind.trim().to_ascii_lowercase().as_str() {
        "fixed" => Ok(BackOff::fixed(interval, max_retries)),
        "exponential" => Ok(BackOff::exponential(interval, max_interval, max_retries)),
        "linear" => Ok(BackOff::linear(interval, max_interval, max_retries)),
        "none" => Ok(BackOff::None),
        other => Err(ConfigError::ParseError {
            key: "LISTENER_BACKOFF".to_string(),
            details: format!("expected fixed, exponential, linear or none, got '{}'", other),
        }),
    }
}

impl FromEnv for ErrorHandlerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            back_off: back_off_from_env()?,
            commit_recovered: env_flag("LISTENER_COMMIT_RECOVERED", false)?,
            reset_on_exception_change: env_flag("LISTENER_RESET_ON_EXCEPTION_CHANGE", true)?,
            dlt_suffix: env_or_default("LISTENER_DLT_SUFFIX", DEFAULT_DLT_SUFFIX),
            dlt_send_timeout: Duration::from_millis(env_parse(
                "LISTENER_DLT_SEND_TIMEOUT_MS",
                30_000u64,
            )?),
        })
    }
}
