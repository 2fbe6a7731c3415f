use crate::{env_parse, env_required, ConfigError, FromEnv};

/// Redis configuration for the dead-letter stream publisher
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub uri: String,
    /// Approximate MAXLEN applied to every dead-letter stream
    pub max_length: i64,
}

impl RedisConfig {
    pub fn new(uri: String) -> Self {
        Self {
            uri,
            max_length: 10_000,
        }
    }

    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_HOST; DLQ_MAX_LENGTH defaults to 10,000
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            uri: env_required("REDIS_HOST")?,
            max_length: env_parse("DLQ_MAX_LENGTH", 10_000)?,
        })
    }
}
