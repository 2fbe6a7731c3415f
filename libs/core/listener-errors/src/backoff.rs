//! Back-off policies for redelivering failed records.

use std::time::Duration;

/// Delay between deliveries of a failing record, and how many retries it gets.
///
/// `max_retries` counts redeliveries, not deliveries: `Fixed { max_retries: 9 }`
/// allows ten delivery attempts before the record is recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackOff {
    /// No retries; the first failure goes to recovery
    None,

    /// Fixed delay between retries
    Fixed { interval: Duration, max_retries: u32 },

    /// Exponential back-off (initial * 2^retry, capped at max_interval)
    Exponential {
        initial: Duration,
        max_interval: Duration,
        max_retries: u32,
    },

    /// Linear back-off (initial * (retry + 1), capped at max_interval)
    Linear {
        initial: Duration,
        max_interval: Duration,
        max_retries: u32,
    },
}

impl Default for BackOff {
    fn default() -> Self {
        BackOff::Fixed {
            interval: Duration::ZERO,
            max_retries: 9,
        }
    }
}

impl BackOff {
    pub fn fixed(interval: Duration, max_retries: u32) -> Self {
        BackOff::Fixed {
            interval,
            max_retries,
        }
    }

    pub fn exponential(initial: Duration, max_interval: Duration, max_retries: u32) -> Self {
        BackOff::Exponential {
            initial,
            max_interval,
            max_retries,
        }
    }

    pub fn linear(initial: Duration, max_interval: Duration, max_retries: u32) -> Self {
        BackOff::Linear {
            initial,
            max_interval,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            BackOff::None => 0,
            BackOff::Fixed { max_retries, .. }
            | BackOff::Exponential { max_retries, .. }
            | BackOff::Linear { max_retries, .. } => *max_retries,
        }
    }

    /// Delay before the next delivery after the `failures`-th failed delivery.
    ///
    /// Returns `None` once retries are exhausted (or for `failures == 0`,
    /// which is not a failure).
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.max_retries() {
            return None;
        }

        let retry = failures - 1;
        let delay = match self {
            BackOff::None => return None,
            BackOff::Fixed { interval, .. } => *interval,
            BackOff::Exponential {
                initial,
                max_interval,
                ..
            } => initial
                .saturating_mul(2u32.saturating_pow(retry))
                .min(*max_interval),
            BackOff::Linear {
                initial,
                max_interval,
                ..
            } => initial.saturating_mul(retry.saturating_add(1)).min(*max_interval),
        };
        Some(delay)
    }
}
