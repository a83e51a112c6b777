// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Most events the remote service accepts in a single append.
pub const MAX_BATCH_SIZE: usize = 10_000;
/// Largest append payload the remote service accepts, overhead included.
pub const MAX_BATCH_BYTES: usize = 1_048_576;
const MIN_BATCH_BYTES: usize = 1024;

/// Tuning knobs of one stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Records per batch before it closes
    pub batch_size: usize,
    /// How long the oldest buffered record may wait before the batch closes
    pub batch_delay: Duration,
    /// Retries after the first attempt of a batch
    pub max_retries: u32,
    /// Ceiling on a single append call; exceeding it counts as a transport error
    pub submission_timeout: Duration,
    /// Pause before re-attempting a failed batch
    pub retry_delay: Duration,
    /// Byte budget of a batch, per-event overhead included
    pub max_batch_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            submission_timeout: DEFAULT_SUBMISSION_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_batch_bytes: MAX_BATCH_BYTES,
        }
    }
}

fn parse_var<T: std::str::FromStr>(val: Option<String>) -> Option<T> {
    val.and_then(|val| val.trim().parse::<T>().ok())
}

fn parse_millis(val: Option<String>) -> Option<Duration> {
    parse_var::<u64>(val).map(Duration::from_millis)
}

impl StreamConfig {
    /// Create configuration from `CWL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`. Unparsable values fall back to
    /// the defaults; the result must still pass [`StreamConfig::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            batch_size: parse_var(lookup("CWL_BATCH_SIZE")).unwrap_or(defaults.batch_size),
            batch_delay: parse_millis(lookup("CWL_BATCH_DELAY_MS")).unwrap_or(defaults.batch_delay),
            max_retries: parse_var(lookup("CWL_MAX_RETRIES")).unwrap_or(defaults.max_retries),
            submission_timeout: parse_millis(lookup("CWL_SUBMISSION_TIMEOUT_MS"))
                .unwrap_or(defaults.submission_timeout),
            retry_delay: parse_millis(lookup("CWL_RETRY_DELAY_MS")).unwrap_or(defaults.retry_delay),
            max_batch_bytes: parse_var(lookup("CWL_MAX_BATCH_BYTES"))
                .unwrap_or(defaults.max_batch_bytes),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError(format!(
                "batch size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }

        if self.batch_delay.is_zero() {
            return Err(ConfigError(
                "batch delay must be greater than 0".to_string(),
            ));
        }

        if self.submission_timeout.is_zero() {
            return Err(ConfigError(
                "submission timeout must be greater than 0".to_string(),
            ));
        }

        if !(MIN_BATCH_BYTES..=MAX_BATCH_BYTES).contains(&self.max_batch_bytes) {
            return Err(ConfigError(format!(
                "max batch bytes must be between {MIN_BATCH_BYTES} and {MAX_BATCH_BYTES}, got {}",
                self.max_batch_bytes
            )));
        }

        Ok(())
    }
}
