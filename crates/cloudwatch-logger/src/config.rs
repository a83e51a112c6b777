// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use cloudwatch_logs_stream::{ConfigError, StreamConfig, StreamIdentity};
use std::env;

const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Everything the forwarder reads from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    pub log_group: String,
    pub log_stream: String,
    pub endpoint: String,
    pub log_level: String,
    pub https_proxy: Option<String>,
    pub stream: StreamConfig,
}

impl ForwarderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|val| !val.trim().is_empty());

        let log_group = get("CWL_LOG_GROUP")
            .ok_or_else(|| ConfigError("CWL_LOG_GROUP is required".to_string()))?;
        let log_stream = get("CWL_LOG_STREAM")
            .ok_or_else(|| ConfigError("CWL_LOG_STREAM is required".to_string()))?;

        let endpoint = get("CWL_ENDPOINT").unwrap_or_else(|| {
            let region = get("CWL_REGION")
                .or_else(|| get("AWS_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string());
            format!("https://logs.{region}.amazonaws.com")
        });

        let log_level = get("CWL_LOG_LEVEL")
            .map(|val| val.trim().to_lowercase())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError(format!(
                "CWL_LOG_LEVEL must be one of {}, got {log_level}",
                LOG_LEVELS.join("/")
            )));
        }

        let https_proxy = get("CWL_PROXY_HTTPS").or_else(|| get("HTTPS_PROXY"));

        let stream = StreamConfig::from_lookup(&get)?;

        Ok(Self {
            log_group,
            log_stream,
            endpoint,
            log_level,
            https_proxy,
            stream,
        })
    }

    #[must_use]
    pub fn identity(&self) -> StreamIdentity {
        StreamIdentity::new(&self.log_group, &self.log_stream)
    }
}
