// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport speaking the CloudWatch Logs JSON 1.1 protocol.
//!
//! Every operation is a `POST /` with the operation named in the
//! `X-Amz-Target` header. Error responses carry the error name in `__type`,
//! which is mapped onto [`RemoteError`].
//!
//! Requests are sent unsigned: the endpoint is expected to be a local
//! emulator or a signing proxy.

use crate::api::{AppendRequest, AppendResponse, LogsApi};
use crate::cursor::SequenceToken;
use crate::error::RemoteError;
use crate::record::StreamIdentity;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const TARGET_PREFIX: &str = "Logs_20140328";
const CONTENT_TYPE_JSON_1_1: &str = "application/x-amz-json-1.1";
const DESCRIBE_STREAMS_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct HttpLogsApiConfig {
    /// Base URL, e.g. `https://logs.us-west-2.amazonaws.com`.
    pub endpoint: String,
    pub https_proxy: Option<String>,
    /// Transport level timeout. The engine applies its own submission timeout on top.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpLogsApi {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogsApi {
    #[must_use]
    pub fn new(config: &HttpLogsApiConfig) -> Self {
        Self {
            client: get_client(config),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }

    async fn call<B, R>(&self, operation: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Send,
    {
        let payload =
            serde_json::to_vec(body).map_err(|e| RemoteError::Service {
                code: "SerializationException".to_string(),
                message: e.to_string(),
            })?;

        let resp = self
            .client
            .post(format!("{}/", self.endpoint))
            .headers(headers(operation))
            .body(payload)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if status.is_success() {
            if bytes.is_empty() {
                return serde_json::from_slice(b"{}").map_err(|e| malformed(operation, &e));
            }
            return serde_json::from_slice(&bytes).map_err(|e| malformed(operation, &e));
        }

        let err = parse_error(status.as_u16(), &bytes);
        debug!("CWL | {operation} failed with {status}: {err}");
        Err(err)
    }
}

fn headers(operation: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON_1_1));
    if let Ok(target) = HeaderValue::from_str(&format!("{TARGET_PREFIX}.{operation}")) {
        headers.insert("X-Amz-Target", target);
    }
    headers
}

fn malformed(operation: &str, err: &serde_json::Error) -> RemoteError {
    RemoteError::Service {
        code: "MalformedResponse".to_string(),
        message: format!("{operation}: {err}"),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
    #[serde(rename = "expectedSequenceToken", default)]
    expected_sequence_token: Option<SequenceToken>,
}

fn parse_error(status: u16, bytes: &[u8]) -> RemoteError {
    let body: ErrorBody = serde_json::from_slice(bytes).unwrap_or_default();
    // names may come qualified, e.g. `com.amazonaws.logs#ThrottlingException`
    let code = body.error_type.rsplit('#').next().unwrap_or_default();

    match code {
        "ResourceAlreadyExistsException" => RemoteError::ResourceAlreadyExists(body.message),
        "ResourceNotFoundException" => RemoteError::ResourceNotFound(body.message),
        "InvalidSequenceTokenException" => RemoteError::InvalidSequenceToken {
            expected: body.expected_sequence_token,
        },
        "DataAlreadyAcceptedException" => RemoteError::DataAlreadyAccepted {
            expected: body.expected_sequence_token,
        },
        "ThrottlingException" => RemoteError::Throttled(body.message),
        "" if status >= 500 => RemoteError::Service {
            code: "ServiceUnavailable".to_string(),
            message: format!("HTTP {status}: {}", String::from_utf8_lossy(bytes)),
        },
        "" => RemoteError::Service {
            code: format!("Http{status}"),
            message: String::from_utf8_lossy(bytes).into_owned(),
        },
        other => RemoteError::Service {
            code: other.to_string(),
            message: body.message,
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name_prefix: &'a str,
    limit: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsResponse {
    #[serde(default)]
    log_streams: Vec<LogStreamDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogStreamDescription {
    log_stream_name: String,
    #[serde(default)]
    upload_sequence_token: Option<SequenceToken>,
}

#[derive(Deserialize)]
struct Empty {}

#[async_trait]
impl LogsApi for HttpLogsApi {
    async fn create_group(&self, group_name: &str) -> Result<(), RemoteError> {
        let _: Empty = self
            .call("CreateLogGroup", &CreateLogGroupRequest { log_group_name: group_name })
            .await?;
        Ok(())
    }

    async fn create_stream(&self, identity: &StreamIdentity) -> Result<(), RemoteError> {
        let _: Empty = self
            .call(
                "CreateLogStream",
                &CreateLogStreamRequest {
                    log_group_name: identity.group_name(),
                    log_stream_name: identity.stream_name(),
                },
            )
            .await?;
        Ok(())
    }

    async fn append_batch(&self, request: &AppendRequest) -> Result<AppendResponse, RemoteError> {
        self.call("PutLogEvents", request).await
    }

    async fn current_cursor(
        &self,
        identity: &StreamIdentity,
    ) -> Result<Option<SequenceToken>, RemoteError> {
        let resp: DescribeLogStreamsResponse = self
            .call(
                "DescribeLogStreams",
                &DescribeLogStreamsRequest {
                    log_group_name: identity.group_name(),
                    log_stream_name_prefix: identity.stream_name(),
                    limit: DESCRIBE_STREAMS_LIMIT,
                },
            )
            .await?;

        // the lookup is by prefix, so sibling streams may be listed too
        Ok(resp
            .log_streams
            .into_iter()
            .find(|s| s.log_stream_name == identity.stream_name())
            .and_then(|s| s.upload_sequence_token))
    }
}

/// Builds the HTTP client, falling back to a direct connection when the
/// proxy configuration is unusable.
#[must_use]
pub fn get_client(config: &HttpLogsApiConfig) -> reqwest::Client {
    match build_client(config, config.https_proxy.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            error!("CWL | Unable to parse proxy configuration: {e}, falling back to direct connection");
            match build_client(config, None) {
                Ok(client) => client,
                Err(inner) => {
                    error!("CWL | Failed to build HTTP client without proxy: {inner}, using reqwest defaults");
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &HttpLogsApiConfig,
    https_proxy: Option<&str>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Duration::from_secs(270))
        .tcp_keepalive(Duration::from_secs(120));
    if let Some(proxy) = https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}
