// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The remote append-only log service, seen as an opaque RPC.

use crate::cursor::SequenceToken;
use crate::error::RemoteError;
use crate::record::{Batch, StreamIdentity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputLogEvent {
    pub timestamp: i64,
    pub message: String,
}

/// Payload of one append call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
    pub log_events: Vec<InputLogEvent>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sequence_token: Option<SequenceToken>,
}

impl AppendRequest {
    /// Builds the request for `batch`, keeping record order. The token is
    /// left out when none is known yet.
    #[must_use]
    pub fn new(identity: &StreamIdentity, batch: &Batch, cursor: Option<&SequenceToken>) -> Self {
        Self {
            log_group_name: identity.group_name().to_string(),
            log_stream_name: identity.stream_name().to_string(),
            log_events: batch
                .records()
                .iter()
                .map(|record| InputLogEvent {
                    timestamp: record.enqueued_at(),
                    message: record.payload().to_string(),
                })
                .collect(),
            sequence_token: cursor.cloned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    #[serde(default)]
    pub next_sequence_token: Option<SequenceToken>,
}

/// Operations the engine needs from the remote service.
///
/// Implementations report failures through the named [`RemoteError`]
/// categories; classification into retry decisions happens in the engine.
#[async_trait]
pub trait LogsApi: Send + Sync {
    /// Creates a group. Fails with `ResourceAlreadyExists` if it is there.
    async fn create_group(&self, group_name: &str) -> Result<(), RemoteError>;

    /// Creates a stream. Fails with `ResourceAlreadyExists` if it is there.
    async fn create_stream(&self, identity: &StreamIdentity) -> Result<(), RemoteError>;

    async fn append_batch(&self, request: &AppendRequest) -> Result<AppendResponse, RemoteError>;

    /// Current upload token of the stream, `None` when it never received data.
    async fn current_cursor(
        &self,
        identity: &StreamIdentity,
    ) -> Result<Option<SequenceToken>, RemoteError>;
}
