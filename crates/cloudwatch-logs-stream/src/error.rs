// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the stream engine.
//!
//! Remote failures arrive as [`RemoteError`] and are converted by the submission
//! pipeline into a [`DeliveryErrorKind`] before anything reaches a producer.

use crate::cursor::SequenceToken;

/// Named error categories reported by the remote log service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("invalid sequence token (expected {expected:?})")]
    InvalidSequenceToken { expected: Option<SequenceToken> },

    #[error("data already accepted (next token {expected:?})")]
    DataAlreadyAccepted { expected: Option<SequenceToken> },

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },
}

impl RemoteError {
    /// Whether the failure is expected to clear up on its own.
    ///
    /// Only used for reporting: the retry controller spends its budget on
    /// fatal errors as well.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) | RemoteError::Throttled(_) => true,
            RemoteError::Service { code, .. } => {
                matches!(
                    code.as_str(),
                    "ServiceUnavailableException" | "InternalFailure" | "ServiceUnavailable"
                )
            }
            _ => false,
        }
    }

    /// Short error code, matching the remote service's naming.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            RemoteError::ResourceAlreadyExists(_) => "ResourceAlreadyExistsException",
            RemoteError::ResourceNotFound(_) => "ResourceNotFoundException",
            RemoteError::InvalidSequenceToken { .. } => "InvalidSequenceTokenException",
            RemoteError::DataAlreadyAccepted { .. } => "DataAlreadyAcceptedException",
            RemoteError::Throttled(_) => "ThrottlingException",
            RemoteError::Transport(_) => "TransportError",
            RemoteError::Service { code, .. } => code,
        }
    }
}

/// Failure of the cursor lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResyncError {
    /// The lookup succeeded but the stream carries no upload token.
    #[error("sequence token not available")]
    CursorUnavailable,

    #[error("sequence token lookup failed: {0}")]
    Lookup(RemoteError),
}

/// The session could not be made ready. The session stays unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error("failed to create log group {group}: {source}")]
    CreateGroup { group: String, source: RemoteError },

    #[error("failed to create log stream {stream}: {source}")]
    CreateStream { stream: String, source: RemoteError },

    #[error("failed to look up initial sequence token: {0}")]
    CursorLookup(RemoteError),

    #[error("session is already set up")]
    AlreadySetUp,
}

/// Classified reason a batch did not reach the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryErrorKind {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by remote service ({code}): {message}")]
    RemoteRejected { code: String, message: String },

    #[error("sequence token resync failed: {0}")]
    ResyncUnavailable(String),

    #[error("session stopped before the batch completed")]
    Abandoned,
}

impl From<RemoteError> for DeliveryErrorKind {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(msg) => DeliveryErrorKind::Transport(msg),
            other => DeliveryErrorKind::RemoteRejected {
                code: other.code().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ResyncError> for DeliveryErrorKind {
    fn from(err: ResyncError) -> Self {
        DeliveryErrorKind::ResyncUnavailable(err.to_string())
    }
}

/// Terminal failure reported to every record of a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("delivery failed after {attempts} attempt(s): {kind}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub attempts: u32,
}

/// A record was refused before being buffered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("session is not set up")]
    NotReady,

    #[error("session is closed")]
    Closed,

    #[error("record of {size} bytes exceeds the batch limit of {limit} bytes")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("failed to serialize record: {0}")]
    Serialize(String),
}

/// Line forwarding stopped early.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Log(#[from] LogError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);
