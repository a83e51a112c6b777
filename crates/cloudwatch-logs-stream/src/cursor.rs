// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The append cursor of a stream and the procedure that refreshes it.

use crate::api::LogsApi;
use crate::error::ResyncError;
use crate::record::StreamIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Opaque upload token handed out by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceToken(String);

impl SequenceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SequenceToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// The single mutable append position of a stream.
///
/// Owned by the submission worker; only one batch is ever in flight so no
/// locking is needed around it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceCursor {
    token: Option<SequenceToken>,
    valid: bool,
}

impl SequenceCursor {
    /// A cursor for a stream that never received an append.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            token: None,
            valid: true,
        }
    }

    #[must_use]
    pub fn with_token(token: SequenceToken) -> Self {
        Self {
            token: Some(token),
            valid: true,
        }
    }

    /// Token to send with the next append, `None` for a first append.
    #[must_use]
    pub fn token(&self) -> Option<&SequenceToken> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Moves the cursor after an accepted append.
    pub fn advance(&mut self, next: Option<SequenceToken>) {
        self.token = next;
        self.valid = true;
    }

    /// Marks the held token as rejected by the remote service.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Replaces the cursor wholesale with a freshly looked-up token.
    pub fn replace(&mut self, token: SequenceToken) {
        self.token = Some(token);
        self.valid = true;
    }
}

/// Looks up the authoritative upload token of `identity`.
///
/// Returns [`ResyncError::CursorUnavailable`] when the stream exists but holds
/// no token. Whether that is acceptable is decided by the caller.
pub async fn resync(
    api: &dyn LogsApi,
    identity: &StreamIdentity,
) -> Result<SequenceToken, ResyncError> {
    match api.current_cursor(identity).await {
        Ok(Some(token)) => {
            debug!("CWL | Resynced sequence token for {identity}");
            Ok(token)
        }
        Ok(None) => {
            debug!("CWL | No sequence token available for {identity}");
            Err(ResyncError::CursorUnavailable)
        }
        Err(e) => Err(ResyncError::Lookup(e)),
    }
}
