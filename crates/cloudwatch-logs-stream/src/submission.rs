// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sends one batch to the remote append API and classifies the result.

use crate::api::{AppendRequest, AppendResponse, LogsApi};
use crate::cursor::SequenceToken;
use crate::error::{DeliveryErrorKind, RemoteError};
use crate::record::{Batch, StreamIdentity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Classified result of a single append attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Stored; the cursor moves to the returned token.
    Accepted(Option<SequenceToken>),
    /// The remote already holds this content. Success, cursor unchanged.
    AlreadyAccepted,
    /// The token sent no longer matches the stream.
    StaleCursor { expected: Option<SequenceToken> },
    Transient(DeliveryErrorKind),
    Fatal(DeliveryErrorKind),
}

/// Maps a remote append result onto a [`SubmissionOutcome`].
#[must_use]
pub fn classify(result: Result<AppendResponse, RemoteError>) -> SubmissionOutcome {
    match result {
        Ok(resp) => SubmissionOutcome::Accepted(resp.next_sequence_token),
        Err(RemoteError::DataAlreadyAccepted { .. }) => SubmissionOutcome::AlreadyAccepted,
        Err(RemoteError::InvalidSequenceToken { expected }) => {
            SubmissionOutcome::StaleCursor { expected }
        }
        Err(e) if e.is_retryable() => SubmissionOutcome::Transient(e.into()),
        Err(e) => SubmissionOutcome::Fatal(e.into()),
    }
}

/// Append path for one stream.
#[derive(Clone)]
pub struct Submitter {
    api: Arc<dyn LogsApi>,
    identity: StreamIdentity,
    timeout: Duration,
}

impl Submitter {
    pub fn new(api: Arc<dyn LogsApi>, identity: StreamIdentity, timeout: Duration) -> Self {
        Self {
            api,
            identity,
            timeout,
        }
    }

    #[must_use]
    pub fn api(&self) -> &dyn LogsApi {
        self.api.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Appends `batch` using `cursor`. A call that outlives the submission
    /// timeout is abandoned and reported as a transport failure.
    pub async fn submit(
        &self,
        batch: &Batch,
        cursor: Option<&SequenceToken>,
    ) -> SubmissionOutcome {
        let request = AppendRequest::new(&self.identity, batch, cursor);
        debug!(
            "CWL | Posting batch {} with {} records (token present: {})",
            batch.id(),
            batch.len(),
            cursor.is_some()
        );

        match tokio::time::timeout(self.timeout, self.api.append_batch(&request)).await {
            Ok(result) => classify(result),
            Err(_) => {
                warn!(
                    "CWL | Append of batch {} timed out after {} ms",
                    batch.id(),
                    self.timeout.as_millis()
                );
                SubmissionOutcome::Transient(DeliveryErrorKind::Transport(format!(
                    "append timed out after {} ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}
