// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded retries around the submission pipeline.
//!
//! A batch moves `Pending -> Attempting -> Succeeded | Attempting | Failed`.
//! Every attempt spends one unit of the budget whatever the failure was. A
//! stale-token rejection resyncs the cursor at once; if that lookup fails the
//! cursor stays invalid and every later attempt resyncs before appending.

use crate::cursor::{resync, SequenceCursor};
use crate::error::{DeliveryError, DeliveryErrorKind};
use crate::record::{Batch, Delivered, DeliveryResult};
use crate::submission::{SubmissionOutcome, Submitter};
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct RetryController {
    submitter: Submitter,
    cursor: SequenceCursor,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryController {
    pub fn new(
        submitter: Submitter,
        cursor: SequenceCursor,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            submitter,
            cursor,
            max_retries,
            retry_delay,
        }
    }

    #[must_use]
    pub fn cursor(&self) -> &SequenceCursor {
        &self.cursor
    }

    /// Drives `batch` to a terminal outcome. Attempts are sequential and the
    /// batch is tried at most `max_retries + 1` times.
    pub async fn deliver(&mut self, batch: &Batch) -> DeliveryResult {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let failure = match self.attempt(batch, attempt).await {
                Ok(delivered) => return Ok(delivered),
                Err(kind) => kind,
            };

            if attempt > self.max_retries {
                error!(
                    "CWL | Dropping batch {} of {} records after {attempt} attempt(s): {failure}",
                    batch.id(),
                    batch.len()
                );
                return Err(DeliveryError {
                    kind: failure,
                    attempts: attempt,
                });
            }

            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }

    /// One attempt: resync first if the held token is known to be stale,
    /// then append. A stale-token rejection that resyncs fine still fails
    /// the attempt with the rejection.
    async fn attempt(&mut self, batch: &Batch, attempt: u32) -> Result<Delivered, DeliveryErrorKind> {
        if !self.cursor.is_valid() {
            self.refresh_cursor().await?;
        }

        match self.submitter.submit(batch, self.cursor.token()).await {
            SubmissionOutcome::Accepted(next) => {
                self.cursor.advance(next);
                debug!(
                    "CWL | Batch {} accepted after {attempt} attempt(s)",
                    batch.id()
                );
                Ok(Delivered { attempts: attempt })
            }
            SubmissionOutcome::AlreadyAccepted => {
                debug!(
                    "CWL | Batch {} was already accepted, keeping current cursor",
                    batch.id()
                );
                Ok(Delivered { attempts: attempt })
            }
            SubmissionOutcome::StaleCursor { expected } => {
                self.cursor.invalidate();
                self.refresh_cursor().await?;
                Err(DeliveryErrorKind::RemoteRejected {
                    code: "InvalidSequenceTokenException".to_string(),
                    message: format!(
                        "sequence token rejected (expected {:?})",
                        expected.as_ref().map(|t| t.as_str())
                    ),
                })
            }
            SubmissionOutcome::Transient(kind) => {
                warn!("CWL | Batch {} attempt {attempt} failed: {kind}", batch.id());
                Err(kind)
            }
            SubmissionOutcome::Fatal(kind) => {
                error!("CWL | Batch {} attempt {attempt} rejected: {kind}", batch.id());
                Err(kind)
            }
        }
    }

    /// Replaces an invalid cursor with the stream's current token. A token is
    /// expected to exist here, so an absent one is an error too; on failure
    /// the cursor stays invalid.
    async fn refresh_cursor(&mut self) -> Result<(), DeliveryErrorKind> {
        match resync(self.submitter.api(), self.submitter.identity()).await {
            Ok(token) => {
                debug!("CWL | Sequence token refreshed");
                self.cursor.replace(token);
                Ok(())
            }
            Err(e) => {
                warn!("CWL | Resetting sequence token failed: {e}");
                Err(e.into())
            }
        }
    }
}
