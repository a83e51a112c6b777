// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Actor-based batch dispatcher.
//!
//! Producers talk to the dispatcher through a cloneable [`DispatcherHandle`].
//! Two tasks sit behind it:
//!
//! ```text
//!    ┌──────────────┐
//!    │   Handles    │ (many producers, never block)
//!    └──────┬───────┘
//!           │ DispatcherCommand
//!           v
//!    ┌──────────────┐
//!    │  Dispatcher  │ owns the open batch, closes it on
//!    │              │ size, byte budget, linger or flush
//!    └──────┬───────┘
//!           │ SubmissionJob (FIFO)
//!           v
//!    ┌──────────────┐
//!    │    Worker    │ one batch in flight at a time,
//!    │              │ owns the sequence cursor
//!    └──────────────┘
//! ```
//!
//! Closed batches queue up in submission order while the worker is busy, so
//! at most one append is outstanding and batches are accepted in the order
//! they were closed.

use crate::config::StreamConfig;
use crate::error::LogError;
use crate::record::{Batch, LogRecord, PendingDelivery, PendingRecord};
use crate::retry::RetryController;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, Instrument, Span};

/// Commands sent from handles to the dispatcher task.
#[derive(Debug)]
pub(crate) enum DispatcherCommand {
    /// Append a record to the open batch.
    Enqueue(PendingRecord),
    /// Close the open batch now and answer once everything queued before
    /// this command has reached a terminal outcome.
    Flush(oneshot::Sender<()>),
    /// Like `Flush`, then stop accepting records.
    Shutdown(oneshot::Sender<()>),
}

/// Work handed from the dispatcher to the submission worker.
#[derive(Debug)]
enum SubmissionJob {
    Deliver(Batch),
    Barrier(oneshot::Sender<()>),
}

/// Why the open batch was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Size,
    Bytes,
    Linger,
    Flush,
    Shutdown,
}

/// Cloneable entry point for producers.
#[derive(Clone, Debug)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<DispatcherCommand>,
    max_batch_bytes: usize,
}

impl DispatcherHandle {
    /// Queues a record without waiting for the batch to be sent.
    ///
    /// # Errors
    ///
    /// - [`LogError::RecordTooLarge`] if the record alone exceeds the batch byte budget
    /// - [`LogError::Closed`] once the dispatcher has stopped
    pub fn enqueue(&self, record: LogRecord) -> Result<PendingDelivery, LogError> {
        let size = record.encoded_size();
        if size > self.max_batch_bytes {
            return Err(LogError::RecordTooLarge {
                size,
                limit: self.max_batch_bytes,
            });
        }

        let (pending, delivery) = PendingRecord::new(record);
        self.tx
            .send(DispatcherCommand::Enqueue(pending))
            .map_err(|_| LogError::Closed)?;
        Ok(delivery)
    }

    /// Closes the open batch and waits until every batch queued so far is resolved.
    pub async fn flush(&self) -> Result<(), LogError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(DispatcherCommand::Flush(done_tx))
            .map_err(|_| LogError::Closed)?;
        done_rx.await.map_err(|_| LogError::Closed)
    }

    /// Drains buffered records and stops the dispatcher.
    pub async fn shutdown(&self) -> Result<(), LogError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(DispatcherCommand::Shutdown(done_tx))
            .map_err(|_| LogError::Closed)?;
        done_rx.await.map_err(|_| LogError::Closed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Accumulates records into batches.
pub struct BatchDispatcher {
    rx: mpsc::UnboundedReceiver<DispatcherCommand>,
    jobs: mpsc::UnboundedSender<SubmissionJob>,
    open: Batch,
    /// When the first record of the open batch arrived.
    opened_at: Option<Instant>,
    next_batch_id: u64,
    batch_size: usize,
    batch_delay: Duration,
    max_batch_bytes: usize,
    span: Span,
}

/// Delivers closed batches one at a time.
pub struct SubmissionWorker {
    rx: mpsc::UnboundedReceiver<SubmissionJob>,
    controller: RetryController,
    span: Span,
}

/// Wires a dispatcher and a worker together.
///
/// Returns `(dispatcher, worker, handle)`. Both tasks must be spawned; the
/// handle is what producers keep. Both tasks log inside `span`.
#[must_use]
pub fn create_dispatcher(
    config: &StreamConfig,
    controller: RetryController,
    span: Span,
) -> (BatchDispatcher, SubmissionWorker, DispatcherHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();

    let dispatcher = BatchDispatcher {
        rx,
        jobs: jobs_tx,
        open: Batch::new(1),
        opened_at: None,
        next_batch_id: 2,
        batch_size: config.batch_size,
        batch_delay: config.batch_delay,
        max_batch_bytes: config.max_batch_bytes,
        span: span.clone(),
    };
    let worker = SubmissionWorker {
        rx: jobs_rx,
        controller,
        span,
    };
    let handle = DispatcherHandle {
        tx,
        max_batch_bytes: config.max_batch_bytes,
    };

    (dispatcher, worker, handle)
}

impl BatchDispatcher {
    /// Processes commands until shutdown or until every handle is dropped.
    /// Whatever is buffered at that point is closed and handed to the worker.
    pub async fn run(self) {
        let span = self.span.clone();
        self.run_inner().instrument(span).await;
    }

    async fn run_inner(mut self) {
        debug!("CWL | Batch dispatcher started");

        loop {
            let deadline = self.opened_at.map(|opened| opened + self.batch_delay);

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(DispatcherCommand::Enqueue(pending)) => self.accept(pending),
                    Some(DispatcherCommand::Flush(done)) => {
                        self.close(CloseReason::Flush);
                        self.barrier(done);
                    }
                    Some(DispatcherCommand::Shutdown(done)) => {
                        self.close(CloseReason::Shutdown);
                        self.barrier(done);
                        break;
                    }
                    None => {
                        self.close(CloseReason::Shutdown);
                        break;
                    }
                },
                () = linger(deadline) => self.close(CloseReason::Linger),
            }
        }

        // stop accepting before the queued jobs drain
        self.rx.close();
        debug!("CWL | Batch dispatcher stopped");
    }

    fn accept(&mut self, pending: PendingRecord) {
        let size = pending.record.encoded_size();
        if !self.open.is_empty() && self.open.size_bytes() + size > self.max_batch_bytes {
            self.close(CloseReason::Bytes);
        }

        if self.open.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.open.push(pending);

        if self.open.len() >= self.batch_size {
            self.close(CloseReason::Size);
        }
    }

    fn close(&mut self, reason: CloseReason) {
        if self.open.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.open, Batch::new(self.next_batch_id));
        self.next_batch_id += 1;
        self.opened_at = None;

        debug!(
            "CWL | Closing batch {} ({:?}): {} records, {} bytes",
            batch.id(),
            reason,
            batch.len(),
            batch.size_bytes()
        );

        if let Err(mpsc::error::SendError(job)) = self.jobs.send(SubmissionJob::Deliver(batch)) {
            // dropping the batch resolves its records as abandoned
            error!("CWL | Submission worker is gone, abandoning batch");
            drop(job);
        }
    }

    fn barrier(&self, done: oneshot::Sender<()>) {
        if let Err(mpsc::error::SendError(SubmissionJob::Barrier(done))) =
            self.jobs.send(SubmissionJob::Barrier(done))
        {
            let _ = done.send(());
        }
    }
}

async fn linger(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl SubmissionWorker {
    /// Delivers batches in the order they were closed. Ends once the
    /// dispatcher has stopped and the queue is empty.
    pub async fn run(self) {
        let span = self.span.clone();
        self.run_inner().instrument(span).await;
    }

    async fn run_inner(mut self) {
        while let Some(job) = self.rx.recv().await {
            match job {
                SubmissionJob::Deliver(batch) => {
                    let result = self.controller.deliver(&batch).await;
                    batch.resolve(&result);
                }
                SubmissionJob::Barrier(done) => {
                    if done.send(()).is_err() {
                        debug!("CWL | Flush caller went away before completion");
                    }
                }
            }
        }
        debug!("CWL | Submission worker stopped");
    }
}
