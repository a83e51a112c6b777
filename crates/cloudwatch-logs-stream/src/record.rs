// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Records, batches and the handles producers wait on.

use crate::error::{DeliveryError, DeliveryErrorKind};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

/// Per-event overhead the remote service adds to the payload length when
/// accounting for the batch size limit.
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Destination of a session: a group and a stream inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentity {
    group_name: String,
    stream_name: String,
}

impl StreamIdentity {
    pub fn new(group_name: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            stream_name: stream_name.into(),
        }
    }

    #[must_use]
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_name, self.stream_name)
    }
}

/// One text record, stamped when it was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    payload: String,
    enqueued_at: i64,
}

impl LogRecord {
    pub fn new(payload: impl Into<String>) -> Self {
        let enqueued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self::with_timestamp(payload, enqueued_at)
    }

    /// Builds a record with an explicit timestamp in milliseconds since the epoch.
    pub fn with_timestamp(payload: impl Into<String>, enqueued_at: i64) -> Self {
        Self {
            payload: payload.into(),
            enqueued_at,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    #[must_use]
    pub fn enqueued_at(&self) -> i64 {
        self.enqueued_at
    }

    /// Bytes this record counts for against the batch size limit.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        self.payload.len() + EVENT_OVERHEAD_BYTES
    }
}

/// Successful terminal outcome of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    /// Number of append attempts the containing batch needed.
    pub attempts: u32,
}

pub type DeliveryResult = Result<Delivered, DeliveryError>;

/// A record together with the channel its producer waits on.
#[derive(Debug)]
pub(crate) struct PendingRecord {
    pub(crate) record: LogRecord,
    pub(crate) result_tx: oneshot::Sender<DeliveryResult>,
}

impl PendingRecord {
    pub(crate) fn new(record: LogRecord) -> (Self, PendingDelivery) {
        let (result_tx, result_rx) = oneshot::channel();
        (Self { record, result_tx }, PendingDelivery { rx: result_rx })
    }
}

/// Resolves once the batch holding the record reaches a terminal outcome.
#[derive(Debug)]
#[must_use = "dropping the handle discards the delivery outcome"]
pub struct PendingDelivery {
    rx: oneshot::Receiver<DeliveryResult>,
}

impl Future for PendingDelivery {
    type Output = DeliveryResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DeliveryError {
                kind: DeliveryErrorKind::Abandoned,
                attempts: 0,
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Ordered group of records submitted in one append call.
#[derive(Debug, Default)]
pub struct Batch {
    id: u64,
    records: Vec<LogRecord>,
    waiters: Vec<oneshot::Sender<DeliveryResult>>,
    size_bytes: usize,
}

impl Batch {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// A batch nobody waits on.
    #[must_use]
    pub fn from_records(id: u64, records: Vec<LogRecord>) -> Self {
        let size_bytes = records.iter().map(LogRecord::encoded_size).sum();
        Self {
            id,
            records,
            waiters: Vec::new(),
            size_bytes,
        }
    }

    pub(crate) fn push(&mut self, pending: PendingRecord) {
        self.size_bytes += pending.record.encoded_size();
        self.records.push(pending.record);
        self.waiters.push(pending.result_tx);
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Hands the same outcome to every producer waiting on this batch.
    pub fn resolve(self, result: &DeliveryResult) {
        for waiter in self.waiters {
            // the producer may have dropped its handle
            let _ = waiter.send(result.clone());
        }
    }
}
