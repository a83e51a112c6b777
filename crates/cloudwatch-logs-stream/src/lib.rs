// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # CloudWatch Logs Stream
//!
//! Ordered, batched delivery of text records to a CloudWatch-Logs-style
//! append-only stream whose appends are gated by a sequence token.
//!
//! ## Architecture
//!
//! - [`session`]: producer facade; setup of group, stream and initial token
//! - [`dispatcher`]: batch accumulation actor and the submission worker
//! - [`retry`]: bounded retries and stale-token recovery
//! - [`submission`]: one append call and the classification of its result
//! - [`cursor`]: the sequence token and its resync procedure
//! - [`http`]: JSON 1.1 transport for the remote service
//!
//! Records are accepted without waiting on the network. Batches close on
//! count, byte budget or age and are appended one at a time in the order
//! they closed; every record of a batch gets the batch's outcome.

#![deny(clippy::all)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

pub mod api;
pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod lines;
pub mod record;
pub mod retry;
pub mod session;
pub mod submission;

#[cfg(test)]
mod test_support;

pub use api::{AppendRequest, AppendResponse, InputLogEvent, LogsApi};
pub use config::StreamConfig;
pub use cursor::{SequenceCursor, SequenceToken};
pub use error::{
    ConfigError, DeliveryError, DeliveryErrorKind, ForwardError, LogError, RemoteError,
    ResyncError, SetupError,
};
pub use http::{HttpLogsApi, HttpLogsApiConfig};
pub use lines::forward_lines;
pub use record::{Delivered, DeliveryResult, LogRecord, PendingDelivery, StreamIdentity};
pub use session::StreamSession;
