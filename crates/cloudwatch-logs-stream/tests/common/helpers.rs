// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use super::fake_service::FakeLogService;
use cloudwatch_logs_stream::{LogsApi, StreamConfig, StreamIdentity, StreamSession};
use std::sync::Arc;
use std::time::Duration;

pub fn identity() -> StreamIdentity {
    StreamIdentity::new("integration-group", "integration-stream")
}

/// Config with immediate retries and the given batch size
pub fn test_config(batch_size: usize) -> StreamConfig {
    StreamConfig {
        batch_size,
        batch_delay: Duration::from_millis(200),
        retry_delay: Duration::ZERO,
        ..Default::default()
    }
}

/// Create a session on `fake` and set it up against [`identity`]
pub async fn ready_session(fake: &Arc<FakeLogService>, config: StreamConfig) -> StreamSession {
    let session = StreamSession::new(Arc::clone(fake) as Arc<dyn LogsApi>, config);
    session
        .setup(identity())
        .await
        .expect("Failed to set up session");
    session
}
