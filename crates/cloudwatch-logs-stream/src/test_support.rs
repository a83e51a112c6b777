// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted remote service for unit tests.

use crate::api::{AppendRequest, AppendResponse, LogsApi};
use crate::cursor::SequenceToken;
use crate::error::RemoteError;
use crate::record::StreamIdentity;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Replays queued responses and records every call.
///
/// With an empty queue: creations succeed, appends succeed with tokens
/// `N1`, `N2`, ... and cursor lookups return `None`, unless a sticky append
/// response was set with [`ScriptedApi::always_append`].
#[derive(Default)]
pub(crate) struct ScriptedApi {
    group_results: Mutex<VecDeque<Result<(), RemoteError>>>,
    stream_results: Mutex<VecDeque<Result<(), RemoteError>>>,
    append_results: Mutex<VecDeque<Result<AppendResponse, RemoteError>>>,
    cursor_results: Mutex<VecDeque<Result<Option<SequenceToken>, RemoteError>>>,
    sticky_append: Mutex<Option<Result<AppendResponse, RemoteError>>>,
    append_delay: Mutex<Option<Duration>>,
    appends: Mutex<Vec<AppendRequest>>,
    cursor_lookups: Mutex<Vec<StreamIdentity>>,
    created_groups: Mutex<Vec<String>>,
    created_streams: Mutex<Vec<StreamIdentity>>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_group(&self, result: Result<(), RemoteError>) {
        self.group_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_stream(&self, result: Result<(), RemoteError>) {
        self.stream_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_append(&self, result: Result<AppendResponse, RemoteError>) {
        self.append_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_accepted(&self, next: &str) {
        self.push_append(Ok(AppendResponse {
            next_sequence_token: Some(next.into()),
        }));
    }

    pub(crate) fn push_cursor(&self, result: Result<Option<SequenceToken>, RemoteError>) {
        self.cursor_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn always_append(&self, result: Result<AppendResponse, RemoteError>) {
        *self.sticky_append.lock().unwrap() = Some(result);
    }

    pub(crate) fn delay_appends(&self, delay: Duration) {
        *self.append_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn appends(&self) -> Vec<AppendRequest> {
        self.appends.lock().unwrap().clone()
    }

    pub(crate) fn append_count(&self) -> usize {
        self.appends.lock().unwrap().len()
    }

    pub(crate) fn cursor_lookups(&self) -> Vec<StreamIdentity> {
        self.cursor_lookups.lock().unwrap().clone()
    }

    pub(crate) fn created_groups(&self) -> Vec<String> {
        self.created_groups.lock().unwrap().clone()
    }

    pub(crate) fn created_streams(&self) -> Vec<StreamIdentity> {
        self.created_streams.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogsApi for ScriptedApi {
    async fn create_group(&self, group_name: &str) -> Result<(), RemoteError> {
        self.created_groups
            .lock()
            .unwrap()
            .push(group_name.to_string());
        self.group_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn create_stream(&self, identity: &StreamIdentity) -> Result<(), RemoteError> {
        self.created_streams.lock().unwrap().push(identity.clone());
        self.stream_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn append_batch(&self, request: &AppendRequest) -> Result<AppendResponse, RemoteError> {
        let count = {
            let mut appends = self.appends.lock().unwrap();
            appends.push(request.clone());
            appends.len()
        };

        let delay = *self.append_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(result) = self.append_results.lock().unwrap().pop_front() {
            return result;
        }
        if let Some(result) = self.sticky_append.lock().unwrap().clone() {
            return result;
        }
        Ok(AppendResponse {
            next_sequence_token: Some(SequenceToken::new(format!("N{count}"))),
        })
    }

    async fn current_cursor(
        &self,
        identity: &StreamIdentity,
    ) -> Result<Option<SequenceToken>, RemoteError> {
        self.cursor_lookups.lock().unwrap().push(identity.clone());
        self.cursor_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }
}
