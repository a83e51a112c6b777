// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory log service that enforces sequence tokens the way the real one does

use async_trait::async_trait;
use cloudwatch_logs_stream::{
    AppendRequest, AppendResponse, InputLogEvent, LogsApi, RemoteError, SequenceToken,
    StreamIdentity,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct StreamState {
    token: Option<SequenceToken>,
    events: Vec<InputLogEvent>,
}

#[derive(Debug, Default)]
struct State {
    groups: HashSet<String>,
    streams: HashMap<StreamIdentity, StreamState>,
    next_token: u64,
    injected: VecDeque<RemoteError>,
    sent_tokens: Vec<Option<SequenceToken>>,
    append_calls: usize,
    lookups: usize,
}

impl State {
    fn mint_token(&mut self) -> SequenceToken {
        self.next_token += 1;
        SequenceToken::new(format!("T{}", self.next_token))
    }
}

/// Stateful fake: an append must carry the stream's current token (none for
/// a fresh stream) or it is rejected with `InvalidSequenceToken`.
#[derive(Debug, Default)]
pub struct FakeLogService {
    state: Mutex<State>,
}

#[allow(dead_code)]
impl FakeLogService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-creates a stream whose current token is `T1`.
    pub fn with_stream(identity: &StreamIdentity) -> Self {
        let fake = Self::new();
        {
            let mut state = fake.state.lock().unwrap();
            state.groups.insert(identity.group_name().to_string());
            let token = state.mint_token();
            state.streams.insert(
                identity.clone(),
                StreamState {
                    token: Some(token),
                    events: Vec::new(),
                },
            );
        }
        fake
    }

    /// Another writer appends to the stream, moving its token forward.
    pub fn advance_externally(&self, identity: &StreamIdentity) {
        let mut state = self.state.lock().unwrap();
        let token = state.mint_token();
        if let Some(stream) = state.streams.get_mut(identity) {
            stream.token = Some(token);
        }
    }

    /// The next appends fail with these errors, in order, before any token check.
    pub fn inject_append_errors(&self, errors: impl IntoIterator<Item = RemoteError>) {
        self.state.lock().unwrap().injected.extend(errors);
    }

    pub fn messages(&self, identity: &StreamIdentity) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(identity)
            .map(|s| s.events.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default()
    }

    pub fn current_token(&self, identity: &StreamIdentity) -> Option<SequenceToken> {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(identity)
            .and_then(|s| s.token.clone())
    }

    /// Token carried by every append call, in call order.
    pub fn sent_tokens(&self) -> Vec<Option<SequenceToken>> {
        self.state.lock().unwrap().sent_tokens.clone()
    }

    pub fn append_calls(&self) -> usize {
        self.state.lock().unwrap().append_calls
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }
}

#[async_trait]
impl LogsApi for FakeLogService {
    async fn create_group(&self, group_name: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        if !state.groups.insert(group_name.to_string()) {
            return Err(RemoteError::ResourceAlreadyExists(group_name.to_string()));
        }
        Ok(())
    }

    async fn create_stream(&self, identity: &StreamIdentity) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        if !state.groups.contains(identity.group_name()) {
            return Err(RemoteError::ResourceNotFound(
                identity.group_name().to_string(),
            ));
        }
        if state.streams.contains_key(identity) {
            return Err(RemoteError::ResourceAlreadyExists(
                identity.stream_name().to_string(),
            ));
        }
        state.streams.insert(identity.clone(), StreamState::default());
        Ok(())
    }

    async fn append_batch(&self, request: &AppendRequest) -> Result<AppendResponse, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.append_calls += 1;
        state.sent_tokens.push(request.sequence_token.clone());

        if let Some(err) = state.injected.pop_front() {
            return Err(err);
        }

        let identity = StreamIdentity::new(&request.log_group_name, &request.log_stream_name);
        let current = match state.streams.get(&identity) {
            Some(stream) => stream.token.clone(),
            None => return Err(RemoteError::ResourceNotFound(identity.to_string())),
        };
        if request.sequence_token != current {
            return Err(RemoteError::InvalidSequenceToken { expected: current });
        }

        let next = state.mint_token();
        if let Some(stream) = state.streams.get_mut(&identity) {
            stream.events.extend(request.log_events.iter().cloned());
            stream.token = Some(next.clone());
        }
        Ok(AppendResponse {
            next_sequence_token: Some(next),
        })
    }

    async fn current_cursor(
        &self,
        identity: &StreamIdentity,
    ) -> Result<Option<SequenceToken>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        match state.streams.get(identity) {
            Some(stream) => Ok(stream.token.clone()),
            None => Err(RemoteError::ResourceNotFound(identity.to_string())),
        }
    }
}
