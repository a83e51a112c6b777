// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Producer-facing session bound to one log stream.
//!
//! A session is created idle, made ready once by [`StreamSession::setup`],
//! and accepts records from any number of tasks afterwards:
//!
//! ```rust,ignore
//! let session = StreamSession::new(api, StreamConfig::default());
//! session.setup(StreamIdentity::new("app", "host-1")).await?;
//!
//! let delivery = session.log("service started")?;
//! delivery.await?;
//!
//! session.shutdown().await?;
//! ```

use crate::api::LogsApi;
use crate::config::StreamConfig;
use crate::cursor::{resync, SequenceCursor};
use crate::dispatcher::{create_dispatcher, DispatcherHandle};
use crate::error::{LogError, RemoteError, ResyncError, SetupError};
use crate::record::{DeliveryResult, LogRecord, PendingDelivery, StreamIdentity};
use crate::retry::RetryController;
use crate::submission::Submitter;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

struct Ready {
    identity: StreamIdentity,
    handle: DispatcherHandle,
}

/// Client handle for one log stream.
pub struct StreamSession {
    api: Arc<dyn LogsApi>,
    config: StreamConfig,
    ready: OnceLock<Ready>,
    setup_lock: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamSession {
    #[must_use]
    pub fn new(api: Arc<dyn LogsApi>, config: StreamConfig) -> Self {
        Self {
            api,
            config,
            ready: OnceLock::new(),
            setup_lock: Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Ensures the group and stream exist, loads the current upload token and
    /// starts the background tasks.
    ///
    /// A group or stream that already exists is fine. A stream without a
    /// token starts from an empty cursor. On failure the session stays idle
    /// and `setup` may be called again.
    pub async fn setup(&self, identity: StreamIdentity) -> Result<(), SetupError> {
        let _guard = self.setup_lock.lock().await;
        if self.ready.get().is_some() {
            return Err(SetupError::AlreadySetUp);
        }

        let span = info_span!(
            "cloudwatch_stream",
            group = %identity.group_name(),
            stream = %identity.stream_name()
        );

        let cursor = self.prepare_stream(&identity).instrument(span.clone()).await?;

        let submitter = Submitter::new(
            Arc::clone(&self.api),
            identity.clone(),
            self.config.submission_timeout,
        );
        let controller = RetryController::new(
            submitter,
            cursor,
            self.config.max_retries,
            self.config.retry_delay,
        );
        let (dispatcher, worker, handle) = create_dispatcher(&self.config, controller, span);

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(dispatcher.run()));
        tasks.push(tokio::spawn(worker.run()));
        drop(tasks);

        info!("CWL | Session ready for {identity}");
        // cannot be set twice while the setup lock is held
        let _ = self.ready.set(Ready { identity, handle });
        Ok(())
    }

    async fn prepare_stream(&self, identity: &StreamIdentity) -> Result<SequenceCursor, SetupError> {
        match self.api.create_group(identity.group_name()).await {
            Ok(()) => debug!("CWL | Created log group"),
            Err(RemoteError::ResourceAlreadyExists(_)) => debug!("CWL | Log group already exists"),
            Err(source) => {
                error!("CWL | Failed to create log group: {source}");
                return Err(SetupError::CreateGroup {
                    group: identity.group_name().to_string(),
                    source,
                });
            }
        }

        match self.api.create_stream(identity).await {
            Ok(()) => debug!("CWL | Created log stream"),
            Err(RemoteError::ResourceAlreadyExists(_)) => debug!("CWL | Log stream already exists"),
            Err(source) => {
                error!("CWL | Failed to create log stream: {source}");
                return Err(SetupError::CreateStream {
                    stream: identity.stream_name().to_string(),
                    source,
                });
            }
        }

        match resync(self.api.as_ref(), identity).await {
            Ok(token) => Ok(SequenceCursor::with_token(token)),
            Err(ResyncError::CursorUnavailable) => {
                debug!("CWL | Stream has no sequence token yet");
                Ok(SequenceCursor::empty())
            }
            Err(ResyncError::Lookup(source)) => {
                error!("CWL | Failed to look up sequence token: {source}");
                Err(SetupError::CursorLookup(source))
            }
        }
    }

    fn handle(&self) -> Result<&DispatcherHandle, LogError> {
        self.ready
            .get()
            .map(|ready| &ready.handle)
            .ok_or(LogError::NotReady)
    }

    /// Destination of the session once it is set up.
    #[must_use]
    pub fn identity(&self) -> Option<&StreamIdentity> {
        self.ready.get().map(|ready| &ready.identity)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handle().is_ok_and(|handle| !handle.is_closed())
    }

    /// Buffers one record and returns a future for its delivery outcome.
    ///
    /// Never waits for the network. Records logged before `setup` completes
    /// are refused with [`LogError::NotReady`].
    pub fn log(&self, payload: impl Into<String>) -> Result<PendingDelivery, LogError> {
        self.handle()?.enqueue(LogRecord::new(payload))
    }

    /// Like [`StreamSession::log`], with the outcome handed to `callback`
    /// exactly once from a background task.
    pub fn log_with<F>(&self, payload: impl Into<String>, callback: F) -> Result<(), LogError>
    where
        F: FnOnce(DeliveryResult) + Send + 'static,
    {
        let delivery = self.log(payload)?;
        tokio::spawn(async move { callback(delivery.await) });
        Ok(())
    }

    /// Serializes `value` to a JSON record.
    pub fn log_json<T>(&self, value: &T) -> Result<PendingDelivery, LogError>
    where
        T: Serialize + ?Sized,
    {
        let payload =
            serde_json::to_string(value).map_err(|e| LogError::Serialize(e.to_string()))?;
        self.log(payload)
    }

    /// Sends everything buffered so far and waits until it is resolved.
    pub async fn flush(&self) -> Result<(), LogError> {
        self.handle()?.flush().await
    }

    /// Drains buffered records, waits for their outcome and stops the
    /// background tasks. Later calls to `log` fail with [`LogError::Closed`].
    pub async fn shutdown(&self) -> Result<(), LogError> {
        let result = self.handle()?.shutdown().await;

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!("CWL | Background task failed: {e}");
            }
        }

        debug!("CWL | Session shut down");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryErrorKind;
    use crate::record::Delivered;
    use crate::test_support::ScriptedApi;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn session(api: &Arc<ScriptedApi>, batch_size: usize) -> StreamSession {
        StreamSession::new(
            Arc::clone(api) as Arc<dyn LogsApi>,
            StreamConfig {
                batch_size,
                retry_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    fn identity() -> StreamIdentity {
        StreamIdentity::new("app", "host-1")
    }

    #[tokio::test]
    async fn test_log_before_setup_is_refused() {
        let api = Arc::new(ScriptedApi::new());
        let session = session(&api, 1);

        assert!(matches!(session.log("early"), Err(LogError::NotReady)));
        assert!(matches!(session.flush().await, Err(LogError::NotReady)));
        assert!(!session.is_ready());
        assert_eq!(api.append_count(), 0);
    }

    #[tokio::test]
    async fn test_setup_creates_resources_and_loads_token() {
        let api = Arc::new(ScriptedApi::new());
        api.push_cursor(Ok(Some("T1".into())));
        let session = session(&api, 1);

        session.setup(identity()).await.unwrap();
        assert!(session.is_ready());
        assert_eq!(session.identity(), Some(&identity()));
        assert_eq!(api.created_groups(), vec!["app".to_string()]);
        assert_eq!(api.created_streams(), vec![identity()]);

        session.log("hello").unwrap().await.unwrap();
        assert_eq!(api.appends()[0].sequence_token, Some("T1".into()));
    }

    #[tokio::test]
    async fn test_setup_tolerates_existing_resources() {
        let api = Arc::new(ScriptedApi::new());
        api.push_group(Err(RemoteError::ResourceAlreadyExists("app".into())));
        api.push_stream(Err(RemoteError::ResourceAlreadyExists("host-1".into())));
        let session = session(&api, 1);

        session.setup(identity()).await.unwrap();

        // no token on the stream: first append goes without one
        session.log("first").unwrap().await.unwrap();
        assert_eq!(api.appends()[0].sequence_token, None);
    }

    #[tokio::test]
    async fn test_setup_failures() {
        let api = Arc::new(ScriptedApi::new());
        api.push_group(Err(RemoteError::Service {
            code: "AccessDeniedException".into(),
            message: "denied".into(),
        }));
        let session = session(&api, 1);
        assert!(matches!(
            session.setup(identity()).await,
            Err(SetupError::CreateGroup { ref group, .. }) if group == "app"
        ));
        assert!(matches!(session.log("x"), Err(LogError::NotReady)));

        api.push_stream(Err(RemoteError::ResourceNotFound("app".into())));
        assert!(matches!(
            session.setup(identity()).await,
            Err(SetupError::CreateStream { .. })
        ));

        api.push_cursor(Err(RemoteError::Transport("down".into())));
        assert!(matches!(
            session.setup(identity()).await,
            Err(SetupError::CursorLookup(RemoteError::Transport(_)))
        ));
        assert!(!session.is_ready());

        session.setup(identity()).await.unwrap();
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_setup_twice_is_refused() {
        let api = Arc::new(ScriptedApi::new());
        let session = session(&api, 1);

        session.setup(identity()).await.unwrap();
        assert_eq!(session.setup(identity()).await, Err(SetupError::AlreadySetUp));
        assert_eq!(api.created_groups().len(), 1);
    }

    #[tokio::test]
    async fn test_log_with_invokes_callback_once() {
        let api = Arc::new(ScriptedApi::new());
        let session = session(&api, 1);
        session.setup(identity()).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        session
            .log_with("hello", move |result| {
                let _ = tx.send(result);
            })
            .unwrap();

        assert_eq!(rx.await.unwrap(), Ok(Delivered { attempts: 1 }));
        assert_eq!(api.appends()[0].log_events[0].message, "hello");
    }

    #[tokio::test]
    async fn test_log_with_before_setup_does_not_call_back() {
        let api = Arc::new(ScriptedApi::new());
        let session = session(&api, 1);

        let result = session.log_with("early", |_| panic!("callback must not run"));
        assert_eq!(result, Err(LogError::NotReady));
    }

    #[tokio::test]
    async fn test_log_json() {
        #[derive(Serialize)]
        struct Event<'a> {
            level: &'a str,
            message: &'a str,
        }

        let api = Arc::new(ScriptedApi::new());
        let session = session(&api, 1);
        session.setup(identity()).await.unwrap();

        session
            .log_json(&Event {
                level: "info",
                message: "started",
            })
            .unwrap()
            .await
            .unwrap();
        assert_eq!(
            api.appends()[0].log_events[0].message,
            r#"{"level":"info","message":"started"}"#
        );
    }

    #[tokio::test]
    async fn test_shutdown_drains_buffer() {
        let api = Arc::new(ScriptedApi::new());
        let session = session(&api, 100);
        session.setup(identity()).await.unwrap();

        let deliveries: Vec<_> = (0..5).map(|i| session.log(format!("m{i}")).unwrap()).collect();
        session.shutdown().await.unwrap();

        for delivery in deliveries {
            assert_eq!(delivery.await, Ok(Delivered { attempts: 1 }));
        }
        assert_eq!(api.append_count(), 1);
        assert!(matches!(session.log("late"), Err(LogError::Closed)));
        assert!(!session.is_ready());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_delivery_is_logged() {
        let api = Arc::new(ScriptedApi::new());
        api.always_append(Err(RemoteError::Transport("no route".into())));
        let session = session(&api, 1);
        session.setup(identity()).await.unwrap();

        let err = session.log("doomed").unwrap().await.unwrap_err();
        assert_eq!(err.kind, DeliveryErrorKind::Transport("no route".into()));
        assert_eq!(err.attempts, 3);
        assert!(logs_contain("CWL | Dropping batch"));
    }
}
