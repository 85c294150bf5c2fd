//! Mirrors a remote build's log into the job output until the build ends or
//! the session is aborted.

use crate::append_log::LogSource;
use crate::blob::redact_location;
use crate::error::Result;
use crate::session::BuildSession;
use crate::sink::StatusSink;
use crate::tailer::{DEFAULT_POLL_INTERVAL, LogTailer, TailEvent, TerminalState};
use acrflow_registry::RegistryClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

pub struct BuildLogOrchestrator {
    registry: Arc<dyn RegistryClient>,
    source: Arc<dyn LogSource>,
    poll_interval: Duration,
    pending: TaskTracker,
}

impl BuildLogOrchestrator {
    pub fn new(registry: Arc<dyn RegistryClient>, source: Arc<dyn LogSource>) -> Self {
        Self {
            registry,
            source,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pending: TaskTracker::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Give in-flight cancel requests up to `grace` to finish.
    ///
    /// Only for process shutdown; [`run`](Self::run) never waits on them.
    pub async fn drain(&self, grace: Duration) {
        self.pending.close();
        if tokio::time::timeout(grace, self.pending.wait()).await.is_err() {
            tracing::warn!("Gave up waiting for {} cancel requests", self.pending.len());
        }
    }

    /// Stream the build log of `session` into `sink` and report how it ended.
    ///
    /// Errors are written to the sink and reported as `Failed`; nothing is retried.
    pub async fn run(&self, session: &BuildSession, sink: &mut dyn StatusSink) -> TerminalState {
        match self.tail(session, sink).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Build log streaming failed for {}: {}", session.build_id(), e);
                sink.log_error(&format!("Failed to get build log: {}", e));
                TerminalState::Failed
            }
        }
    }

    async fn tail(&self, session: &BuildSession, sink: &mut dyn StatusSink) -> Result<TerminalState> {
        let token = session.abort_token();

        let location = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(self.abort(session, sink)),
            location = self.registry.log_location(session.registry(), session.build_id()) => location?,
        };
        tracing::info!("Streaming log of build {}", session.build_id());
        sink.log_status(&format!("Build log link: {}", redact_location(&location)));

        let log = self.source.open(&location)?;
        let mut tailer = LogTailer::new(log, token.clone()).with_poll_interval(self.poll_interval);

        loop {
            if token.is_cancelled() {
                return Ok(self.abort(session, sink));
            }
            match tailer.next_line().await? {
                TailEvent::Line(line) => sink.log_status(&line),
                TailEvent::End(TerminalState::Cancelled) => return Ok(self.abort(session, sink)),
                TailEvent::End(TerminalState::Failed) => {
                    sink.log_status(&format!("Build {} failed", session.build_id()));
                    return Ok(TerminalState::Failed);
                }
                TailEvent::End(TerminalState::Succeeded) => {
                    tracing::info!("Build {} succeeded", session.build_id());
                    return Ok(TerminalState::Succeeded);
                }
            }
        }
    }

    /// キャンセル処理: リモートへのキャンセルは一度だけ、結果は待たない
    fn abort(&self, session: &BuildSession, sink: &mut dyn StatusSink) -> TerminalState {
        if session.mark_canceled() {
            sink.log_status(&format!("Cancelling build {}", session.build_id()));

            let registry = Arc::clone(&self.registry);
            let target = session.registry().clone();
            let build_id = session.build_id().to_string();
            self.pending.spawn(async move {
                if let Err(e) = registry.cancel_build(&target, &build_id).await {
                    tracing::warn!("Failed to cancel build {}: {}", build_id, e);
                }
            });
        }

        // 外側にも中断を伝える
        session.abort();
        TerminalState::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::append_log::{Completion, LogChunk};
    use crate::error::LogError;
    use crate::sink::MemorySink;
    use crate::testing::ScriptedSource;
    use acrflow_registry::{BuildRequest, BuildStatus, RegistryError, RegistryRef};
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const LOG_URL: &str = "https://logs.example.com/ca1/rawtext.log?sig=secret";

    struct FakeRegistry {
        location: Option<String>,
        cancels: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn upload_source(
            &self,
            _registry: &RegistryRef,
            _archive: &Path,
        ) -> acrflow_registry::Result<String> {
            unimplemented!()
        }

        async fn start_build(
            &self,
            _registry: &RegistryRef,
            _request: &BuildRequest,
        ) -> acrflow_registry::Result<String> {
            unimplemented!()
        }

        async fn build_status(
            &self,
            _registry: &RegistryRef,
            _build_id: &str,
        ) -> acrflow_registry::Result<BuildStatus> {
            Ok(BuildStatus::Running)
        }

        async fn log_location(
            &self,
            _registry: &RegistryRef,
            build_id: &str,
        ) -> acrflow_registry::Result<String> {
            self.location
                .clone()
                .ok_or_else(|| RegistryError::BuildNotFound(build_id.to_string()))
        }

        async fn cancel_build(
            &self,
            _registry: &RegistryRef,
            build_id: &str,
        ) -> acrflow_registry::Result<()> {
            self.cancels.send(build_id.to_string()).unwrap();
            Ok(())
        }
    }

    fn orchestrator(
        location: Option<&str>,
        script: Vec<crate::error::Result<LogChunk>>,
    ) -> (BuildLogOrchestrator, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = FakeRegistry {
            location: location.map(str::to_string),
            cancels: tx,
        };
        let orchestrator =
            BuildLogOrchestrator::new(Arc::new(registry), Arc::new(ScriptedSource::new(script)))
                .with_poll_interval(Duration::from_millis(5));
        (orchestrator, rx)
    }

    fn session() -> BuildSession {
        BuildSession::new(RegistryRef::new("rg", "myregistry"), "ca1")
    }

    /// Sink that aborts the session as soon as it sees a given line.
    struct AbortingSink {
        inner: MemorySink,
        trigger: &'static str,
        token: CancellationToken,
    }

    impl StatusSink for AbortingSink {
        fn log_status(&mut self, message: &str) {
            self.inner.log_status(message);
            if message == self.trigger {
                self.token.cancel();
            }
        }

        fn log_error(&mut self, message: &str) {
            self.inner.log_error(message);
        }
    }

    #[tokio::test]
    async fn test_success_forwards_lines_verbatim() {
        let (orchestrator, mut cancels) = orchestrator(
            Some(LOG_URL),
            vec![
                Ok(LogChunk::new("L1\n")),
                Ok(LogChunk::new("L2\n").complete(Completion::Success)),
            ],
        );
        let session = session();
        let mut sink = MemorySink::default();

        let state = orchestrator.run(&session, &mut sink).await;

        assert_eq!(state, TerminalState::Succeeded);
        assert_eq!(sink.status.len(), 3);
        assert!(sink.status[0].starts_with("Build log link: https://logs.example.com/ca1/rawtext.log"));
        assert!(!sink.status[0].contains("secret"));
        assert_eq!(&sink.status[1..], &["L1".to_string(), "L2".to_string()]);
        assert!(sink.errors.is_empty());
        assert!(cancels.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remote_failure_reported() {
        let (orchestrator, _cancels) = orchestrator(
            Some(LOG_URL),
            vec![Ok(LogChunk::new("step failed\n").complete(Completion::Failure))],
        );
        let mut sink = MemorySink::default();

        let state = orchestrator.run(&session(), &mut sink).await;

        assert_eq!(state, TerminalState::Failed);
        assert_eq!(sink.status.last().unwrap(), "Build ca1 failed");
        assert!(sink.errors.is_empty());
    }

    #[tokio::test]
    async fn test_location_error_is_failure() {
        let (orchestrator, _cancels) = orchestrator(None, vec![]);
        let mut sink = MemorySink::default();

        let state = orchestrator.run(&session(), &mut sink).await;

        assert_eq!(state, TerminalState::Failed);
        assert!(sink.status.is_empty());
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].starts_with("Failed to get build log"));
    }

    #[tokio::test]
    async fn test_fetch_error_is_failure() {
        let (orchestrator, mut cancels) = orchestrator(
            Some(LOG_URL),
            vec![
                Ok(LogChunk::new("L1\n")),
                Err(LogError::Remote {
                    status: 500,
                    message: "boom".to_string(),
                }),
            ],
        );
        let mut sink = MemorySink::default();

        let state = orchestrator.run(&session(), &mut sink).await;

        assert_eq!(state, TerminalState::Failed);
        assert_eq!(sink.status[1], "L1");
        assert_eq!(sink.errors.len(), 1);
        assert!(cancels.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancellation_stops_lines_and_cancels_once() {
        let (orchestrator, mut cancels) = orchestrator(
            Some(LOG_URL),
            vec![Ok(LogChunk::new("L1\nL2\nL3\n")), Ok(LogChunk::new("L4\n"))],
        );
        let session = session();
        let mut sink = AbortingSink {
            inner: MemorySink::default(),
            trigger: "L1",
            token: session.abort_token().clone(),
        };

        let state = orchestrator.run(&session, &mut sink).await;

        assert_eq!(state, TerminalState::Cancelled);
        assert_eq!(
            &sink.inner.status[1..],
            &["L1".to_string(), "Cancelling build ca1".to_string()]
        );
        assert!(sink.inner.errors.is_empty());
        assert!(session.is_canceled());
        assert!(session.is_abort_requested());

        let cancelled = tokio::time::timeout(Duration::from_secs(1), cancels.recv())
            .await
            .unwrap();
        assert_eq!(cancelled.as_deref(), Some("ca1"));

        // 二回目の実行でもキャンセル要求は出ない
        let state = orchestrator.run(&session, &mut sink).await;
        assert_eq!(state, TerminalState::Cancelled);
        tokio::task::yield_now().await;
        assert!(cancels.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_already_canceled_session() {
        let (orchestrator, mut cancels) = orchestrator(Some(LOG_URL), vec![]);
        let session = session();
        session.mark_canceled();
        session.abort();
        let mut sink = MemorySink::default();

        let state = orchestrator.run(&session, &mut sink).await;

        assert_eq!(state, TerminalState::Cancelled);
        assert!(sink.status.is_empty());
        tokio::task::yield_now().await;
        assert!(cancels.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_interrupted_read_reasserts_abort() {
        let (orchestrator, mut cancels) = orchestrator(
            Some(LOG_URL),
            vec![Ok(LogChunk::new("L1\n")), Err(LogError::Interrupted)],
        );
        let session = session();
        let mut sink = MemorySink::default();

        let state = orchestrator.run(&session, &mut sink).await;

        assert_eq!(state, TerminalState::Cancelled);
        assert!(session.is_abort_requested());
        assert_eq!(sink.status.last().unwrap(), "Cancelling build ca1");
        let cancelled = tokio::time::timeout(Duration::from_secs(1), cancels.recv())
            .await
            .unwrap();
        assert_eq!(cancelled.as_deref(), Some("ca1"));
    }

    #[tokio::test]
    async fn test_drain_waits_for_cancel_request() {
        let (orchestrator, mut cancels) = orchestrator(Some(LOG_URL), vec![]);
        let session = session();
        session.abort();
        let mut sink = MemorySink::default();

        assert_eq!(
            orchestrator.run(&session, &mut sink).await,
            TerminalState::Cancelled
        );
        orchestrator.drain(Duration::from_secs(1)).await;
        assert_eq!(cancels.try_recv().unwrap(), "ca1");
    }
}
