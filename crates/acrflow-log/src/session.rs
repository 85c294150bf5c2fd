//! Build session shared between the job runner and the log orchestrator

use acrflow_registry::RegistryRef;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// A running remote build as seen by the job that started it.
///
/// `abort` is the signal from the outside (Ctrl-C, job timeout). The
/// `canceled` flag records that the remote build was asked to stop, which
/// happens at most once per session.
#[derive(Debug)]
pub struct BuildSession {
    registry: RegistryRef,
    build_id: String,
    abort: CancellationToken,
    canceled: AtomicBool,
}

impl BuildSession {
    pub fn new(registry: RegistryRef, build_id: impl Into<String>) -> Self {
        Self::with_token(registry, build_id, CancellationToken::new())
    }

    pub fn with_token(
        registry: RegistryRef,
        build_id: impl Into<String>,
        abort: CancellationToken,
    ) -> Self {
        Self {
            registry,
            build_id: build_id.into(),
            abort,
            canceled: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &RegistryRef {
        &self.registry
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Ask everything waiting on this session to stop.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Mark the session canceled. Returns `true` only for the first caller.
    pub fn mark_canceled(&self) -> bool {
        !self.canceled.swap(true, Ordering::SeqCst)
    }
}
