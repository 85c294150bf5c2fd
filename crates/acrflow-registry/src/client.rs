//! Registry client trait definition

use crate::error::Result;
use crate::model::{BuildRequest, BuildStatus, RegistryRef};
use async_trait::async_trait;
use std::path::Path;

/// Registry control-plane abstraction
///
/// Everything the build and log commands need from the registry: upload the
/// context, queue a build, query it, find its log, cancel it.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Upload a packed build context and return the source location to build from.
    async fn upload_source(&self, registry: &RegistryRef, archive: &Path) -> Result<String>;

    /// Queue a build and return its id.
    async fn start_build(&self, registry: &RegistryRef, request: &BuildRequest) -> Result<String>;

    async fn build_status(&self, registry: &RegistryRef, build_id: &str) -> Result<BuildStatus>;

    /// Location of the build's append-only log.
    async fn log_location(&self, registry: &RegistryRef, build_id: &str) -> Result<String>;

    async fn cancel_build(&self, registry: &RegistryRef, build_id: &str) -> Result<()>;
}
