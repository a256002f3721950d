//! Seam for hook implementations that own external resources.

use async_trait::async_trait;

use hookwire_core::AppResult;

/// A source of hooks that must be torn down when a run ends early.
///
/// The pipeline calls [`HookBackend::shutdown`] when it aborts on a fatal
/// error, because the normal teardown path (the last `afterAll` hook) will
/// never run. Implementations must tolerate being shut down twice.
#[async_trait]
pub trait HookBackend: Send + Sync + std::fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Releases every resource held by the backend.
    async fn shutdown(&self) -> AppResult<()>;
}
