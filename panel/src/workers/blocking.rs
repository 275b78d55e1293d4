//! Blocking work offload
//!
//! Archive extraction, git and SSH calls block their thread. They are
//! submitted here so the async runtime keeps serving other users.

use tracing::error;

use crate::errors::PanelError;

/// Run a blocking unit of work on the blocking pool and await its result
pub async fn run_blocking<T, F>(label: &'static str, work: F) -> Result<T, PanelError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PanelError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => {
            error!("Blocking task '{}' did not complete: {}", label, e);
            Err(e.into())
        }
    }
}
