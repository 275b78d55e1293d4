//! Janitor worker: drops idle deploy sessions and stale working trees

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::deploy::orchestrator::DeployOrchestrator;
use crate::errors::PanelError;
use crate::filesys::dir::Dir;
use crate::filesys::workspace::WORKING_TREE_PREFIX;

/// Janitor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// How often idle sessions are swept
    pub interval: Duration,

    /// Sessions without input for longer than this are dropped
    pub idle_ttl: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Run the janitor worker
pub async fn run<S, F>(
    options: &Options,
    orchestrator: Arc<DeployOrchestrator>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Janitor worker starting...");

    let idle_ttl = match chrono::Duration::from_std(options.idle_ttl) {
        Ok(ttl) => ttl,
        Err(e) => {
            warn!("Invalid session idle TTL {:?}: {}", options.idle_ttl, e);
            chrono::Duration::minutes(30)
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Janitor worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        let expired = orchestrator.sessions().expire_idle(Utc::now(), idle_ttl);
        if expired.is_empty() {
            debug!("No idle deploy sessions");
        } else {
            info!("Expired {} idle deploy sessions", expired.len());
        }
    }
}

/// Remove working trees left behind by a previous process.
///
/// Only run at startup, before any deploy can create a new tree.
pub async fn sweep_orphan_workspaces(workspaces: &Dir) -> Result<usize, PanelError> {
    if !workspaces.exists().await {
        return Ok(0);
    }

    let mut removed = 0;
    for path in workspaces.list_dirs().await? {
        if !is_working_tree(&path) {
            continue;
        }
        match Dir::new(&path).delete().await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Unable to remove stale working tree {:?}: {}", path, e),
        }
    }

    if removed > 0 {
        info!("Removed {} stale working trees", removed);
    }
    Ok(removed)
}

fn is_working_tree(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(WORKING_TREE_PREFIX))
        .unwrap_or(false)
}
