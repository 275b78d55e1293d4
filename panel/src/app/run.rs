//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::PanelError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::ssh::RemoteTransport;
use crate::storage::settings::Secrets;
use crate::workers::janitor;

/// Run repodeck until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    secrets: Secrets,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PanelError> {
    run_with(options, secrets, None, shutdown_signal).await
}

/// Like [`run`]; `transport` replaces the libssh2 transport when given
pub async fn run_with(
    options: AppOptions,
    secrets: Secrets,
    transport: Option<Arc<dyn RemoteTransport>>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PanelError> {
    info!("Initializing repodeck...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager =
        ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, secrets, transport, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start repodeck: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    secrets: Secrets,
    transport: Option<Arc<dyn RemoteTransport>>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), PanelError> {
    let app_state = match transport {
        Some(transport) => AppState::init_with_transport(options, secrets, transport).await?,
        None => AppState::init(options, secrets).await?,
    };
    let app_state = Arc::new(app_state);
    shutdown_manager.with_app_state(app_state.clone())?;

    // leftovers of a crash; nothing else touches workspaces yet
    if let Err(e) = janitor::sweep_orphan_workspaces(&options.layout.workspaces_dir()).await {
        warn!("Unable to sweep stale working trees: {}", e);
    }

    init_janitor_worker(
        options.janitor.clone(),
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    init_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await
}

fn init_janitor_worker(
    options: janitor::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PanelError> {
    info!("Initializing janitor worker...");

    let orchestrator = app_state.orchestrator.clone();
    let handle = tokio::spawn(async move {
        janitor::run(
            &options,
            orchestrator,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_janitor_worker_handle(handle)
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PanelError> {
    info!("Initializing control API server...");

    let server_state = ServerState::new(&app_state);
    let handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), PanelError>>>,
    janitor_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
            janitor_worker_handle: None,
        }
    }

    fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), PanelError> {
        if self.app_state.is_some() {
            return Err(PanelError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    fn with_janitor_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), PanelError> {
        if self.janitor_worker_handle.is_some() {
            return Err(PanelError::ShutdownError("janitor_handle already set".to_string()));
        }
        self.janitor_worker_handle = Some(handle);
        Ok(())
    }

    fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PanelError>>,
    ) -> Result<(), PanelError> {
        if self.server_handle.is_some() {
            return Err(PanelError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), PanelError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), PanelError> {
        info!("Shutting down repodeck...");

        // 1. Janitor worker
        if let Some(handle) = self.janitor_worker_handle.take() {
            handle.await.map_err(|e| PanelError::ShutdownError(e.to_string()))?;
        }

        // 2. Server; in-flight deploys finish before it returns
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| PanelError::ShutdownError(e.to_string()))??;
        }

        // 3. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
