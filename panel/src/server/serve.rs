//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::PanelError;
use crate::github::service::WEBHOOK_PATH;
use crate::server::handlers::{
    cancel_deploy_handler, contents_handler, create_repo_handler, delete_repo_handler,
    delete_server_handler, deploy_input_handler, download_repo_handler, edit_file_handler,
    get_server_handler, health_handler, link_github_handler, list_repos_handler,
    notifications_handler, preferences_handler, put_server_handler, repo_details_handler,
    start_deploy_handler, subscribe_handler, toggle_ignore_own_handler,
    toggle_repo_filter_handler, update_repo_handler, version_handler, webhook_handler,
};
use crate::server::state::ServerState;

/// Largest accepted request body; archives arrive base64-encoded
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Build the control API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deploys
        .route("/deploys", post(start_deploy_handler))
        .route("/deploys/{id}", delete(cancel_deploy_handler))
        .route("/deploys/{id}/input", post(deploy_input_handler))
        // GitHub account
        .route("/users/{id}/github", put(link_github_handler).get(preferences_handler))
        .route("/users/{id}/github/toggle-ignore-own", post(toggle_ignore_own_handler))
        .route("/users/{id}/github/toggle-repo-filter", post(toggle_repo_filter_handler))
        .route("/users/{id}/repos", get(list_repos_handler).post(create_repo_handler))
        .route(
            "/users/{id}/repos/{owner}/{repo}",
            get(repo_details_handler)
                .patch(update_repo_handler)
                .delete(delete_repo_handler),
        )
        .route(
            "/users/{id}/repos/{owner}/{repo}/contents",
            get(contents_handler).put(edit_file_handler),
        )
        .route("/users/{id}/repos/{owner}/{repo}/archive", get(download_repo_handler))
        .route("/users/{id}/subscriptions", post(subscribe_handler))
        // Server profile
        .route(
            "/users/{id}/server",
            put(put_server_handler)
                .get(get_server_handler)
                .delete(delete_server_handler),
        )
        // Notifications
        .route("/users/{id}/notifications", get(notifications_handler))
        .route(WEBHOOK_PATH, post(webhook_handler))
        // State and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PanelError>>, PanelError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PanelError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PanelError::ServerError(e.to_string()))
    });

    Ok(handle)
}
