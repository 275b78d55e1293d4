//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use github_api::models::{PushEvent, Repository};
use panel_api::models::{
    AccountPreferencesResponse, ArchiveAttachment, ContentEntry, ContentsResponse,
    CreateRepositoryRequest, CreateRepositoryResponse, DeployInputPayload, DeployInputRequest,
    EditFileRequest, EditFileResponse, ErrorResponse, FileView, GithubLoginRequest,
    GithubLoginResponse, HealthResponse, InitialPushReport, NotificationsResponse, RenderedState,
    RepoDetailsResponse, RepoPageResponse, RepoSummary, ServerProfileRequest,
    ServerProfileResponse, StartDeployRequest, StartDeployResponse, SubscribeRequest,
    SubscribeResponse, UpdateRepositoryRequest, VersionResponse, WebhookResponse,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::deploy::archive::ArchiveUpload;
use crate::deploy::fsm::DeployMethod;
use crate::deploy::orchestrator::DeployInput;
use crate::deploy::sync::SyncOutcome;
use crate::errors::PanelError;
use crate::github::webhook::{verify_signature, EVENT_HEADER, SIGNATURE_HEADER};
use crate::github::{FileEdit, HookStatus, NewRepo, RepoContents};
use crate::notifications::fan_out_push;
use crate::profiles::ServerRegistration;
use crate::server::state::ServerState;
use crate::storage::accounts::{GithubAccount, RepoFilter};
use crate::storage::profiles::ServerProfile;
use crate::storage::UserId;
use crate::utils::version_info;

/// Error returned by handlers, rendered as [`ErrorResponse`]
#[derive(Debug)]
pub struct ApiError(PanelError);

impl From<PanelError> for ApiError {
    fn from(err: PanelError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PanelError::NotFound(_) => StatusCode::NOT_FOUND,
            PanelError::ValidationError(_) | PanelError::ArchiveError(_) => StatusCode::BAD_REQUEST,
            PanelError::Busy(_) => StatusCode::CONFLICT,
            PanelError::ConnectionError(_) | PanelError::GithubError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            PanelError::NotFound(_) => "not_found",
            PanelError::ValidationError(_) | PanelError::ArchiveError(_) => "validation",
            PanelError::Busy(_) => "busy",
            PanelError::ConnectionError(_) | PanelError::GithubError(_) => "upstream",
            _ => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(PanelError::ValidationError(message.into()))
}

// ================================== SERVICE ==================================== //

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "repodeck".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ================================== DEPLOYS ==================================== //

pub async fn start_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<StartDeployRequest>,
) -> ApiResult<StartDeployResponse> {
    let started = state
        .orchestrator
        .start_deploy(request.user_id, &request.owner, &request.repo)
        .await?;
    Ok(Json(StartDeployResponse {
        session_id: started.session_id,
        state: started.state.into(),
    }))
}

pub async fn deploy_input_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    Json(request): Json<DeployInputRequest>,
) -> ApiResult<RenderedState> {
    let input = parse_input(request.input)?;
    let rendered = state.orchestrator.advance(&session_id, input).await?;
    Ok(Json(rendered.into()))
}

pub async fn cancel_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> ApiResult<RenderedState> {
    let rendered = state.orchestrator.cancel(&session_id)?;
    Ok(Json(rendered.into()))
}

fn parse_input(payload: DeployInputPayload) -> Result<DeployInput, ApiError> {
    match payload {
        DeployInputPayload::ChooseMethod { method } => match method.as_str() {
            "archive" => Ok(DeployInput::ChooseMethod(DeployMethod::Archive)),
            "remote" => Ok(DeployInput::ChooseMethod(DeployMethod::Remote)),
            other => Err(bad_request(format!("unknown deploy method: {}", other))),
        },
        DeployInputPayload::Archive {
            file_name,
            content_base64,
        } => Ok(DeployInput::Archive(decode_archive(file_name, &content_base64)?)),
        DeployInputPayload::Text { text } => Ok(DeployInput::Text(text)),
        DeployInputPayload::ChangePath => Ok(DeployInput::ChangePath),
    }
}

fn decode_archive(file_name: String, content_base64: &str) -> Result<ArchiveUpload, ApiError> {
    let bytes = B64
        .decode(content_base64.trim())
        .map_err(|e| bad_request(format!("archive content is not base64: {}", e)))?;
    Ok(ArchiveUpload::new(file_name, bytes))
}

// ================================== GITHUB ===================================== //

pub async fn link_github_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
    Json(request): Json<GithubLoginRequest>,
) -> ApiResult<GithubLoginResponse> {
    let token = SecretString::from(request.token);
    let github_username = state.github.link_account(user, token).await?;
    Ok(Json(GithubLoginResponse { github_username }))
}

#[derive(Debug, Deserialize)]
pub struct RepoPageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_repos_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
    Query(query): Query<RepoPageQuery>,
) -> ApiResult<RepoPageResponse> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10);
    let listing = state.github.list_repos(user, page, per_page).await?;
    Ok(Json(RepoPageResponse {
        repos: listing.repos.iter().map(repo_summary).collect(),
        page,
        has_next: listing.has_next,
    }))
}

pub async fn repo_details_handler(
    State(state): State<Arc<ServerState>>,
    Path((user, owner, repo)): Path<(UserId, String, String)>,
) -> ApiResult<RepoDetailsResponse> {
    let details = state.github.repo_details(user, &owner, &repo).await?;
    Ok(Json(RepoDetailsResponse {
        repo: repo_summary(&details.repo),
        description: details.repo.description.clone(),
        default_branch: details.head.branch,
        head_sha: details.head.sha,
    }))
}

/// Create a repository. An attached archive becomes the first commit; its
/// failure is reported in the body since the repository already exists.
pub async fn create_repo_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
    Json(request): Json<CreateRepositoryRequest>,
) -> Result<(StatusCode, Json<CreateRepositoryResponse>), ApiError> {
    let upload = request
        .archive
        .map(|ArchiveAttachment { file_name, content_base64 }| {
            decode_archive(file_name, &content_base64)
        })
        .transpose()?;
    if let Some(upload) = &upload {
        upload.validate()?;
    }

    let new = NewRepo {
        name: request.name,
        description: request.description,
        private: request.private,
        gitignore_template: request.gitignore_template,
    };
    let repository = state.github.create_repo(user, new).await?;

    let initial_push = match upload {
        Some(upload) => {
            let result = state
                .orchestrator
                .push_initial_archive(user, &repository.owner.login, &repository.name, upload)
                .await;
            Some(initial_push_report(result))
        }
        None => None,
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateRepositoryResponse {
            repo: repo_summary(&repository),
            initial_push,
        }),
    ))
}

fn initial_push_report(result: Result<SyncOutcome, PanelError>) -> InitialPushReport {
    let (status, message) = match result {
        Ok(SyncOutcome::Committed { .. }) => ("committed", None),
        Ok(SyncOutcome::NoChanges) => (
            "no_changes",
            Some("The archive matches the initial commit.".to_string()),
        ),
        Ok(SyncOutcome::Cancelled) => ("failed", Some("The push was cancelled.".to_string())),
        Err(e) => {
            warn!("Initial push failed: {}", e);
            ("failed", Some(e.to_string()))
        }
    };
    InitialPushReport {
        status: status.to_string(),
        message,
    }
}

pub async fn update_repo_handler(
    State(state): State<Arc<ServerState>>,
    Path((user, owner, repo)): Path<(UserId, String, String)>,
    Json(request): Json<UpdateRepositoryRequest>,
) -> ApiResult<RepoSummary> {
    let repository = state
        .github
        .update_repo(user, &owner, &repo, request.name, request.description)
        .await?;
    Ok(Json(repo_summary(&repository)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRepoQuery {
    #[serde(default)]
    pub confirm: String,
}

pub async fn delete_repo_handler(
    State(state): State<Arc<ServerState>>,
    Path((user, owner, repo)): Path<(UserId, String, String)>,
    Query(query): Query<DeleteRepoQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .github
        .delete_repo(user, &owner, &repo, &query.confirm)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ContentsQuery {
    #[serde(default)]
    pub path: String,
}

pub async fn contents_handler(
    State(state): State<Arc<ServerState>>,
    Path((user, owner, repo)): Path<(UserId, String, String)>,
    Query(query): Query<ContentsQuery>,
) -> ApiResult<ContentsResponse> {
    let contents = state.github.contents(user, &owner, &repo, &query.path).await?;
    Ok(Json(match contents {
        RepoContents::Directory(items) => ContentsResponse::Directory {
            path: query.path.trim_matches('/').to_string(),
            entries: items
                .into_iter()
                .map(|item| ContentEntry {
                    name: item.name,
                    path: item.path,
                    kind: item.kind,
                    size: item.size,
                })
                .collect(),
        },
        RepoContents::File { item, text } => ContentsResponse::File(FileView {
            path: item.path,
            sha: item.sha,
            size: item.size,
            html_url: item.html_url,
            text,
        }),
    }))
}

pub async fn edit_file_handler(
    State(state): State<Arc<ServerState>>,
    Path((user, owner, repo)): Path<(UserId, String, String)>,
    Json(request): Json<EditFileRequest>,
) -> ApiResult<EditFileResponse> {
    let message = request
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Update {}", request.path.trim_matches('/')));
    let edit = FileEdit {
        path: &request.path,
        message: &message,
        content: &request.content,
        sha: &request.sha,
    };
    let commit_sha = state.github.edit_file(user, &owner, &repo, edit).await?;
    Ok(Json(EditFileResponse { commit_sha }))
}

/// Zip of the default branch as `<repo>.zip`
pub async fn download_repo_handler(
    State(state): State<Arc<ServerState>>,
    Path((user, owner, repo)): Path<(UserId, String, String)>,
) -> Result<Response, ApiError> {
    let bytes = state.github.download_archive(user, &owner, &repo).await?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}.zip\"", repo))
        .map_err(|e| ApiError(PanelError::Internal(e.to_string())))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn subscribe_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
    Json(request): Json<SubscribeRequest>,
) -> ApiResult<SubscribeResponse> {
    let subscription = state
        .github
        .subscribe(user, &request.owner, &request.repo)
        .await?;
    let hook = match subscription.hook {
        Some(HookStatus::Created) => "created",
        Some(HookStatus::AlreadyExists) => "already_exists",
        None => "skipped",
    };
    Ok(Json(SubscribeResponse {
        repo_full_name: subscription.repo_full_name,
        hook: hook.to_string(),
    }))
}

pub async fn preferences_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
) -> ApiResult<AccountPreferencesResponse> {
    let account = linked_account(&state, user).await?;
    Ok(Json(preferences(&account)))
}

pub async fn toggle_ignore_own_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
) -> ApiResult<AccountPreferencesResponse> {
    if state.accounts.toggle_ignore_own_pushes(user).await?.is_none() {
        return Err(no_account(user));
    }
    let account = linked_account(&state, user).await?;
    Ok(Json(preferences(&account)))
}

pub async fn toggle_repo_filter_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
) -> ApiResult<AccountPreferencesResponse> {
    if state.accounts.toggle_repo_filter(user).await?.is_none() {
        return Err(no_account(user));
    }
    let account = linked_account(&state, user).await?;
    Ok(Json(preferences(&account)))
}

async fn linked_account(state: &ServerState, user: UserId) -> Result<GithubAccount, ApiError> {
    state.accounts.get(user).await.ok_or_else(|| no_account(user))
}

fn no_account(user: UserId) -> ApiError {
    ApiError(PanelError::NotFound(format!("GitHub account of user {}", user)))
}

fn preferences(account: &GithubAccount) -> AccountPreferencesResponse {
    AccountPreferencesResponse {
        github_username: account.github_username.clone(),
        ignore_own_pushes: account.ignore_own_pushes,
        repo_filter: match account.repo_filter {
            RepoFilter::All => "all",
            RepoFilter::Owner => "owner",
        }
        .to_string(),
    }
}

fn repo_summary(repo: &Repository) -> RepoSummary {
    RepoSummary {
        owner: repo.owner.login.clone(),
        name: repo.name.clone(),
        full_name: repo.full_name.clone(),
        html_url: repo.html_url.clone(),
        private: repo.private,
    }
}

// ================================== SERVERS ==================================== //

pub async fn put_server_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
    Json(request): Json<ServerProfileRequest>,
) -> ApiResult<ServerProfileResponse> {
    let registration = ServerRegistration {
        host: request.host,
        port: request.port,
        username: request.username,
        password: SecretString::from(request.password),
    };
    let profile = state.profiles.register(user, registration).await?;
    Ok(Json(profile_response(&profile)))
}

pub async fn get_server_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
) -> ApiResult<ServerProfileResponse> {
    let profile = state
        .profiles
        .get(user)
        .await?
        .ok_or_else(|| ApiError(PanelError::NotFound(format!("server profile of user {}", user))))?;
    Ok(Json(profile_response(&profile)))
}

pub async fn delete_server_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    if state.profiles.remove(user).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError(PanelError::NotFound(format!(
            "server profile of user {}",
            user
        ))))
    }
}

fn profile_response(profile: &ServerProfile) -> ServerProfileResponse {
    ServerProfileResponse {
        host: profile.host.clone(),
        port: profile.port,
        username: profile.username.clone(),
        auth_kind: profile.auth_kind.as_str().to_string(),
    }
}

// =============================== NOTIFICATIONS ================================= //

pub async fn notifications_handler(
    State(state): State<Arc<ServerState>>,
    Path(user): Path<UserId>,
) -> Json<NotificationsResponse> {
    Json(NotificationsResponse {
        notifications: state.outbox.drain(user),
    })
}

/// GitHub webhook deliveries.
///
/// With a webhook secret configured, unsigned or mis-signed deliveries are
/// rejected with 401.
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, Response> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret.expose_secret().as_bytes(), signature, &body) {
            warn!("Rejected webhook delivery with a bad signature");
            return Err(StatusCode::UNAUTHORIZED.into_response());
        }
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if event != "push" {
        debug!("Ignoring webhook event '{}'", event);
        return Ok(Json(WebhookResponse {
            event,
            delivered: 0,
        }));
    }

    let push: PushEvent = serde_json::from_slice(&body).map_err(|e| {
        ApiError(PanelError::ValidationError(format!("invalid push payload: {}", e))).into_response()
    })?;
    let delivered = fan_out_push(&push, &state.subscriptions, &state.accounts, &state.outbox).await;
    Ok(Json(WebhookResponse { event, delivered }))
}
