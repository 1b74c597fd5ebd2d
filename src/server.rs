//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Role | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/auth/login` | - | Check credentials, set the session cookie |
//! | `POST` | `/auth/register` | - | Create an account with role `user` |
//! | `POST` | `/auth/roles` | `admin` | Replace a user's roles |
//! | `POST` | `/llm/embed` | `admin` | Chunk, embed and store text |
//! | `POST` | `/llm/ask` | `user` | Answer a question from stored context |
//! | `GET`  | `/health` | - | Health check (version and record count) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `password_mismatch` (400),
//! `unauthorized` (401), `invalid_credentials` (401), `not_found` (404),
//! `user_exists` (409), `embedding_service` (502), `generation_service` (502),
//! `store` (500), `internal` (500).

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::AppServices;
use crate::auth::{RoleList, ROLE_ADMIN, ROLE_USER};
use crate::config::Config;
use crate::error::{AuthError, RagError};
use crate::models::{Answer, Identity};

type AppState = Arc<AppServices>;

/// Build services from `config` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Arc::new(AppServices::from_config(config).await?);
    serve(services, &config.server.bind).await
}

/// Serve an already-assembled set of services on `bind_addr`.
pub async fn serve(services: Arc<AppServices>, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(services);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(services: Arc<AppServices>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/auth/login", post(handle_login))
        .route("/auth/register", post(handle_register))
        .route("/auth/roles", post(handle_update_roles))
        .route("/llm/embed", post(handle_embed))
        .route("/llm/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(services)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::InputConstraint(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            RagError::Embedding(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "embedding_service", message)
            }
            RagError::Generation(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "generation_service", message)
            }
            RagError::Store(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "store", message)
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::Unauthorized(_) => {
                AppError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
            }
            AuthError::InvalidCredentials => {
                AppError::new(StatusCode::UNAUTHORIZED, "invalid_credentials", message)
            }
            AuthError::PasswordMismatch => {
                AppError::new(StatusCode::BAD_REQUEST, "password_mismatch", message)
            }
            AuthError::InputConstraint(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            AuthError::UserNotFound(_) => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            AuthError::UserExists(_) => AppError::new(StatusCode::CONFLICT, "user_exists", message),
            AuthError::Store(_) | AuthError::CorruptRoles { .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "store", message)
            }
            AuthError::Hashing(_) => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ Session cookie ============

fn session_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn authorize(state: &AppServices, headers: &HeaderMap, roles: &[&str]) -> Result<Identity, AppError> {
    let token = session_cookie(headers, &state.config.auth.cookie_name);
    Ok(state.auth.authorize(token, roles)?)
}

// ============ Auth endpoints ============

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let identity = state
        .users
        .verify_credentials(&req.username, &req.password)
        .await?;
    let token = state.auth.tokens().issue(&identity);

    let auth = &state.config.auth;
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        auth.cookie_name,
        token,
        state.auth.tokens().ttl_secs()
    );
    if auth.secure_cookie {
        cookie.push_str("; Secure");
    }
    let cookie = HeaderValue::from_str(&cookie).map_err(|e| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
    })?;

    tracing::info!(username = %identity.username, "login");
    let body = Json(MessageResponse {
        message: format!("access granted to {}", identity.username),
    });
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    password_repeat: String,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = state
        .users
        .register(&req.username, &req.password, &req.password_repeat)
        .await?;
    Ok(Json(MessageResponse {
        message: format!("user {} was added", user.username),
    }))
}

#[derive(Deserialize)]
struct UpdateRolesRequest {
    username: String,
    roles: Vec<String>,
}

#[derive(Serialize)]
struct UpdateRolesResponse {
    status: &'static str,
    username: String,
    new_roles: Vec<String>,
}

async fn handle_update_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateRolesRequest>,
) -> Result<Json<UpdateRolesResponse>, AppError> {
    let caller = authorize(&state, &headers, &[ROLE_ADMIN])?;
    let roles = RoleList::parse(&req.roles).map_err(AuthError::from)?;
    let new_roles = state.users.update_roles(&req.username, roles).await?;

    tracing::info!(by = %caller.username, target = %req.username, "roles replaced");
    Ok(Json(UpdateRolesResponse {
        status: "ok",
        username: req.username,
        new_roles,
    }))
}

// ============ Retrieval endpoints ============

#[derive(Deserialize)]
struct TextIn {
    text: String,
}

#[derive(Serialize)]
struct EmbedResponse {
    status: &'static str,
    chunks_added_counts: usize,
}

async fn handle_embed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TextIn>,
) -> Result<Json<EmbedResponse>, AppError> {
    let caller = authorize(&state, &headers, &[ROLE_ADMIN])?;
    let added = state.retriever.ingest(&req.text).await?;

    tracing::info!(by = %caller.username, chunks = added, "ingestion request");
    Ok(Json(EmbedResponse {
        status: "ok",
        chunks_added_counts: added,
    }))
}

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TextIn>,
) -> Result<Json<Answer>, AppError> {
    authorize(&state, &headers, &[ROLE_USER])?;
    Ok(Json(state.answerer.answer(&req.text).await?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    records: usize,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let records = state.retriever.store().count().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        records,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; jwt_personal_session_token=abc.def.ghi; x=1"),
        );
        assert_eq!(
            session_cookie(&headers, "jwt_personal_session_token"),
            Some("abc.def.ghi")
        );
        assert_eq!(session_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_error_mapping() {
        let err: AppError = AuthError::PasswordMismatch.into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "password_mismatch");

        let err: AppError = RagError::Embedding(crate::error::EmbeddingServiceError::Disabled).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);

        let err: AppError = AuthError::Unauthorized("no session".into()).into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
