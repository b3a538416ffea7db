//! HTTP handlers under `/api`

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sandpit::types::{ExecutionResult, ExitReason, TrustMode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::session::{DEFAULT_CODE, DEFAULT_SESSION_LANGUAGE, Session, normalize_ip};
use crate::suggest::Suggestions;
use crate::AppState;

const NO_OUTPUT: &str = "Code executed successfully (no output)";

/// Language reported when `/api/execute` is called without one
const UNSPECIFIED_LANGUAGE: &str = "unspecified";

/// Path of the unrestricted shell, relative to `/api`
pub const TRUSTED_SHELL_PATH: &str = "/internal/shell";

/// Build the API router
///
/// `/api/shell` and its alias `/api/terminal` only run allow-listed
/// commands. The unrestricted shell at `/api/internal/shell` runs arbitrary
/// host commands and is only mounted when `server.expose_trusted_shell` is
/// set.
pub fn router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/execute", post(execute))
        .route("/run", post(run))
        .route("/shell", post(restricted_shell))
        .route("/terminal", post(restricted_shell))
        .route("/suggest", post(suggest))
        .route("/session/save", post(save_session))
        .route("/session/load", get(load_session));

    if state.settings.server.expose_trusted_shell {
        api = api.route(TRUSTED_SHELL_PATH, post(trusted_shell));
    }

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    code: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteResponse {
    result: String,
    error: bool,
    exit_reason: ExitReason,
}

impl From<ExecutionResult> for ExecuteResponse {
    fn from(result: ExecutionResult) -> Self {
        let output = if result.output.is_empty() && !result.is_error {
            NO_OUTPUT.to_owned()
        } else {
            result.output
        };
        Self {
            result: output,
            error: result.is_error,
            exit_reason: result.exit_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CodeRequest {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    command: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputResponse {
    output: String,
    error: bool,
}

impl From<ExecutionResult> for OutputResponse {
    fn from(result: ExecutionResult) -> Self {
        Self {
            output: result.output,
            error: result.is_error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SuggestRequest {
    code: Option<String>,
    language: Option<String>,
    execution_result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveSessionRequest {
    code: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Serialize)]
struct SaveSessionResponse {
    message: &'static str,
    session: Session,
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = payload?;
    let code = required(request.code, "No code provided")?;
    let language = request
        .language
        .filter(|language| !language.trim().is_empty())
        .unwrap_or_else(|| UNSPECIFIED_LANGUAGE.to_owned());

    let result = state.sandbox.run_code(&language, code, None).await?;
    debug!(%language, exit_reason = %result.exit_reason, "executed code");
    Ok(Json(result.into()))
}

async fn run(
    State(state): State<AppState>,
    payload: Result<Json<CodeRequest>, JsonRejection>,
) -> Result<Json<OutputResponse>, ApiError> {
    let Json(request) = payload?;
    let code = required(request.code, "No code provided")?;

    let limits = state.settings.server.run_limits.as_ref();
    let result = state.sandbox.run_code("python", code, limits).await?;
    Ok(Json(result.into()))
}

async fn restricted_shell(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<OutputResponse>, ApiError> {
    run_shell(&state, payload, TrustMode::Restricted).await
}

async fn trusted_shell(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<OutputResponse>, ApiError> {
    run_shell(&state, payload, TrustMode::Trusted).await
}

async fn run_shell(
    state: &AppState,
    payload: Result<Json<CommandRequest>, JsonRejection>,
    mode: TrustMode,
) -> Result<Json<OutputResponse>, ApiError> {
    let Json(request) = payload?;
    let command = required(request.command, "No command provided")?;

    if mode == TrustMode::Trusted {
        info!(%command, "running trusted shell command");
    }
    let result = state.sandbox.run_command(command, mode, None).await?;
    Ok(Json(result.into()))
}

async fn suggest(
    State(state): State<AppState>,
    payload: Result<Json<SuggestRequest>, JsonRejection>,
) -> Result<Json<Suggestions>, ApiError> {
    let Json(request) = payload?;
    let code = required(request.code, "No code provided")?;

    let service = state
        .suggestions
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("AI suggestions are not configured".to_owned()))?;
    let language = request
        .language
        .unwrap_or_else(|| DEFAULT_SESSION_LANGUAGE.to_owned());

    let suggestions = service
        .suggest(&code, &language, request.execution_result.as_deref())
        .await?;
    Ok(Json(suggestions))
}

async fn save_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<SaveSessionRequest>, JsonRejection>,
) -> Result<Json<SaveSessionResponse>, ApiError> {
    let Json(request) = payload?;
    let code = required(request.code, "No code provided")?;

    let client = client_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    let session = state.sessions.save(&client, code, request.language).await?;
    Ok(Json(SaveSessionResponse {
        message: "Session saved successfully",
        session,
    }))
}

async fn load_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Response, ApiError> {
    let client = client_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    let response = match state.sessions.load(&client).await? {
        Some(session) => Json(json!({ "session": session })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "No saved session found",
                "defaultCode": DEFAULT_CODE,
            })),
        )
            .into_response(),
    };
    Ok(response)
}

/// Reject absent and empty fields with `message`
fn required(field: Option<String>, message: &str) -> Result<String, ApiError> {
    field
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::InvalidInput(message.to_owned()))
}

/// First `X-Forwarded-For` entry, else the peer address, normalized
fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded, peer) {
        (Some(forwarded), _) => normalize_ip(forwarded),
        (None, Some(addr)) => normalize_ip(&addr.ip().to_string()),
        (None, None) => "unknown".to_owned(),
    }
}
