//! HTTP request handlers

use crate::api::commands::{CommandArgs, CommandReply};
use crate::api::server::AppContext;
use crate::error::Error;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    port: u16,
    sessions: usize,
}

/// Successful command response
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

/// Error body: stable code plus human-readable message
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    code: String,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for a command error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        e if e.is_caller_error() => StatusCode::BAD_REQUEST,
        Error::UnknownSession(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &Error) -> ApiError {
    let status = status_for(err);
    if status.is_server_error() {
        error!("Command failed: {}", err);
    } else {
        warn!("Command rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "wavetap-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        port: ctx.port,
        sessions: ctx.commands.registry().len().await,
    })
}

// ============================================================================
// Command Endpoint
// ============================================================================

/// POST /api/v1/command/:method - Run one command
///
/// The body is a JSON object of named arguments; an empty body means no
/// arguments.
pub async fn command(
    State(ctx): State<AppContext>,
    Path(method): Path<String>,
    body: Bytes,
) -> Result<Json<CommandResponse>, ApiError> {
    let args = parse_args(&body).map_err(|e| error_response(&e))?;

    match ctx.commands.dispatch(&method, args).await {
        Ok(CommandReply::Ack) => Ok(Json(CommandResponse {
            status: "ok".to_string(),
            value: None,
        })),
        Ok(CommandReply::Value(value)) => Ok(Json(CommandResponse {
            status: "ok".to_string(),
            value: Some(value),
        })),
        Ok(CommandReply::NotImplemented(method)) => Err((
            StatusCode::NOT_IMPLEMENTED,
            Json(ErrorResponse {
                code: "NOT_IMPLEMENTED".to_string(),
                message: format!("Method '{}' is not implemented", method),
            }),
        )),
        Err(e) => Err(error_response(&e)),
    }
}

fn parse_args(body: &[u8]) -> Result<CommandArgs, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CommandArgs::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| Error::InvalidArgument(format!("Malformed arguments: {}", e)))
}
