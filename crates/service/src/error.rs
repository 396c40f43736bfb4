use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use query_engine_execution::{ExecutionError, SchemaIntrospectionError};
use query_engine_generation::GenerationError;
use query_engine_validation::Rejection;
use serde::Serialize;
use thiserror::Error;

use crate::classifier::{classify, redact, ClassifiedError, ErrorKind};

/// Everything that can stop a question from being answered.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("validation failed: {0}")]
    Rejected(#[from] Rejection),
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("schema introspection failed: {0}")]
    Introspection(#[from] SchemaIntrospectionError),
    #[error("the request was cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::Execution(ExecutionError::Cancelled)
        )
    }
}

pub enum ServerError {
    Pipeline(ClassifiedError),
    SessionNotFound,
    /// The turn has left the session's window or has not finished.
    TurnNotFound,
    /// A cancel arrived for a session with no question in progress.
    NothingRunning,
    BadRequest(String),
}

#[derive(Serialize)]
struct JsonErrorResponse {
    message: String,
}

impl From<PipelineError> for ServerError {
    fn from(error: PipelineError) -> Self {
        let classified = classify(&error);
        tracing::error!(
            meta.signal_type = "log",
            event.domain = "nl-sql",
            event.name = "Query error",
            name = "Query error",
            kind = %classified.kind,
            retryable = classified.retryable,
            body = %redact(&error.to_string()),
            error = true,
        );
        ServerError::Pipeline(classified)
    }
}

fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationRejected | ErrorKind::SyntaxError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::GenerationError => StatusCode::BAD_GATEWAY,
        ErrorKind::ConnectionError | ErrorKind::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::TimeoutError => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::PermissionError => StatusCode::FORBIDDEN,
        ErrorKind::ExecutionError => StatusCode::BAD_REQUEST,
        // nginx's "client closed request"
        ErrorKind::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::Pipeline(classified) => {
                (status_code(classified.kind), Json(classified)).into_response()
            }
            ServerError::SessionNotFound => not_found("Session not found"),
            ServerError::TurnNotFound => not_found("Turn not found"),
            ServerError::NothingRunning => not_found("Nothing is running in this session"),
            ServerError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(JsonErrorResponse { message })).into_response()
            }
        }
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(JsonErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}
