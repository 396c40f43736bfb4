use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use query_engine_context::{SessionId, TurnId};
use serde::Deserialize;

use crate::{error::ServerError, state::ServerState};

/// Whether the answer to a turn helped.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub turn: TurnId,
    pub helpful: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn post_feedback(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<StatusCode, ServerError> {
    match state
        .pipeline
        .record_feedback(
            &SessionId::from(session_id),
            request.turn,
            request.helpful,
            request.comment,
        )
        .await
    {
        Some(true) => Ok(StatusCode::NO_CONTENT),
        Some(false) => Err(ServerError::TurnNotFound),
        None => Err(ServerError::SessionNotFound),
    }
}
