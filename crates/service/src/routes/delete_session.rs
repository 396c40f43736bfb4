use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use query_engine_context::SessionId;

use crate::{error::ServerError, state::ServerState};

pub async fn delete_session(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if state.pipeline.close_session(&SessionId::from(session_id)).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::SessionNotFound)
    }
}
