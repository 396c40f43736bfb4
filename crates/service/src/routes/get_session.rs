use axum::{
    extract::{Path, State},
    Json,
};
use query_engine_context::SessionId;

use crate::{error::ServerError, pipeline::SessionView, state::ServerState};

pub async fn get_session(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ServerError> {
    state
        .pipeline
        .session(&SessionId::from(session_id))
        .await
        .map(Json)
        .ok_or(ServerError::SessionNotFound)
}
