use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use query_engine_context::SessionId;

use crate::{error::ServerError, state::ServerState};

/// Stop the question being answered in a session. The query call itself then
/// fails as cancelled.
pub async fn post_cancel(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if state.pipeline.cancel(&SessionId::from(session_id)) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ServerError::NothingRunning)
    }
}
