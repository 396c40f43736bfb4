use axum::{extract::State, http::StatusCode};

use crate::{error::ServerError, state::ServerState};

/// Answers once the database does.
pub async fn get_health(State(state): State<ServerState>) -> Result<StatusCode, ServerError> {
    state.pipeline.health().await?;
    Ok(StatusCode::NO_CONTENT)
}
