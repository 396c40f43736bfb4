use axum::extract::State;
use prometheus::{Encoder, TextEncoder};

use crate::{
    error::{PipelineError, ServerError},
    state::ServerState,
};

pub async fn get_metrics(State(state): State<ServerState>) -> Result<String, ServerError> {
    state.pipeline.update_pool_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.metrics_registry.gather(), &mut buffer)
        .map_err(|err| PipelineError::Internal(err.to_string()))?;
    String::from_utf8(buffer).map_err(|err| PipelineError::Internal(err.to_string()).into())
}
