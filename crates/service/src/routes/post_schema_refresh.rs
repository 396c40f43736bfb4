use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::ServerError, state::ServerState};

#[derive(Debug, Serialize)]
pub struct SchemaRefreshResponse {
    pub tables: Vec<String>,
    pub built_at: DateTime<Utc>,
}

/// Introspect the database again. The previous snapshot stays in use if this
/// fails.
pub async fn post_schema_refresh(
    State(state): State<ServerState>,
) -> Result<Json<SchemaRefreshResponse>, ServerError> {
    let snapshot = state.pipeline.refresh_schema().await?;
    let tables = snapshot.tables.0.keys().cloned().collect();
    Ok(Json(SchemaRefreshResponse {
        tables,
        built_at: snapshot.built_at,
    }))
}
