use std::str::FromStr;

use axum::{extract::State, Json};
use query_engine_context::{SessionId, TurnId};
use query_engine_execution::CancelHandle;
use query_engine_metadata::metadata::Column;
use query_engine_visualization::{ChartSpec, ChartType};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::{PipelineError, ServerError};
use crate::pipeline::{AskOptions, Input};
use crate::state::ServerState;

/// Either a question or a SQL statement, asked in a session. A new session is
/// started when no session id is given.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub session_id: Option<String>,
    pub question: Option<String>,
    pub sql: Option<String>,
    /// Draw the result as this kind of chart, if it fits.
    pub chart_type: Option<String>,
    /// Include the query plan in the response.
    #[serde(default)]
    pub analyze: bool,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub session_id: SessionId,
    pub turn: TurnId,
    pub sql: String,
    pub columns: Vec<Column>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub truncated: bool,
    pub execution_time_ms: u64,
    pub chart_candidates: Vec<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

/// Trips the run's cancel handle if the request is dropped before the run
/// finishes, which is what happens when the client goes away.
struct CancelOnDrop(Option<CancelHandle>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            tracing::info!("client went away, cancelling the run");
            cancel.cancel();
        }
    }
}

pub async fn post_query(
    State(state): State<ServerState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ServerError> {
    let chart_type = request
        .chart_type
        .as_deref()
        .map(ChartType::from_str)
        .transpose()
        .map_err(|err| ServerError::BadRequest(err.to_string()))?;
    let session_id = SessionId::from(
        request
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    );

    let (text, is_sql) = match (request.question, request.sql) {
        (Some(question), None) => (question, false),
        (None, Some(sql)) => (sql, true),
        _ => {
            return Err(ServerError::BadRequest(
                "exactly one of question and sql is required".to_string(),
            ))
        }
    };
    let options = AskOptions {
        analyze: request.analyze,
    };

    // The run gets its own task so that it still stops cleanly, on the
    // server too, and records the turn as cancelled after a disconnect.
    let cancel = CancelHandle::new();
    let guard = CancelOnDrop(Some(cancel.clone()));
    let pipeline = state.pipeline.clone();
    let run_session = session_id.clone();
    let run = tokio::spawn(
        async move {
            let input = if is_sql {
                Input::Sql(&text)
            } else {
                Input::Question(&text)
            };
            pipeline.answer(&run_session, input, options, &cancel).await
        }
        .in_current_span(),
    );
    let joined = run.await;
    guard.disarm();
    let answer = joined
        .map_err(|error| PipelineError::Internal(format!("the query task failed: {error}")))??;

    let chart = chart_type.and_then(|chart_type| {
        state
            .pipeline
            .chart(&answer.result, chart_type)
            .map_err(|err| tracing::warn!(%err, "requested chart not drawn"))
            .ok()
    });

    Ok(Json(QueryResponse {
        session_id,
        turn: answer.turn,
        sql: answer.sql,
        rows: answer.result.records(),
        columns: answer.result.columns,
        row_count: answer.result.row_count,
        truncated: answer.result.truncated,
        execution_time_ms: u64::try_from(answer.result.execution_time.as_millis())
            .unwrap_or(u64::MAX),
        chart_candidates: answer.chart_candidates,
        chart,
        analysis: answer.analysis,
    }))
}
