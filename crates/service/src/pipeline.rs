//! From a question to rows and chart candidates.
//!
//! Each session's stages run one after another while holding that session's
//! context. Different sessions only meet at the connection pool and the
//! schema cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nl_sql_configuration::Configuration;
use query_engine_context::{
    ContextSummary, ConversationContext, SessionId, SessionRegistry, Turn, TurnId, TurnStatus,
};
use query_engine_execution::{
    update_pool_metrics, CancelHandle, Driver, DriverErrorKind, ExecutionError, Executor,
    Metrics, SchemaCache,
};
use query_engine_generation::{CompletionBackend, GenerationError, SqlGenerator};
use query_engine_metadata::metadata::{ConnectionFingerprint, ExecutionResult, SchemaSnapshot};
use query_engine_validation::{DraftSql, Validator};
use query_engine_visualization::{ChartSpec, ChartType, Selector, VisualizationError};
use serde::Serialize;
use tracing::{info_span, Instrument};

use crate::error::PipelineError;

/// A question answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub turn: TurnId,
    /// The statement as executed, row limit included.
    pub sql: String,
    pub result: ExecutionResult,
    /// Best first; always ends with a table.
    pub chart_candidates: Vec<ChartSpec>,
    /// The query plan, when asked for.
    pub analysis: Option<String>,
}

/// What a session looks like from the outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub summary: ContextSummary,
    pub turns: Vec<Turn>,
}

/// What a turn starts from.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Question(&'a str),
    /// SQL written by the caller. It goes through the same validation as
    /// generated SQL and is recorded in the session like a question.
    Sql(&'a str),
}

impl Input<'_> {
    fn text(&self) -> &str {
        match self {
            Input::Question(text) | Input::Sql(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AskOptions {
    /// Also fetch the statement's query plan.
    pub analyze: bool,
}

type InFlight = HashMap<SessionId, CancelHandle>;

/// Takes a run out of the in-flight map when it ends, however it ends.
struct Running<'a> {
    in_flight: &'a Mutex<InFlight>,
    session_id: &'a SessionId,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(self.session_id);
    }
}

fn lock(in_flight: &Mutex<InFlight>) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Pipeline {
    sessions: SessionRegistry,
    generator: SqlGenerator,
    validator: Validator,
    executor: Executor,
    schemas: SchemaCache,
    selector: Selector,
    metrics: Metrics,
    fingerprint: ConnectionFingerprint,
    schema_name: Option<String>,
    query_timeout: Duration,
    in_flight: Mutex<InFlight>,
}

impl Pipeline {
    pub fn new(
        configuration: &Configuration,
        driver: Arc<dyn Driver>,
        completion: Arc<dyn CompletionBackend>,
        metrics: Metrics,
    ) -> Self {
        Pipeline {
            sessions: SessionRegistry::new(
                configuration.context.window_size,
                configuration.context.idle_timeout(),
            ),
            generator: SqlGenerator::new(
                completion,
                configuration.database_type,
                Duration::from_millis(configuration.completion.timeout_ms),
            ),
            validator: Validator::new(
                configuration.database_type,
                &configuration.execution,
                &configuration.validation,
            ),
            executor: Executor::new(driver, &configuration.execution),
            schemas: SchemaCache::new(),
            selector: Selector::new(configuration.visualization.clone()),
            metrics,
            fingerprint: configuration.fingerprint(),
            schema_name: configuration.schema_name.clone(),
            query_timeout: configuration.execution.query_timeout(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Answer a natural-language question asked in a session.
    pub async fn ask(
        &self,
        session_id: &SessionId,
        question: &str,
        cancel: &CancelHandle,
    ) -> Result<Answer, PipelineError> {
        self.answer(session_id, Input::Question(question), AskOptions::default(), cancel)
            .await
    }

    /// Run SQL written by the caller.
    pub async fn ask_with_sql(
        &self,
        session_id: &SessionId,
        sql: &str,
        cancel: &CancelHandle,
    ) -> Result<Answer, PipelineError> {
        self.answer(session_id, Input::Sql(sql), AskOptions::default(), cancel)
            .await
    }

    /// Run one turn of a session. While it runs, [`Pipeline::cancel`] on the
    /// same session trips `cancel`.
    pub async fn answer(
        &self,
        session_id: &SessionId,
        input: Input<'_>,
        options: AskOptions,
        cancel: &CancelHandle,
    ) -> Result<Answer, PipelineError> {
        let handle = self.sessions.open(session_id).await;
        let mut context = handle.lock().await;
        // registered under the session lock, so at most one run per session
        lock(&self.in_flight).insert(session_id.clone(), cancel.clone());
        let _running = Running {
            in_flight: &self.in_flight,
            session_id,
        };

        let Some(turn) = context.append(input.text()).latest_turn else {
            return Err(PipelineError::Internal(
                "the new turn is missing from the context".to_string(),
            ));
        };

        let mut generated_sql = None;
        let outcome = self
            .run_turn(&context, turn, input, options, cancel, &mut generated_sql)
            .instrument(info_span!("Answer question", session = %session_id, turn = turn.0))
            .await;

        let status = match &outcome {
            Ok(_) => TurnStatus::Answered,
            Err(PipelineError::Rejected(_)) => TurnStatus::Rejected,
            Err(error) if error.is_cancelled() => TurnStatus::Cancelled,
            Err(_) => TurnStatus::Failed,
        };
        context.record_outcome(turn, generated_sql, status);
        self.count(&outcome);
        outcome
    }

    async fn run_turn(
        &self,
        context: &ConversationContext,
        turn: TurnId,
        input: Input<'_>,
        options: AskOptions,
        cancel: &CancelHandle,
        generated_sql: &mut Option<String>,
    ) -> Result<Answer, PipelineError> {
        let schema = self.schema().await?;
        ensure_not_cancelled(cancel)?;

        let draft = match input {
            Input::Question(question) => {
                let generate = self
                    .generator
                    .generate(turn, question, context, &schema)
                    .instrument(info_span!("Generate SQL"));
                // a completion that arrives after a cancel is dropped unread
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    draft = generate => draft?,
                }
            }
            Input::Sql(sql) => DraftSql::new(sql, Some(turn)),
        };
        *generated_sql = Some(draft.sql().to_string());
        ensure_not_cancelled(cancel)?;

        let approved = self.validator.validate(draft, &schema)?;
        ensure_not_cancelled(cancel)?;

        let result = self
            .executor
            .execute(&approved, self.query_timeout, cancel)
            .await?;
        ensure_not_cancelled(cancel)?;

        let analysis = if options.analyze {
            Some(
                self.executor
                    .explain(&approved, self.query_timeout, cancel)
                    .await?,
            )
        } else {
            None
        };

        let chart_candidates =
            info_span!("Select visualization").in_scope(|| self.selector.analyze(&result));

        Ok(Answer {
            turn,
            sql: approved.sql().to_string(),
            result,
            chart_candidates,
            analysis,
        })
    }

    /// Stop the run in progress in a session. Returns `false` when nothing is
    /// running there.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        let Some(cancel) = lock(&self.in_flight).get(session_id).cloned() else {
            return false;
        };
        tracing::info!(session = %session_id, "cancelling the running turn");
        cancel.cancel();
        true
    }

    fn count(&self, outcome: &Result<Answer, PipelineError>) {
        match outcome {
            Ok(_) => self.metrics.query_total.inc(),
            Err(PipelineError::Rejected(_)) => self.metrics.rejected_total.inc(),
            Err(PipelineError::Generation(GenerationError::Timeout(_))) => {
                self.metrics.generation_failure_total.inc();
                self.metrics.timeout_total.inc();
            }
            Err(PipelineError::Generation(_)) => self.metrics.generation_failure_total.inc(),
            Err(PipelineError::Execution(ExecutionError::Timeout(_))) => {
                self.metrics.timeout_total.inc();
            }
            Err(PipelineError::Execution(ExecutionError::Statement(error)))
                if error.kind == DriverErrorKind::Timeout =>
            {
                self.metrics.timeout_total.inc();
            }
            Err(_) => {}
        }
    }

    /// The chart of the requested type for a result.
    pub fn chart(
        &self,
        result: &ExecutionResult,
        chart_type: ChartType,
    ) -> Result<ChartSpec, VisualizationError> {
        self.selector.generate(result, chart_type)
    }

    /// The schema of the configured database, introspected on first use.
    pub async fn schema(&self) -> Result<Arc<SchemaSnapshot>, PipelineError> {
        Ok(self
            .schemas
            .get_or_introspect(&self.executor, self.schema_name.as_deref(), &self.fingerprint)
            .await?)
    }

    /// Introspect again, for when the database schema has changed.
    pub async fn refresh_schema(&self) -> Result<Arc<SchemaSnapshot>, PipelineError> {
        Ok(self
            .schemas
            .refresh(&self.executor, self.schema_name.as_deref(), &self.fingerprint)
            .await?)
    }

    /// Use this snapshot for the configured database instead of introspecting.
    pub async fn use_schema(&self, mut snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        snapshot.fingerprint = self.fingerprint.clone();
        self.schemas.insert(snapshot).await
    }

    pub async fn session(&self, session_id: &SessionId) -> Option<SessionView> {
        let handle = self.sessions.get(session_id).await?;
        let context = handle.lock().await;
        Some(SessionView {
            summary: context.summary(),
            turns: context.history().cloned().collect(),
        })
    }

    /// Record what the user thought of a turn. `None` when the session is
    /// unknown, `Some(false)` when the turn is not there or not finished.
    pub async fn record_feedback(
        &self,
        session_id: &SessionId,
        turn: TurnId,
        helpful: bool,
        comment: Option<String>,
    ) -> Option<bool> {
        let handle = self.sessions.get(session_id).await?;
        let mut context = handle.lock().await;
        Some(context.record_feedback(turn, helpful, comment))
    }

    pub async fn close_session(&self, session_id: &SessionId) -> bool {
        self.sessions.close(session_id).await
    }

    /// Destroy the sessions that have been idle for too long.
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        self.sessions.sweep_idle(now).await
    }

    /// Check that the database answers.
    pub async fn health(&self) -> Result<(), PipelineError> {
        Ok(self.executor.ping().await?)
    }

    pub fn update_pool_metrics(&self) {
        update_pool_metrics(self.executor.driver().as_ref(), &self.metrics);
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

fn ensure_not_cancelled(cancel: &CancelHandle) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}
