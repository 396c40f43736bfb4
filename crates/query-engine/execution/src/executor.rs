//! Run approved statements under the wall-clock timeout and the row cap.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nl_sql_configuration::ExecutionSettings;
use query_engine_metadata::metadata::{DatabaseType, ExecutionResult};
use query_engine_validation::ApprovedSql;
use tokio::time::Instant;
use tracing::{info_span, Instrument};

use crate::cancel::CancelHandle;
use crate::driver::{Driver, DriverConnection, PoolStatus, RowSink};
use crate::error::{DriverError, DriverErrorKind, ExecutionError};
use crate::explain::{explain_statement, render_plan};

/// How long a server-side cancel may take before we give up on it and just
/// drop the connection.
const SERVER_CANCEL_TIMEOUT: Duration = Duration::from_secs(2);

enum Outcome {
    Finished(Result<(), DriverError>),
    TimedOut,
    Cancelled,
}

#[derive(Clone)]
pub struct Executor {
    driver: Arc<dyn Driver>,
    max_rows: usize,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("database_type", &self.database_type())
            .field("max_rows", &self.max_rows)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(driver: Arc<dyn Driver>, settings: &ExecutionSettings) -> Self {
        Executor {
            driver,
            max_rows: settings.max_rows.get(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.driver.pool_status()
    }

    pub fn database_type(&self) -> DatabaseType {
        self.driver.database_type()
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Execute an approved statement on a connection from the pool.
    pub async fn execute(
        &self,
        approved: &ApprovedSql,
        timeout: Duration,
        cancel: &CancelHandle,
    ) -> Result<ExecutionResult, ExecutionError> {
        async {
            tracing::info!(sql = approved.sql(), "executing statement");
            let connection = self.driver.acquire().await?;
            self.execute_on(connection, approved, timeout, cancel).await
        }
        .instrument(info_span!(
            "Execute query",
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        ))
        .await
    }

    /// Execute an approved statement on a connection the caller has already
    /// acquired. The connection goes back to the pool or is closed, depending
    /// on how the statement ended.
    pub async fn execute_on(
        &self,
        connection: Box<dyn DriverConnection>,
        approved: &ApprovedSql,
        timeout: Duration,
        cancel: &CancelHandle,
    ) -> Result<ExecutionResult, ExecutionError> {
        let hint = timeout.min(approved.timeout_hint());
        self.run_on(connection, approved.sql(), Some(hint), timeout, self.max_rows, cancel)
            .await
    }

    /// The plan of an approved statement, under the same read-only
    /// transaction, timeout and cancellation as the statement itself. On
    /// Postgres the statement runs again to measure it.
    pub async fn explain(
        &self,
        approved: &ApprovedSql,
        timeout: Duration,
        cancel: &CancelHandle,
    ) -> Result<String, ExecutionError> {
        let database_type = self.database_type();
        let sql = explain_statement(database_type, approved.sql());
        async {
            let connection = self.driver.acquire().await?;
            let hint = timeout.min(approved.timeout_hint());
            let plan = self
                .run_on(connection, &sql, Some(hint), timeout, usize::MAX, cancel)
                .await?;
            Ok(render_plan(database_type, &plan))
        }
        .instrument(info_span!("Explain query"))
        .await
    }

    /// Run one of our own read-only statements, such as the introspection
    /// queries. These never come from users and are not validated.
    pub(crate) async fn run_internal(
        &self,
        sql: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        let connection = self.driver.acquire().await?;
        self.run_on(
            connection,
            sql,
            Some(timeout),
            timeout,
            usize::MAX,
            &CancelHandle::new(),
        )
        .await
    }

    /// Check that a connection can be made and answers.
    pub async fn ping(&self) -> Result<(), ExecutionError> {
        let mut connection = self.driver.acquire().await?;
        match connection.ping().await {
            Ok(()) => {
                connection.release();
                Ok(())
            }
            Err(error) => {
                connection.discard();
                Err(ExecutionError::Connection(error))
            }
        }
    }

    async fn run_on(
        &self,
        mut connection: Box<dyn DriverConnection>,
        sql: &str,
        timeout_hint: Option<Duration>,
        timeout: Duration,
        max_rows: usize,
        cancel: &CancelHandle,
    ) -> Result<ExecutionResult, ExecutionError> {
        if cancel.is_cancelled() {
            connection.release();
            return Err(ExecutionError::Cancelled);
        }

        let session_key = connection.session_key();
        let started = Instant::now();
        let mut sink = RowSink::new(max_rows);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Outcome::Cancelled,
            finished = tokio::time::timeout(timeout, connection.run(sql, timeout_hint, &mut sink)) => {
                match finished {
                    Ok(result) => Outcome::Finished(result),
                    Err(_elapsed) => Outcome::TimedOut,
                }
            }
        };

        match outcome {
            Outcome::Finished(Ok(())) => {
                connection.release();
                let result = sink.into_result(started.elapsed());
                tracing::info!(
                    ?session_key,
                    row_count = result.row_count,
                    truncated = result.truncated,
                    elapsed = ?result.execution_time,
                    "statement finished"
                );
                Ok(result)
            }
            Outcome::Finished(Err(error)) if error.kind.leaves_connection_usable() => {
                tracing::info!(?session_key, %error, "statement failed");
                connection.release();
                Err(ExecutionError::Statement(error))
            }
            Outcome::Finished(Err(error)) => {
                tracing::warn!(?session_key, %error, "statement failed, closing connection");
                connection.discard();
                Err(match error.kind {
                    DriverErrorKind::Timeout => ExecutionError::Timeout(timeout),
                    DriverErrorKind::Cancelled => ExecutionError::Cancelled,
                    _ => ExecutionError::Connection(error),
                })
            }
            Outcome::TimedOut => {
                tracing::warn!(?session_key, ?timeout, "statement timed out");
                self.cancel_on_server(session_key).await;
                connection.discard();
                Err(ExecutionError::Timeout(timeout))
            }
            Outcome::Cancelled => {
                tracing::info!(?session_key, "statement cancelled by the caller");
                self.cancel_on_server(session_key).await;
                connection.discard();
                Err(ExecutionError::Cancelled)
            }
        }
    }

    async fn cancel_on_server(&self, session_key: Option<i64>) {
        let Some(session_key) = session_key else {
            return;
        };
        match tokio::time::timeout(
            SERVER_CANCEL_TIMEOUT,
            self.driver.cancel(session_key),
        )
        .await
        {
            Ok(Ok(true)) => tracing::debug!(session_key, "server cancel requested"),
            Ok(Ok(false)) => tracing::debug!(session_key, "driver cannot cancel on the server"),
            Ok(Err(error)) => tracing::warn!(session_key, %error, "server cancel failed"),
            Err(_elapsed) => tracing::warn!(session_key, "server cancel timed out"),
        }
    }
}
