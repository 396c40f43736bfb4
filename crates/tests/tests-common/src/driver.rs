//! An in-memory database driver with scripted result sets.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use query_engine_execution::{
    Driver, DriverConnection, DriverError, DriverErrorKind, PoolError, PoolStatus, RowSink,
};
use query_engine_metadata::metadata::{Column, DatabaseType, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
enum Response {
    Rows {
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    },
    Fail(DriverError),
}

#[derive(Debug)]
struct State {
    default: Response,
    responses: Vec<(String, Response)>,
    latency: Duration,
    failing_connects: usize,
    connects: usize,
    open: usize,
    idle: Vec<i64>,
    next_session_key: i64,
    executed: Vec<String>,
    cancels: Vec<i64>,
}

/// Answers every statement from a script. Statements containing a registered
/// fragment get that fragment's answer, anything else gets the default.
///
/// Connections come from a pool of two by default, with a one second
/// acquire timeout.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    database_type: DatabaseType,
    supports_cancel: bool,
    max_connections: usize,
    acquire_timeout: Duration,
    slots: Arc<Semaphore>,
    state: Arc<Mutex<State>>,
}

impl MemoryDriver {
    pub fn new(database_type: DatabaseType) -> Self {
        MemoryDriver {
            database_type,
            supports_cancel: true,
            max_connections: 2,
            acquire_timeout: Duration::from_secs(1),
            slots: Arc::new(Semaphore::new(2)),
            state: Arc::new(Mutex::new(State {
                default: Response::Rows {
                    columns: Vec::new(),
                    rows: Vec::new(),
                },
                responses: Vec::new(),
                latency: Duration::ZERO,
                failing_connects: 0,
                connects: 0,
                open: 0,
                idle: Vec::new(),
                next_session_key: 100,
                executed: Vec::new(),
                cancels: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The result every statement gets unless a fragment matches.
    #[must_use]
    pub fn returning(self, columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        self.state().default = Response::Rows { columns, rows };
        self
    }

    #[must_use]
    pub fn failing_with(self, error: DriverError) -> Self {
        self.state().default = Response::Fail(error);
        self
    }

    /// Statements containing `fragment` get this result.
    #[must_use]
    pub fn respond_to(
        self,
        fragment: impl Into<String>,
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.state()
            .responses
            .push((fragment.into(), Response::Rows { columns, rows }));
        self
    }

    /// Statements containing `fragment` fail with this error.
    #[must_use]
    pub fn fail_on(self, fragment: impl Into<String>, error: DriverError) -> Self {
        self.state()
            .responses
            .push((fragment.into(), Response::Fail(error)));
        self
    }

    /// Every statement takes this long before producing rows.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = latency;
        self
    }

    /// The next `count` connection attempts fail with a connection error.
    #[must_use]
    pub fn with_failing_connects(self, count: usize) -> Self {
        self.state().failing_connects = count;
        self
    }

    /// Pool limits. Call this before cloning the driver.
    #[must_use]
    pub fn with_pool(mut self, max_connections: usize, acquire_timeout: Duration) -> Self {
        self.max_connections = max_connections;
        self.acquire_timeout = acquire_timeout;
        self.slots = Arc::new(Semaphore::new(max_connections));
        self
    }

    #[must_use]
    pub fn without_server_cancel(mut self) -> Self {
        self.supports_cancel = false;
        self
    }

    /// Connection attempts so far, failed ones included.
    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Session keys of the server cancels requested so far.
    pub fn cancels(&self) -> Vec<i64> {
        self.state().cancels.clone()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, PoolError> {
        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        {
            Err(_elapsed) => return Err(PoolError::Exhausted(self.acquire_timeout)),
            Ok(Err(_closed)) => return Err(PoolError::Closed),
            Ok(Ok(permit)) => permit,
        };

        let mut state = self.state();
        let session_key = match state.idle.pop() {
            Some(session_key) => session_key,
            None => {
                state.connects += 1;
                if state.failing_connects > 0 {
                    state.failing_connects -= 1;
                    return Err(PoolError::Connect(DriverError::new(
                        DriverErrorKind::Connection,
                        "connection refused",
                    )));
                }
                state.open += 1;
                let session_key = state.next_session_key;
                state.next_session_key += 1;
                session_key
            }
        };
        Ok(Box::new(MemoryConnection {
            session_key,
            state: self.state.clone(),
            permit: Some(permit),
        }))
    }

    async fn cancel(&self, session_key: i64) -> Result<bool, DriverError> {
        if !self.supports_cancel {
            return Ok(false);
        }
        self.state().cancels.push(session_key);
        Ok(true)
    }

    fn pool_status(&self) -> PoolStatus {
        let state = self.state();
        PoolStatus {
            size: state.open,
            idle: state.idle.len(),
            active: state.open - state.idle.len(),
            max_connections: self.max_connections,
            acquire_timeout: self.acquire_timeout,
            idle_timeout: None,
            max_lifetime: None,
        }
    }
}

struct MemoryConnection {
    session_key: i64,
    state: Arc<Mutex<State>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl MemoryConnection {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.state().open -= 1;
            drop(permit);
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn run(
        &mut self,
        sql: &str,
        _timeout_hint: Option<Duration>,
        sink: &mut RowSink,
    ) -> Result<(), DriverError> {
        let (latency, response) = {
            let mut state = self.state();
            state.executed.push(sql.to_string());
            let response = state
                .responses
                .iter()
                .find(|(fragment, _)| sql.contains(fragment.as_str()))
                .map_or_else(|| state.default.clone(), |(_, response)| response.clone());
            (state.latency, response)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match response {
            Response::Fail(error) => Err(error),
            Response::Rows { columns, rows } => {
                sink.set_columns(columns);
                for row in rows {
                    if let ControlFlow::Break(()) = sink.push(row) {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn session_key(&self) -> Option<i64> {
        Some(self.session_key)
    }

    fn release(mut self: Box<Self>) {
        if let Some(permit) = self.permit.take() {
            let session_key = self.session_key;
            self.state().idle.push(session_key);
            drop(permit);
        }
    }

    fn discard(mut self: Box<Self>) {
        self.close();
    }
}
