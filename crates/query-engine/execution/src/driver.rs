//! The interface to a database.
//!
//! A driver owns a bounded pool of connections to one database. Connections
//! borrowed from it go back through [`DriverConnection::release`]; any other
//! way of letting go of one closes it.

use std::ops::ControlFlow;
use std::time::Duration;

use async_trait::async_trait;
use query_engine_metadata::metadata::{Column, DatabaseType, ExecutionResult, Value};

use crate::error::{DriverError, PoolError};

/// A snapshot of a pool's occupancy and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// open connections, idle or not
    pub size: usize,
    pub idle: usize,
    pub active: usize,
    pub max_connections: usize,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

/// Pooled access to one database.
#[async_trait]
pub trait Driver: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    /// Borrow a connection, waiting at most the pool's acquire timeout.
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, PoolError>;

    /// Ask the server to stop whatever statement the session identified by
    /// `session_key` is running. Returns `false` if the driver cannot do that.
    async fn cancel(&self, session_key: i64) -> Result<bool, DriverError>;

    fn pool_status(&self) -> PoolStatus;
}

/// A connection borrowed from a driver's pool.
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a read-only statement, feeding the columns and rows to `sink` until
    /// it asks to stop. `timeout_hint` is passed on to the server where the
    /// dialect allows it.
    async fn run(
        &mut self,
        sql: &str,
        timeout_hint: Option<Duration>,
        sink: &mut RowSink,
    ) -> Result<(), DriverError>;

    async fn ping(&mut self) -> Result<(), DriverError>;

    /// The server-side identifier of this session, used for cancellation.
    fn session_key(&self) -> Option<i64>;

    /// Give the connection back to the pool for reuse.
    fn release(self: Box<Self>);

    /// Close the connection instead of returning it to the pool.
    fn discard(self: Box<Self>);
}

/// Collects rows up to the row cap.
#[derive(Debug)]
pub struct RowSink {
    max_rows: usize,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    truncated: bool,
}

impl RowSink {
    pub fn new(max_rows: usize) -> Self {
        RowSink {
            max_rows,
            columns: Vec::new(),
            rows: Vec::new(),
            truncated: false,
        }
    }

    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.columns = columns;
    }

    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Add a row. Once the cap is reached the row is dropped, the result is
    /// marked truncated and the caller is told to stop reading.
    pub fn push(&mut self, row: Vec<Value>) -> ControlFlow<()> {
        if self.rows.len() >= self.max_rows {
            self.truncated = true;
            return ControlFlow::Break(());
        }
        self.rows.push(row);
        ControlFlow::Continue(())
    }

    pub fn into_result(self, execution_time: Duration) -> ExecutionResult {
        let mut result = ExecutionResult::new(self.columns, self.rows);
        result.execution_time = execution_time;
        result.truncated = self.truncated;
        result
    }
}
