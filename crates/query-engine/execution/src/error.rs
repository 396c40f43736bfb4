//! Errors raised while talking to the database.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// How a driver failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The connection could not be made or was lost.
    Connection,
    /// The server gave up on the statement because of a statement timeout.
    Timeout,
    /// The statement was cancelled on the server.
    Cancelled,
    Syntax,
    Permission,
    /// Any other failure of the statement itself.
    Statement,
}

impl DriverErrorKind {
    /// Whether the connection that produced the error may be used again.
    pub fn leaves_connection_usable(self) -> bool {
        matches!(
            self,
            DriverErrorKind::Syntax | DriverErrorKind::Permission | DriverErrorKind::Statement
        )
    }
}

/// A failure reported by a database driver. The message is the driver's own
/// and must not be shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        DriverError {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("no connection became available within {0:?}")]
    Exhausted(Duration),
    #[error("unable to open a connection: {0}")]
    Connect(DriverError),
    #[error("the pool is closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("no connection became available within {0:?}")]
    PoolExhausted(Duration),
    #[error("connection failure: {0}")]
    Connection(DriverError),
    #[error("the statement did not finish within {0:?}")]
    Timeout(Duration),
    #[error("the statement was cancelled")]
    Cancelled,
    #[error("the statement failed: {0}")]
    Statement(DriverError),
}

impl From<PoolError> for ExecutionError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::Exhausted(waited) => ExecutionError::PoolExhausted(waited),
            PoolError::Connect(error) => ExecutionError::Connection(error),
            PoolError::Closed => ExecutionError::Connection(DriverError::new(
                DriverErrorKind::Connection,
                "the pool is closed",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaIntrospectionError {
    #[error("not permitted to read the schema: {0}")]
    Permission(DriverError),
    #[error("unable to reach the database: {0}")]
    Connection(DriverError),
    #[error("the introspection query failed: {0}")]
    Statement(DriverError),
    #[error("unexpected introspection result: {0}")]
    UnexpectedResult(String),
}

impl From<ExecutionError> for SchemaIntrospectionError {
    fn from(error: ExecutionError) -> Self {
        match error {
            ExecutionError::Statement(error) if error.kind == DriverErrorKind::Permission => {
                SchemaIntrospectionError::Permission(error)
            }
            ExecutionError::Statement(error) => SchemaIntrospectionError::Statement(error),
            ExecutionError::Connection(error) => SchemaIntrospectionError::Connection(error),
            ExecutionError::PoolExhausted(_)
            | ExecutionError::Timeout(_)
            | ExecutionError::Cancelled => SchemaIntrospectionError::Connection(DriverError::new(
                DriverErrorKind::Connection,
                error.to_string(),
            )),
        }
    }
}
