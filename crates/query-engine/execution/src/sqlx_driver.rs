//! PostgreSQL and MySQL through sqlx connection pools.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use nl_sql_configuration::PoolSettings;
use query_engine_metadata::metadata::{Column, DatabaseType, ScalarType, Value};
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::pool::{PoolConnection, PoolOptions};
use sqlx::postgres::{PgConnection, PgRow, Postgres};
use sqlx::{Column as _, Connection, Database, Executor, Pool, Row, TypeInfo};

use crate::driver::{Driver, DriverConnection, PoolStatus, RowSink};
use crate::error::{DriverError, DriverErrorKind, PoolError};

enum SqlxPool {
    Postgres(Pool<Postgres>),
    Mysql(Pool<MySql>),
}

/// A connection pool for PostgreSQL or MySQL. The connection string is only
/// held in memory.
pub struct SqlxDriver {
    database_type: DatabaseType,
    pool: SqlxPool,
    connection_uri: String,
}

impl fmt::Debug for SqlxDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlxDriver")
            .field("database_type", &self.database_type)
            .field("pool_status", &self.pool_status())
            .finish_non_exhaustive()
    }
}

impl SqlxDriver {
    /// Set up the pool. No connection is opened before the first statement.
    pub fn new(
        database_type: DatabaseType,
        connection_uri: impl Into<String>,
        schema_name: Option<String>,
        settings: &PoolSettings,
    ) -> Result<Self, DriverError> {
        let connection_uri = connection_uri.into();
        let pool = match database_type {
            DatabaseType::Postgresql => {
                let search_path = schema_name
                    .map(|schema| format!("SET search_path TO {}", quote_identifier(&schema, '"')));
                let pool = pool_options::<Postgres>(settings)
                    .after_connect(move |connection, _metadata| {
                        let search_path = search_path.clone();
                        Box::pin(async move {
                            if let Some(statement) = search_path {
                                connection.execute(statement.as_str()).await?;
                            }
                            Ok(())
                        })
                    })
                    .connect_lazy(&connection_uri)
                    .map_err(postgres_error)?;
                SqlxPool::Postgres(pool)
            }
            DatabaseType::Mysql => SqlxPool::Mysql(
                pool_options::<MySql>(settings)
                    .connect_lazy(&connection_uri)
                    .map_err(mysql_error)?,
            ),
        };
        Ok(SqlxDriver {
            database_type,
            pool,
            connection_uri,
        })
    }
}

/// Create pool options from the configured pool settings.
fn pool_options<DB: Database>(settings: &PoolSettings) -> PoolOptions<DB> {
    PoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.pool_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.connection_lifetime())
}

fn status_of<DB: Database>(pool: &Pool<DB>) -> PoolStatus {
    let size = usize::try_from(pool.size()).unwrap_or(usize::MAX);
    let idle = pool.num_idle();
    let options = pool.options();
    PoolStatus {
        size,
        idle,
        active: size.saturating_sub(idle),
        max_connections: usize::try_from(options.get_max_connections()).unwrap_or(usize::MAX),
        acquire_timeout: options.get_acquire_timeout(),
        idle_timeout: options.get_idle_timeout(),
        max_lifetime: options.get_max_lifetime(),
    }
}

fn pool_error(
    error: sqlx::Error,
    acquire_timeout: Duration,
    classify: fn(sqlx::Error) -> DriverError,
) -> PoolError {
    match error {
        sqlx::Error::PoolTimedOut => {
            tracing::warn!(waited = ?acquire_timeout, "connection pool exhausted");
            PoolError::Exhausted(acquire_timeout)
        }
        sqlx::Error::PoolClosed => PoolError::Closed,
        other => PoolError::Connect(classify(other)),
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, PoolError> {
        match &self.pool {
            SqlxPool::Postgres(pool) => {
                let mut connection = pool.acquire().await.map_err(|error| {
                    pool_error(error, pool.options().get_acquire_timeout(), postgres_error)
                })?;
                let backend_pid = sqlx::query_scalar::<_, i32>("SELECT pg_backend_pid()")
                    .fetch_one(&mut *connection)
                    .await;
                match backend_pid {
                    Ok(backend_pid) => Ok(Box::new(SqlxConnection {
                        connection: Some(connection),
                        session_key: i64::from(backend_pid),
                    })),
                    Err(error) => {
                        drop(connection.detach());
                        Err(PoolError::Connect(postgres_error(error)))
                    }
                }
            }
            SqlxPool::Mysql(pool) => {
                let mut connection = pool.acquire().await.map_err(|error| {
                    pool_error(error, pool.options().get_acquire_timeout(), mysql_error)
                })?;
                let connection_id = sqlx::query_scalar::<_, u64>("SELECT CONNECTION_ID()")
                    .fetch_one(&mut *connection)
                    .await;
                match connection_id {
                    Ok(connection_id) => Ok(Box::new(SqlxConnection {
                        connection: Some(connection),
                        session_key: i64::try_from(connection_id).unwrap_or(i64::MAX),
                    })),
                    Err(error) => {
                        drop(connection.detach());
                        Err(PoolError::Connect(mysql_error(error)))
                    }
                }
            }
        }
    }

    /// Cancels go over a connection of their own, since the pool may be
    /// exhausted by the very statement being cancelled.
    async fn cancel(&self, session_key: i64) -> Result<bool, DriverError> {
        tracing::info!(session_key, "cancelling statement on the server");
        match self.database_type {
            DatabaseType::Postgresql => {
                let mut connection = PgConnection::connect(&self.connection_uri)
                    .await
                    .map_err(postgres_error)?;
                let pid = i32::try_from(session_key).map_err(|_| {
                    DriverError::new(DriverErrorKind::Statement, "backend pid out of range")
                })?;
                let cancelled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
                    .bind(pid)
                    .fetch_one(&mut connection)
                    .await
                    .map_err(postgres_error)?;
                if let Err(error) = connection.close().await {
                    tracing::warn!(%error, "closing the cancel connection failed");
                }
                Ok(cancelled)
            }
            DatabaseType::Mysql => {
                let mut connection = MySqlConnection::connect(&self.connection_uri)
                    .await
                    .map_err(mysql_error)?;
                connection
                    .execute(format!("KILL QUERY {session_key}").as_str())
                    .await
                    .map_err(mysql_error)?;
                if let Err(error) = connection.close().await {
                    tracing::warn!(%error, "closing the cancel connection failed");
                }
                Ok(true)
            }
        }
    }

    fn pool_status(&self) -> PoolStatus {
        match &self.pool {
            SqlxPool::Postgres(pool) => status_of(pool),
            SqlxPool::Mysql(pool) => status_of(pool),
        }
    }
}

/// A connection checked out of a sqlx pool.
struct SqlxConnection<DB: Database> {
    connection: Option<PoolConnection<DB>>,
    session_key: i64,
}

impl<DB: Database> SqlxConnection<DB> {
    fn raw(&mut self) -> Result<&mut DB::Connection, DriverError> {
        self.connection
            .as_deref_mut()
            .ok_or_else(|| DriverError::new(DriverErrorKind::Connection, "connection already closed"))
    }

    fn hand_back(&mut self) {
        // dropping a pool connection returns it to its pool
        drop(self.connection.take());
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            drop(connection.detach());
            tracing::debug!(session_key = self.session_key, "closed connection");
        }
    }
}

impl<DB: Database> Drop for SqlxConnection<DB> {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl DriverConnection for SqlxConnection<Postgres> {
    async fn run(
        &mut self,
        sql: &str,
        timeout_hint: Option<Duration>,
        sink: &mut RowSink,
    ) -> Result<(), DriverError> {
        let connection = self.raw()?;
        (&mut *connection)
            .execute("BEGIN READ ONLY")
            .await
            .map_err(postgres_error)?;

        let result = async {
            if let Some(timeout) = timeout_hint {
                let statement = format!("SET LOCAL statement_timeout = {}", timeout.as_millis());
                (&mut *connection).execute(statement.as_str()).await?;
            }
            {
                let mut rows = sqlx::query(sql).persistent(false).fetch(&mut *connection);
                while let Some(row) = rows.try_next().await? {
                    if !sink.has_columns() {
                        sink.set_columns(columns_of(row.columns()));
                    }
                    if sink.push(decode_postgres_row(&row)).is_break() {
                        break;
                    }
                }
            }
            if !sink.has_columns() {
                let description = (&mut *connection).describe(sql).await?;
                sink.set_columns(columns_of(description.columns()));
            }
            Ok::<(), sqlx::Error>(())
        }
        .await;

        let rollback = (&mut *connection).execute("ROLLBACK").await;
        result.map_err(postgres_error)?;
        rollback.map_err(postgres_error)?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        self.raw()?.ping().await.map_err(postgres_error)
    }

    fn session_key(&self) -> Option<i64> {
        Some(self.session_key)
    }

    fn release(mut self: Box<Self>) {
        self.hand_back();
    }

    fn discard(mut self: Box<Self>) {
        self.close();
    }
}

#[async_trait]
impl DriverConnection for SqlxConnection<MySql> {
    async fn run(
        &mut self,
        sql: &str,
        timeout_hint: Option<Duration>,
        sink: &mut RowSink,
    ) -> Result<(), DriverError> {
        let connection = self.raw()?;
        if let Some(timeout) = timeout_hint {
            let statement = format!("SET SESSION MAX_EXECUTION_TIME = {}", timeout.as_millis());
            (&mut *connection)
                .execute(statement.as_str())
                .await
                .map_err(mysql_error)?;
        }
        (&mut *connection)
            .execute("START TRANSACTION READ ONLY")
            .await
            .map_err(mysql_error)?;

        let result = async {
            {
                let mut rows = sqlx::query(sql).persistent(false).fetch(&mut *connection);
                while let Some(row) = rows.try_next().await? {
                    if !sink.has_columns() {
                        sink.set_columns(columns_of(row.columns()));
                    }
                    if sink.push(decode_mysql_row(&row)).is_break() {
                        break;
                    }
                }
            }
            if !sink.has_columns() {
                let description = (&mut *connection).describe(sql).await?;
                sink.set_columns(columns_of(description.columns()));
            }
            Ok::<(), sqlx::Error>(())
        }
        .await;

        let rollback = (&mut *connection).execute("ROLLBACK").await;
        result.map_err(mysql_error)?;
        rollback.map_err(mysql_error)?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        self.raw()?.ping().await.map_err(mysql_error)
    }

    fn session_key(&self) -> Option<i64> {
        Some(self.session_key)
    }

    fn release(mut self: Box<Self>) {
        self.hand_back();
    }

    fn discard(mut self: Box<Self>) {
        self.close();
    }
}

fn columns_of<C: sqlx::Column>(columns: &[C]) -> Vec<Column> {
    columns
        .iter()
        .map(|column| {
            Column::new(
                column.name(),
                ScalarType::from_database_type(column.type_info().name()),
            )
        })
        .collect()
}

/// Decode one cell of a row by the scalar type of its column. Cells whose
/// declared type has no direct mapping are read as text where possible.
macro_rules! decode_row {
    ($name:ident, $row:ty, $integer:expr) => {
        fn $name(row: &$row) -> Vec<Value> {
            (0..row.len())
                .map(|index| {
                    let scalar_type =
                        ScalarType::from_database_type(row.column(index).type_info().name());
                    let decoded: Result<Option<Value>, sqlx::Error> = match scalar_type {
                        ScalarType::Boolean => row
                            .try_get::<Option<bool>, _>(index)
                            .map(|v| v.map(Value::Bool)),
                        ScalarType::Integer => $integer(row, index).map(|v| v.map(Value::Int)),
                        ScalarType::Float => row
                            .try_get::<Option<f64>, _>(index)
                            .or_else(|_| {
                                row.try_get::<Option<f32>, _>(index)
                                    .map(|v| v.map(f64::from))
                            })
                            .map(|v| v.map(Value::Float)),
                        ScalarType::Decimal => row
                            .try_get::<Option<Decimal>, _>(index)
                            .map(|v| v.map(Value::Decimal)),
                        ScalarType::Text => row
                            .try_get::<Option<String>, _>(index)
                            .map(|v| v.map(Value::Text)),
                        ScalarType::Date => row
                            .try_get::<Option<NaiveDate>, _>(index)
                            .map(|v| v.map(Value::Date)),
                        ScalarType::Time => row
                            .try_get::<Option<NaiveTime>, _>(index)
                            .map(|v| v.map(Value::Time)),
                        ScalarType::Timestamp => row
                            .try_get::<Option<NaiveDateTime>, _>(index)
                            .map(|v| v.map(Value::Timestamp))
                            .or_else(|_| {
                                row.try_get::<Option<DateTime<Utc>>, _>(index)
                                    .map(|v| v.map(Value::TimestampWithTimeZone))
                            }),
                        ScalarType::TimestampWithTimeZone => row
                            .try_get::<Option<DateTime<Utc>>, _>(index)
                            .map(|v| v.map(Value::TimestampWithTimeZone)),
                        ScalarType::Json => row
                            .try_get::<Option<serde_json::Value>, _>(index)
                            .map(|v| v.map(Value::Json)),
                        ScalarType::Uuid => row
                            .try_get::<Option<uuid::Uuid>, _>(index)
                            .map(|v| v.map(|u| Value::Text(u.to_string()))),
                        ScalarType::Binary => row
                            .try_get::<Option<Vec<u8>>, _>(index)
                            .map(|v| v.map(|bytes| Value::Text(hex(&bytes)))),
                        ScalarType::Any => Err(sqlx::Error::ColumnNotFound(String::new())),
                    };
                    decoded
                        .or_else(|_| {
                            row.try_get_unchecked::<Option<String>, _>(index)
                                .map(|v| v.map(Value::Text))
                        })
                        .unwrap_or_else(|error| {
                            tracing::debug!(index, %error, "undecodable value, using null");
                            None
                        })
                        .unwrap_or(Value::Null)
                })
                .collect()
        }
    };
}

decode_row!(decode_postgres_row, PgRow, |row: &PgRow, index: usize| {
    row.try_get::<Option<i64>, _>(index)
        .or_else(|_| row.try_get::<Option<i32>, _>(index).map(|v| v.map(i64::from)))
        .or_else(|_| row.try_get::<Option<i16>, _>(index).map(|v| v.map(i64::from)))
        .or_else(|_| row.try_get::<Option<sqlx::postgres::types::Oid>, _>(index).map(|v| v.map(|oid| i64::from(oid.0))))
});

decode_row!(decode_mysql_row, MySqlRow, |row: &MySqlRow, index: usize| {
    row.try_get::<Option<i64>, _>(index)
        .or_else(|_| {
            row.try_get::<Option<u64>, _>(index)
                .map(|v| v.map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
        })
        .or_else(|_| row.try_get::<Option<i32>, _>(index).map(|v| v.map(i64::from)))
        .or_else(|_| row.try_get::<Option<u32>, _>(index).map(|v| v.map(i64::from)))
        .or_else(|_| row.try_get::<Option<i16>, _>(index).map(|v| v.map(i64::from)))
        .or_else(|_| row.try_get::<Option<u16>, _>(index).map(|v| v.map(i64::from)))
        .or_else(|_| row.try_get::<Option<i8>, _>(index).map(|v| v.map(i64::from)))
        .or_else(|_| row.try_get::<Option<u8>, _>(index).map(|v| v.map(i64::from)))
});

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::from("\\x"), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn quote_identifier(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}

/// Classify a PostgreSQL failure by its SQLSTATE.
fn postgres_error(error: sqlx::Error) -> DriverError {
    let kind = match &error {
        sqlx::Error::Database(database_error) => {
            let code = database_error.code().unwrap_or_default();
            match code.as_ref() {
                "57014" if database_error.message().contains("timeout") => {
                    DriverErrorKind::Timeout
                }
                "57014" => DriverErrorKind::Cancelled,
                "42501" | "25006" => DriverErrorKind::Permission,
                "28000" | "28P01" => DriverErrorKind::Connection,
                code if code.starts_with("42") => DriverErrorKind::Syntax,
                code if code.starts_with("08")
                    || code.starts_with("53")
                    || code.starts_with("57P") =>
                {
                    DriverErrorKind::Connection
                }
                _ => DriverErrorKind::Statement,
            }
        }
        other => non_database_error_kind(other),
    };
    DriverError::new(kind, error.to_string())
}

/// Classify a MySQL failure by its error number.
fn mysql_error(error: sqlx::Error) -> DriverError {
    let kind = match &error {
        sqlx::Error::Database(database_error) => {
            match database_error
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number)
            {
                Some(1064 | 1054 | 1146 | 1049 | 1052) => DriverErrorKind::Syntax,
                Some(1044 | 1142 | 1143 | 1227 | 1792) => DriverErrorKind::Permission,
                Some(1045 | 1040 | 1203 | 2002 | 2003 | 2006 | 2013) => {
                    DriverErrorKind::Connection
                }
                Some(3024) => DriverErrorKind::Timeout,
                Some(1317) => DriverErrorKind::Cancelled,
                _ => DriverErrorKind::Statement,
            }
        }
        other => non_database_error_kind(other),
    };
    DriverError::new(kind, error.to_string())
}

fn non_database_error_kind(error: &sqlx::Error) -> DriverErrorKind {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DriverErrorKind::Connection,
        _ => DriverErrorKind::Statement,
    }
}
