//! Build a [`SchemaSnapshot`] from the database catalog, and cache snapshots
//! per connection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use query_engine_metadata::metadata::{
    ColumnInfo, ConnectionFingerprint, DatabaseType, ExecutionResult, ForeignRelation,
    ForeignRelations, Nullable, ScalarType, SchemaSnapshot, TableInfo, TablesInfo, Value,
};
use tokio::sync::RwLock;
use tracing::{info_span, Instrument};

use crate::error::SchemaIntrospectionError;
use crate::executor::Executor;

const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Read the tables, columns and foreign keys of one schema.
///
/// Without a schema name, PostgreSQL uses `public` and MySQL uses the
/// database named in the connection string.
pub async fn introspect(
    executor: &Executor,
    schema_name: Option<&str>,
    fingerprint: ConnectionFingerprint,
) -> Result<SchemaSnapshot, SchemaIntrospectionError> {
    let database_type = executor.database_type();
    async {
        let queries = IntrospectionQueries::new(database_type, schema_name);

        let columns = executor
            .run_internal(&queries.columns, INTROSPECTION_TIMEOUT)
            .await?;
        let foreign_keys = executor
            .run_internal(&queries.foreign_keys, INTROSPECTION_TIMEOUT)
            .await?;

        let mut tables = tables_from_columns(&columns, &queries.schema_label)?;
        add_foreign_keys(&mut tables, &foreign_keys)?;

        let TablesInfo(by_name) = &tables;
        tracing::info!(tables = by_name.len(), "introspected schema");
        Ok::<_, SchemaIntrospectionError>(SchemaSnapshot::new(
            fingerprint,
            database_type,
            tables,
        ))
    }
    .instrument(info_span!("Introspect schema", %database_type))
    .await
    .map_err(|error| {
        tracing::error!(%error, "schema introspection failed");
        error
    })
}

struct IntrospectionQueries {
    schema_label: String,
    columns: String,
    foreign_keys: String,
}

impl IntrospectionQueries {
    fn new(database_type: DatabaseType, schema_name: Option<&str>) -> Self {
        match database_type {
            DatabaseType::Postgresql => {
                let schema = schema_name.unwrap_or("public");
                let literal = string_literal(schema, database_type);
                IntrospectionQueries {
                    schema_label: schema.to_string(),
                    // udt_name gives the short type name (int4, varchar, ...),
                    // data_type would say ARRAY or USER-DEFINED
                    columns: format!(
                        "SELECT c.table_name, c.column_name, c.udt_name, c.is_nullable \
                         FROM information_schema.columns AS c \
                         WHERE c.table_schema = {literal} \
                         ORDER BY c.table_name, c.ordinal_position"
                    ),
                    // one row per column pair; the referenced column is found
                    // through the unique constraint the foreign key points at
                    foreign_keys: format!(
                        "SELECT kcu.constraint_name, kcu.table_name, kcu.column_name, \
                                pk.table_name AS foreign_table_name, \
                                pk.column_name AS foreign_column_name \
                         FROM information_schema.referential_constraints AS rc \
                         JOIN information_schema.key_column_usage AS kcu \
                           ON kcu.constraint_schema = rc.constraint_schema \
                          AND kcu.constraint_name = rc.constraint_name \
                         JOIN information_schema.key_column_usage AS pk \
                           ON pk.constraint_schema = rc.unique_constraint_schema \
                          AND pk.constraint_name = rc.unique_constraint_name \
                          AND pk.ordinal_position = kcu.position_in_unique_constraint \
                         WHERE rc.constraint_schema = {literal} \
                         ORDER BY kcu.table_name, kcu.constraint_name, kcu.ordinal_position"
                    ),
                }
            }
            DatabaseType::Mysql => {
                let schema = schema_name.map_or_else(
                    || "DATABASE()".to_string(),
                    |name| string_literal(name, database_type),
                );
                IntrospectionQueries {
                    schema_label: schema_name.unwrap_or_default().to_string(),
                    // information_schema column names are upper case in MySQL 8
                    columns: format!(
                        "SELECT c.TABLE_NAME AS table_name, c.COLUMN_NAME AS column_name, \
                                c.DATA_TYPE AS data_type, c.IS_NULLABLE AS is_nullable \
                         FROM information_schema.COLUMNS AS c \
                         WHERE c.TABLE_SCHEMA = {schema} \
                         ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION"
                    ),
                    foreign_keys: format!(
                        "SELECT k.CONSTRAINT_NAME AS constraint_name, k.TABLE_NAME AS table_name, \
                                k.COLUMN_NAME AS column_name, \
                                k.REFERENCED_TABLE_NAME AS foreign_table_name, \
                                k.REFERENCED_COLUMN_NAME AS foreign_column_name \
                         FROM information_schema.KEY_COLUMN_USAGE AS k \
                         WHERE k.TABLE_SCHEMA = {schema} \
                           AND k.REFERENCED_TABLE_NAME IS NOT NULL \
                         ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION"
                    ),
                }
            }
        }
    }
}

fn string_literal(value: &str, database_type: DatabaseType) -> String {
    let mut escaped = value.replace('\'', "''");
    if database_type == DatabaseType::Mysql {
        escaped = escaped.replace('\\', "\\\\");
    }
    format!("'{escaped}'")
}

fn text_cell<'a>(
    row: &'a [Value],
    index: usize,
    what: &str,
) -> Result<&'a str, SchemaIntrospectionError> {
    row.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaIntrospectionError::UnexpectedResult(format!("missing {what}")))
}

fn tables_from_columns(
    result: &ExecutionResult,
    schema_name: &str,
) -> Result<TablesInfo, SchemaIntrospectionError> {
    let mut tables = BTreeMap::new();
    for row in &result.rows {
        let table_name = text_cell(row, 0, "table name")?;
        let column_name = text_cell(row, 1, "column name")?;
        let data_type = text_cell(row, 2, "data type")?;
        let nullable = match row.get(3).and_then(Value::as_str) {
            Some(flag) if flag.eq_ignore_ascii_case("no") => Nullable::NonNullable,
            _ => Nullable::Nullable,
        };

        let table = tables
            .entry(table_name.to_string())
            .or_insert_with(|| TableInfo {
                schema_name: schema_name.to_string(),
                table_name: table_name.to_string(),
                columns: BTreeMap::new(),
                foreign_relations: ForeignRelations::default(),
            });
        table.columns.insert(
            column_name.to_string(),
            ColumnInfo {
                name: column_name.to_string(),
                r#type: ScalarType::from_database_type(data_type),
                nullable,
            },
        );
    }
    Ok(TablesInfo(tables))
}

fn add_foreign_keys(
    tables: &mut TablesInfo,
    result: &ExecutionResult,
) -> Result<(), SchemaIntrospectionError> {
    let TablesInfo(tables) = tables;
    for row in &result.rows {
        let constraint_name = text_cell(row, 0, "constraint name")?;
        let table_name = text_cell(row, 1, "table name")?;
        let column_name = text_cell(row, 2, "column name")?;
        let foreign_table = text_cell(row, 3, "referenced table")?;
        let foreign_column = text_cell(row, 4, "referenced column")?;

        // constraints on tables we could not see the columns of are skipped
        let Some(table) = tables.get_mut(table_name) else {
            continue;
        };
        let ForeignRelations(relations) = &mut table.foreign_relations;
        relations
            .entry(constraint_name.to_string())
            .or_insert_with(|| ForeignRelation {
                foreign_table: foreign_table.to_string(),
                column_mapping: BTreeMap::new(),
            })
            .column_mapping
            .insert(column_name.to_string(), foreign_column.to_string());
    }
    Ok(())
}

/// Schema snapshots by connection fingerprint.
///
/// Lookups share a read lock. Building a snapshot holds the write lock, so
/// concurrent refreshes of the same connection introspect once.
#[derive(Debug, Default)]
pub struct SchemaCache {
    snapshots: RwLock<HashMap<ConnectionFingerprint, Arc<SchemaSnapshot>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        SchemaCache::default()
    }

    pub async fn get(&self, fingerprint: &ConnectionFingerprint) -> Option<Arc<SchemaSnapshot>> {
        self.snapshots.read().await.get(fingerprint).cloned()
    }

    /// The cached snapshot for this connection, introspecting on first use.
    pub async fn get_or_introspect(
        &self,
        executor: &Executor,
        schema_name: Option<&str>,
        fingerprint: &ConnectionFingerprint,
    ) -> Result<Arc<SchemaSnapshot>, SchemaIntrospectionError> {
        if let Some(snapshot) = self.get(fingerprint).await {
            return Ok(snapshot);
        }
        let mut snapshots = self.snapshots.write().await;
        // somebody else may have built it while we waited for the lock
        if let Some(snapshot) = snapshots.get(fingerprint) {
            return Ok(snapshot.clone());
        }
        let snapshot = Arc::new(introspect(executor, schema_name, fingerprint.clone()).await?);
        snapshots.insert(fingerprint.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Drop the cached snapshot and build a new one. The old snapshot stays in
    /// place if introspection fails.
    pub async fn refresh(
        &self,
        executor: &Executor,
        schema_name: Option<&str>,
        fingerprint: &ConnectionFingerprint,
    ) -> Result<Arc<SchemaSnapshot>, SchemaIntrospectionError> {
        let mut snapshots = self.snapshots.write().await;
        let snapshot = Arc::new(introspect(executor, schema_name, fingerprint.clone()).await?);
        snapshots.insert(fingerprint.clone(), snapshot.clone());
        tracing::info!(%fingerprint, "schema snapshot refreshed");
        Ok(snapshot)
    }

    /// Cache a snapshot built elsewhere, replacing any snapshot of the same
    /// connection.
    pub async fn insert(&self, snapshot: SchemaSnapshot) -> Arc<SchemaSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshots
            .write()
            .await
            .insert(snapshot.fingerprint.clone(), snapshot.clone());
        snapshot
    }

    /// Forget a snapshot. Returns whether one was cached.
    pub async fn invalidate(&self, fingerprint: &ConnectionFingerprint) -> bool {
        self.snapshots.write().await.remove(fingerprint).is_some()
    }
}
