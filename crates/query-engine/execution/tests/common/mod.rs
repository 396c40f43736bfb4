//! Common functions used across test cases.
#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::Arc;

use nl_sql_configuration::{ExecutionSettings, ValidationSettings};
use query_engine_execution::Executor;
use query_engine_metadata::metadata::{Column, DatabaseType, ScalarType, Value};
use query_engine_validation::{ApprovedSql, DraftSql, Validator};
use tests_common::driver::MemoryDriver;
use tests_common::schema::rental_schema;

pub fn execution_settings(max_rows: usize) -> ExecutionSettings {
    ExecutionSettings {
        query_timeout_ms: 5000,
        max_rows: NonZeroUsize::new(max_rows).unwrap(),
    }
}

/// Put a statement through the validator, as the pipeline does.
pub fn approve(sql: &str, max_rows: usize) -> ApprovedSql {
    Validator::new(
        DatabaseType::Postgresql,
        &execution_settings(max_rows),
        &ValidationSettings::default(),
    )
    .validate(
        DraftSql::new(sql, None),
        &rental_schema(DatabaseType::Postgresql),
    )
    .unwrap()
}

pub fn executor(driver: &MemoryDriver, max_rows: usize) -> Executor {
    Executor::new(Arc::new(driver.clone()), &execution_settings(max_rows))
}

/// A single `rental_id` column holding 1..=count.
pub fn rental_ids(count: i64) -> (Vec<Column>, Vec<Vec<Value>>) {
    (
        vec![Column::new("rental_id", ScalarType::Integer)],
        (1..=count).map(|id| vec![Value::Int(id)]).collect(),
    )
}
