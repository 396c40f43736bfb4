//! Query plans for approved statements.
//!
//! Postgres plans come from `EXPLAIN ANALYZE`, which runs the statement, so
//! they report real timings. MySQL gets a plain `EXPLAIN`.

use query_engine_metadata::metadata::{DatabaseType, ExecutionResult, Value};

pub fn explain_statement(database_type: DatabaseType, sql: &str) -> String {
    match database_type {
        DatabaseType::Postgresql => format!("EXPLAIN ANALYZE {sql}"),
        DatabaseType::Mysql => format!("EXPLAIN {sql}"),
    }
}

/// The plan as text. Postgres returns one line of the plan per row; MySQL
/// returns one row per table, which we print with its cells separated by `|`.
pub fn render_plan(database_type: DatabaseType, plan: &ExecutionResult) -> String {
    let lines = plan.rows.iter().map(|row| match database_type {
        DatabaseType::Postgresql => row.first().map(cell).unwrap_or_default(),
        DatabaseType::Mysql => row.iter().map(cell).collect::<Vec<_>>().join(" | "),
    });
    lines.collect::<Vec<_>>().join("\n")
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        value => value.to_string(),
    }
}
