use nl_sql_configuration::{AdditionalStatement, ExecutionSettings, ValidationSettings};
use query_engine_metadata::metadata::DatabaseType;
use query_engine_validation::{ApprovedSql, DraftSql, Rejection, Validator};

pub fn validator(database_type: DatabaseType) -> Validator {
    Validator::new(
        database_type,
        &ExecutionSettings::default(),
        &ValidationSettings::default(),
    )
}

pub fn validator_allowing(additional: &[AdditionalStatement]) -> Validator {
    Validator::new(
        DatabaseType::Postgresql,
        &ExecutionSettings::default(),
        &ValidationSettings {
            additional_statements: additional.iter().copied().collect(),
            denied_functions: None,
        },
    )
}

/// Validate a statement against the rental schema with a PostgreSQL validator.
pub fn validate(sql: &str) -> Result<ApprovedSql, Rejection> {
    validator(DatabaseType::Postgresql).validate(
        DraftSql::new(sql, None),
        &tests_common::schema::rental_schema(DatabaseType::Postgresql),
    )
}
