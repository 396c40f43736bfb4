//! Run a draft through every validation stage.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use nl_sql_configuration::{AdditionalStatement, ExecutionSettings, ValidationSettings};
use query_engine_metadata::metadata::{DatabaseType, SchemaSnapshot};
use serde::Serialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::draft::{ApprovedSql, DraftSql, StatementKind};
use crate::error::{RejectReason, Rejection};
use crate::identifiers::{unknown_identifiers, References};
use crate::policy;

/// The validation stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Parsing,
    SchemaCheck,
    PolicyCheck,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStage::Parsing => write!(f, "parsing"),
            ValidationStage::SchemaCheck => write!(f, "schema check"),
            ValidationStage::PolicyCheck => write!(f, "policy check"),
        }
    }
}

/// Decides which generated statements may be executed.
#[derive(Debug, Clone)]
pub struct Validator {
    database_type: DatabaseType,
    max_rows: usize,
    timeout: Duration,
    additional_statements: BTreeSet<AdditionalStatement>,
    denied_functions: BTreeSet<String>,
}

impl Validator {
    pub fn new(
        database_type: DatabaseType,
        execution: &ExecutionSettings,
        validation: &ValidationSettings,
    ) -> Self {
        Validator {
            database_type,
            max_rows: execution.max_rows.get(),
            timeout: execution.query_timeout(),
            additional_statements: validation.additional_statements.clone(),
            denied_functions: validation.denied_functions(),
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    /// Validate a draft against a schema snapshot.
    ///
    /// Stages run in order and the first stage to find a problem rejects the
    /// draft with everything it found.
    pub fn validate(
        &self,
        draft: DraftSql,
        schema: &SchemaSnapshot,
    ) -> Result<ApprovedSql, Rejection> {
        let span = tracing::info_span!(
            "validate_sql",
            turn = ?draft.source_turn(),
            dialect = %self.database_type,
        );
        let _enter = span.enter();

        let (mut statement, kind) = self.parse(&draft)?;

        let references = References::collect(&statement);
        let nested = policy::nested_violations(&references);
        if !nested.is_empty() {
            return Err(reject(draft, ValidationStage::Parsing, nested));
        }

        let unknown = unknown_identifiers(&references, schema);
        if !unknown.is_empty() {
            let reasons = unknown
                .into_iter()
                .map(RejectReason::UnknownIdentifier)
                .collect();
            return Err(reject(draft, ValidationStage::SchemaCheck, reasons));
        }

        let denied = policy::denied_functions(&references, &self.denied_functions);
        if !denied.is_empty() {
            return Err(reject(draft, ValidationStage::PolicyCheck, denied));
        }

        // one extra row lets the executor tell a full result from a truncated one
        let limit = u64::try_from(self.max_rows)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let row_limit = policy::inject_limit(&mut statement, limit);
        let sql = statement.to_string();
        tracing::debug!(?kind, ?row_limit, "approved statement");

        Ok(ApprovedSql::new(draft, sql, kind, row_limit, self.timeout))
    }

    fn parse(
        &self,
        draft: &DraftSql,
    ) -> Result<(Statement, StatementKind), Rejection> {
        let statements = match Parser::parse_sql(self.dialect().as_ref(), draft.sql()) {
            Ok(statements) => statements,
            Err(error) => {
                return Err(reject(
                    draft.clone(),
                    ValidationStage::Parsing,
                    vec![RejectReason::SyntaxError(error.to_string())],
                ))
            }
        };

        let mut reasons: Vec<RejectReason> = statements
            .iter()
            .filter_map(|statement| {
                policy::statement_kind(statement, &self.additional_statements).err()
            })
            .collect();
        match statements.len() {
            0 => reasons.push(RejectReason::SyntaxError("empty statement".to_string())),
            1 => {}
            count => reasons.push(RejectReason::MultiStatement(count)),
        }
        if !reasons.is_empty() {
            return Err(reject(draft.clone(), ValidationStage::Parsing, reasons));
        }

        let mut statements = statements.into_iter();
        match statements.next() {
            Some(statement) => {
                let kind = policy::statement_kind(&statement, &self.additional_statements)
                    .map_err(|reason| {
                        reject(draft.clone(), ValidationStage::Parsing, vec![reason])
                    })?;
                Ok((statement, kind))
            }
            None => Err(reject(
                draft.clone(),
                ValidationStage::Parsing,
                vec![RejectReason::SyntaxError("empty statement".to_string())],
            )),
        }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.database_type {
            DatabaseType::Postgresql => Box::new(PostgreSqlDialect {}),
            DatabaseType::Mysql => Box::new(MySqlDialect {}),
        }
    }
}

fn reject(draft: DraftSql, stage: ValidationStage, reasons: Vec<RejectReason>) -> Rejection {
    tracing::info!(%stage, ?reasons, "rejected statement");
    Rejection {
        sql: draft.sql().to_string(),
        source_turn: draft.source_turn(),
        stage,
        reasons,
    }
}
