//! Statement-type gate and the policies applied to approved statements.

use std::collections::BTreeSet;

use nl_sql_configuration::AdditionalStatement;
use sqlparser::ast::{Expr, Statement, Value};

use crate::draft::StatementKind;
use crate::error::RejectReason;
use crate::identifiers::{statement_keyword, References};

/// Decide whether a statement is of a kind we may run.
pub(crate) fn statement_kind(
    statement: &Statement,
    additional: &BTreeSet<AdditionalStatement>,
) -> Result<StatementKind, RejectReason> {
    match statement {
        Statement::Query(_) => Ok(StatementKind::Select),
        Statement::Explain {
            analyze, statement, ..
        } if additional.contains(&AdditionalStatement::Explain) => {
            if *analyze {
                Err(RejectReason::DisallowedStatementType(
                    "EXPLAIN ANALYZE".to_string(),
                ))
            } else if matches!(**statement, Statement::Query(_)) {
                Ok(StatementKind::Explain)
            } else {
                Err(RejectReason::DisallowedStatementType(format!(
                    "EXPLAIN {}",
                    statement_keyword(statement)
                )))
            }
        }
        Statement::ShowTables { .. } | Statement::ShowColumns { .. }
            if additional.contains(&AdditionalStatement::Show) =>
        {
            Ok(StatementKind::Show)
        }
        other => Err(RejectReason::DisallowedStatementType(statement_keyword(
            other,
        ))),
    }
}

/// Read-only constructs hidden inside an otherwise allowed statement.
pub(crate) fn nested_violations(references: &References) -> Vec<RejectReason> {
    let mut reasons: Vec<RejectReason> = references
        .nested_statements
        .iter()
        .map(|keyword| RejectReason::DisallowedStatementType(keyword.clone()))
        .collect();
    if references.select_into {
        reasons.push(RejectReason::DisallowedStatementType(
            "SELECT INTO".to_string(),
        ));
    }
    if references.locking {
        reasons.push(RejectReason::DisallowedStatementType(
            "SELECT FOR UPDATE/SHARE".to_string(),
        ));
    }
    reasons
}

pub(crate) fn denied_functions(
    references: &References,
    denied: &BTreeSet<String>,
) -> Vec<RejectReason> {
    let used: BTreeSet<&String> = references
        .functions
        .iter()
        .filter(|function| denied.contains(*function))
        .collect();
    used.into_iter()
        .map(|function| RejectReason::DisallowedFunction(function.clone()))
        .collect()
}

/// Add `LIMIT limit` to a query that has no row limit of its own. Returns the
/// limit if one was added.
pub(crate) fn inject_limit(statement: &mut Statement, limit: u64) -> Option<u64> {
    match statement {
        Statement::Query(query) if query.limit.is_none() && query.fetch.is_none() => {
            query.limit = Some(Expr::Value(Value::Number(limit.to_string(), false)));
            Some(limit)
        }
        _ => None,
    }
}
