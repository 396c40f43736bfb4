//! Why a statement was not approved.

use std::fmt;

use query_engine_context::TurnId;
use serde::Serialize;
use thiserror::Error;

use crate::draft::ValidationStatus;
use crate::validator::ValidationStage;

/// A single reason for rejecting a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    SyntaxError(String),
    /// The statement, or a statement nested in it, is not a plain read.
    DisallowedStatementType(String),
    UnknownIdentifier(String),
    /// The draft contained this many statements.
    MultiStatement(usize),
    DisallowedFunction(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SyntaxError(message) => write!(f, "syntax error: {message}"),
            RejectReason::DisallowedStatementType(kind) => {
                write!(f, "statement type not allowed: {kind}")
            }
            RejectReason::UnknownIdentifier(identifier) => {
                write!(f, "unknown identifier: {identifier}")
            }
            RejectReason::MultiStatement(count) => {
                write!(f, "expected a single statement, found {count}")
            }
            RejectReason::DisallowedFunction(function) => {
                write!(f, "function not allowed: {function}")
            }
        }
    }
}

/// A draft that failed validation. Holds every reason found by the stage that
/// rejected it, in the order they were found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected at {stage}: {}", render_reasons(.reasons))]
pub struct Rejection {
    pub sql: String,
    pub source_turn: Option<TurnId>,
    pub stage: ValidationStage,
    pub reasons: Vec<RejectReason>,
}

impl Rejection {
    pub fn status(&self) -> ValidationStatus {
        ValidationStatus::Rejected(self.reasons.clone())
    }

    pub fn has_reason(&self, predicate: impl Fn(&RejectReason) -> bool) -> bool {
        self.reasons.iter().any(predicate)
    }
}

fn render_reasons(reasons: &[RejectReason]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
