//! The stages a generated statement goes through before it may run.

use std::time::Duration;

use query_engine_context::TurnId;
use serde::Serialize;

use crate::error::RejectReason;

/// Where a generated statement stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reasons", rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected(Vec<RejectReason>),
}

/// SQL produced by the generator that has not been validated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSql {
    sql: String,
    source_turn: Option<TurnId>,
}

impl DraftSql {
    pub fn new(sql: impl Into<String>, source_turn: Option<TurnId>) -> Self {
        DraftSql {
            sql: sql.into(),
            source_turn,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn source_turn(&self) -> Option<TurnId> {
        self.source_turn
    }

    pub fn status(&self) -> ValidationStatus {
        ValidationStatus::Pending
    }
}

/// The kinds of statement that can be approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Explain,
    Show,
}

/// A statement that passed every validation stage.
///
/// Only the validator can build one, and it cannot be changed afterwards:
/// anything that wants different SQL has to go through validation again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedSql {
    draft: DraftSql,
    sql: String,
    kind: StatementKind,
    row_limit: Option<u64>,
    timeout_hint: Duration,
}

impl ApprovedSql {
    pub(crate) fn new(
        draft: DraftSql,
        sql: String,
        kind: StatementKind,
        row_limit: Option<u64>,
        timeout_hint: Duration,
    ) -> Self {
        ApprovedSql {
            draft,
            sql,
            kind,
            row_limit,
            timeout_hint,
        }
    }

    /// The statement to send to the database, after policy rewrites.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The statement as it was generated.
    pub fn original_sql(&self) -> &str {
        self.draft.sql()
    }

    pub fn source_turn(&self) -> Option<TurnId> {
        self.draft.source_turn()
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// The LIMIT that the policy check added, if the statement had none.
    pub fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    pub fn timeout_hint(&self) -> Duration {
        self.timeout_hint
    }

    pub fn status(&self) -> ValidationStatus {
        ValidationStatus::Approved
    }
}
