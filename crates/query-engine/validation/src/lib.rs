//! Static safety validation of generated SQL.
//!
//! A [`DraftSql`] goes through parsing, the statement-type gate, the schema
//! check and the policy check. Only a draft that passes all of them becomes an
//! [`ApprovedSql`], the sole input the executor accepts.

pub mod draft;
pub mod error;
mod identifiers;
mod policy;
pub mod validator;

pub use draft::{ApprovedSql, DraftSql, StatementKind, ValidationStatus};
pub use error::{RejectReason, Rejection};
pub use validator::{ValidationStage, Validator};
