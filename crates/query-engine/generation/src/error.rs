use std::time::Duration;

use thiserror::Error;

use crate::completion::CompletionError;

/// Why no draft statement could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("the completion did not contain a SQL statement")]
    NoStatement,
    #[error("the completion contained {0} statements, expected exactly one")]
    MultipleStatements(usize),
    #[error("the completion service did not answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Completion(CompletionError),
}
