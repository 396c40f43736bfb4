//! Ask the completion service for SQL and extract the draft statement.

use std::sync::Arc;
use std::time::Duration;

use query_engine_context::{ConversationContext, TurnId};
use query_engine_metadata::metadata::{DatabaseType, SchemaSnapshot};
use query_engine_validation::DraftSql;
use tracing::{info_span, Instrument};

use crate::completion::{CompletionBackend, CompletionError};
use crate::error::GenerationError;
use crate::extract::extract_statements;
use crate::prompt::build_prompt;

#[derive(Clone)]
pub struct SqlGenerator {
    backend: Arc<dyn CompletionBackend>,
    database_type: DatabaseType,
    timeout: Duration,
}

impl SqlGenerator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        database_type: DatabaseType,
        timeout: Duration,
    ) -> Self {
        SqlGenerator {
            backend,
            database_type,
            timeout,
        }
    }

    /// Generate a draft statement answering `question`, which was asked as
    /// `turn` of `context`. The turns before it are included in the prompt.
    pub async fn generate(
        &self,
        turn: TurnId,
        question: &str,
        context: &ConversationContext,
        schema: &SchemaSnapshot,
    ) -> Result<DraftSql, GenerationError> {
        let prompt = build_prompt(
            self.database_type,
            schema,
            context.history_before(turn),
            question,
        );

        let completion = tokio::time::timeout(self.timeout, self.backend.complete(&prompt))
            .instrument(info_span!("Complete prompt", messages = prompt.messages.len()))
            .await;
        let completion = match completion {
            Err(_) | Ok(Err(CompletionError::Timeout)) => {
                return Err(GenerationError::Timeout(self.timeout))
            }
            Ok(Err(err)) => return Err(GenerationError::Completion(err)),
            Ok(Ok(text)) => text,
        };

        let mut statements = extract_statements(&completion, self.database_type);
        match statements.len() {
            0 => Err(GenerationError::NoStatement),
            1 => {
                let sql = statements.remove(0);
                tracing::info!(%sql, "generated statement");
                Ok(DraftSql::new(sql, Some(turn)))
            }
            count => Err(GenerationError::MultipleStatements(count)),
        }
    }
}
