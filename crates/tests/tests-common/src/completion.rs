//! A completion backend that answers from a script.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use query_engine_generation::{CompletionBackend, CompletionError, Prompt};

/// Returns the scripted answers in order, repeating the last one once the
/// script runs out, and records every prompt it was given.
#[derive(Debug)]
pub struct ScriptedCompletion {
    answers: Mutex<VecDeque<Result<String, CompletionError>>>,
    last: Mutex<Option<Result<String, CompletionError>>>,
    prompts: Mutex<Vec<Prompt>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(answers.into_iter().map(|answer| Ok(answer.into())))
    }

    pub fn from_results(
        answers: impl IntoIterator<Item = Result<String, CompletionError>>,
    ) -> Self {
        ScriptedCompletion {
            answers: Mutex::new(answers.into_iter().collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Wait this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_answer(&self) -> Result<String, CompletionError> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match self
            .answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            Some(answer) => {
                *last = Some(answer.clone());
                answer
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(CompletionError::Malformed("script is empty".into()))),
        }
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_answer()
    }
}
