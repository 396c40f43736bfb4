//! Turn a question into a single draft SQL statement.
//!
//! The completion service is reached through [`CompletionBackend`]; its answer
//! is untrusted text from which exactly one statement is extracted.

pub mod chat_completions;
pub mod completion;
pub mod error;
pub mod extract;
pub mod generator;
pub mod prompt;

pub use chat_completions::ChatCompletionsBackend;
pub use completion::{CompletionBackend, CompletionError, Message, Prompt, Role};
pub use error::GenerationError;
pub use generator::SqlGenerator;
