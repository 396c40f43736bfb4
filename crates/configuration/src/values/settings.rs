use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Secret;

pub const DEFAULT_COMPLETION_API_KEY_VARIABLE: &str = "NL_SQL_COMPLETION_API_KEY";

/// Functions that are never allowed in generated SQL, whatever the statement.
pub const DEFAULT_DENIED_FUNCTIONS: &[&str] = &[
    "pg_sleep",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "pg_read_file",
    "pg_read_binary_file",
    "pg_ls_dir",
    "lo_import",
    "lo_export",
    "dblink",
    "dblink_exec",
    "set_config",
    "nextval",
    "setval",
    "sleep",
    "benchmark",
    "load_file",
    "get_lock",
];

/// Limits applied to every executed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettings {
    /// hard wall-clock timeout for a statement (milliseconds)
    #[serde(default = "query_timeout_default")]
    pub query_timeout_ms: u64,
    /// maximum number of rows returned to the caller
    #[serde(default = "max_rows_default")]
    pub max_rows: NonZeroUsize,
}

impl ExecutionSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            query_timeout_ms: query_timeout_default(),
            max_rows: max_rows_default(),
        }
    }
}

/// How much conversation history each session keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextSettings {
    /// number of turns kept per session
    #[serde(default = "window_size_default")]
    pub window_size: NonZeroUsize,
    /// sessions idle for longer than this are destroyed (seconds)
    #[serde(default = "session_idle_timeout_default")]
    pub idle_timeout: u64,
}

impl ContextSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        ContextSettings {
            window_size: window_size_default(),
            idle_timeout: session_idle_timeout_default(),
        }
    }
}

/// The natural-language completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSettings {
    /// an OpenAI-compatible chat completions endpoint
    #[serde(default = "endpoint_default")]
    pub endpoint: String,
    #[serde(default = "model_default")]
    pub model: String,
    #[serde(default = "api_key_default")]
    pub api_key: Secret,
    /// timeout for a single completion call (milliseconds)
    #[serde(default = "completion_timeout_default")]
    pub timeout_ms: u64,
    #[serde(default = "max_tokens_default")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        CompletionSettings {
            endpoint: endpoint_default(),
            model: model_default(),
            api_key: api_key_default(),
            timeout_ms: completion_timeout_default(),
            max_tokens: max_tokens_default(),
            temperature: 0.0,
        }
    }
}

/// Statement kinds that may be enabled on top of SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AdditionalStatement {
    /// EXPLAIN of an allowed SELECT (never EXPLAIN ANALYZE)
    Explain,
    /// SHOW TABLES and SHOW COLUMNS
    Show,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSettings {
    #[serde(default)]
    pub additional_statements: BTreeSet<AdditionalStatement>,
    /// replaces the built-in list of denied functions when present
    #[serde(default)]
    pub denied_functions: Option<BTreeSet<String>>,
}

impl ValidationSettings {
    /// The denied function names, lowercased.
    pub fn denied_functions(&self) -> BTreeSet<String> {
        match &self.denied_functions {
            Some(functions) => functions.iter().map(|f| f.to_lowercase()).collect(),
            None => DEFAULT_DENIED_FUNCTIONS
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationSettings {
    /// categorical columns with at most this many distinct values are low-cardinality
    #[serde(default = "low_cardinality_max_default")]
    pub low_cardinality_max: usize,
    /// pie charts are only proposed up to this many slices
    #[serde(default = "pie_max_slices_default")]
    pub pie_max_slices: usize,
    /// how close to 1 a column must sum to be treated as proportions
    #[serde(default = "proportion_tolerance_default")]
    pub proportion_tolerance: f64,
}

impl Default for VisualizationSettings {
    fn default() -> Self {
        VisualizationSettings {
            low_cardinality_max: low_cardinality_max_default(),
            pie_max_slices: pie_max_slices_default(),
            proportion_tolerance: proportion_tolerance_default(),
        }
    }
}

// for serde default //
fn query_timeout_default() -> u64 {
    5000
}
fn max_rows_default() -> NonZeroUsize {
    NonZeroUsize::new(1000).unwrap_or(NonZeroUsize::MIN)
}
fn window_size_default() -> NonZeroUsize {
    NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN)
}
fn session_idle_timeout_default() -> u64 {
    1800
}
fn endpoint_default() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}
fn model_default() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn api_key_default() -> Secret {
    Secret::from_environment(DEFAULT_COMPLETION_API_KEY_VARIABLE)
}
fn completion_timeout_default() -> u64 {
    30_000
}
fn max_tokens_default() -> u32 {
    1024
}
fn low_cardinality_max_default() -> usize {
    20
}
fn pie_max_slices_default() -> usize {
    8
}
fn proportion_tolerance_default() -> f64 {
    0.01
}
