//! Runtime configuration.

use std::fmt;

use query_engine_metadata::metadata::{ConnectionFingerprint, DatabaseType};

use crate::values::{
    ContextSettings, ExecutionSettings, PoolSettings, ValidationSettings, VisualizationSettings,
};

/// The 'Configuration' type collects all the information necessary to serve queries at runtime.
///
/// Values of this type are produced from a 'ParsedConfiguration' using
/// 'make_runtime_configuration', which resolves every secret. The resolved
/// secrets are only ever held in memory and are redacted from `Debug` output.
#[derive(Clone)]
pub struct Configuration {
    pub database_type: DatabaseType,
    pub connection_uri: String,
    pub schema_name: Option<String>,
    pub pool_settings: PoolSettings,
    pub execution: ExecutionSettings,
    pub context: ContextSettings,
    pub completion: CompletionConfiguration,
    pub validation: ValidationSettings,
    pub visualization: VisualizationSettings,
}

impl Configuration {
    pub fn fingerprint(&self) -> ConnectionFingerprint {
        ConnectionFingerprint::new(self.database_type, &self.connection_uri)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("database_type", &self.database_type)
            .field("connection_uri", &"<redacted>")
            .field("schema_name", &self.schema_name)
            .field("pool_settings", &self.pool_settings)
            .field("execution", &self.execution)
            .field("context", &self.context)
            .field("completion", &self.completion)
            .field("validation", &self.validation)
            .field("visualization", &self.visualization)
            .finish()
    }
}

/// Completion settings with the API key resolved.
#[derive(Clone)]
pub struct CompletionConfiguration {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl fmt::Debug for CompletionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfiguration")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}
