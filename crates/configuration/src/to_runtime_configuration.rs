//! Convert a parsed configuration into the runtime configuration.

use crate::configuration::{CompletionConfiguration, Configuration};
use crate::environment::Environment;
use crate::error::MakeRuntimeConfigurationError;
use crate::version1::ParsedConfiguration;

/// Resolve the secrets of a parsed configuration and check the values that
/// cannot be checked while parsing.
pub fn make_runtime_configuration(
    parsed_config: ParsedConfiguration,
    environment: impl Environment,
) -> Result<Configuration, MakeRuntimeConfigurationError> {
    let connection_uri = parsed_config
        .connection_settings
        .connection_uri
        .0
        .resolve(&environment)?;
    let api_key = parsed_config.completion.api_key.resolve(&environment)?;

    if parsed_config.pool_settings.max_connections == 0 {
        return Err(MakeRuntimeConfigurationError::InvalidValue {
            field: "poolSettings.maxConnections",
            message: "must be at least 1".to_string(),
        });
    }
    if parsed_config.execution.query_timeout_ms == 0 {
        return Err(MakeRuntimeConfigurationError::InvalidValue {
            field: "execution.queryTimeoutMs",
            message: "must be at least 1".to_string(),
        });
    }

    Ok(Configuration {
        database_type: parsed_config.connection_settings.db_type,
        connection_uri,
        schema_name: parsed_config.connection_settings.schema_name,
        pool_settings: parsed_config.pool_settings,
        execution: parsed_config.execution,
        context: parsed_config.context,
        completion: CompletionConfiguration {
            endpoint: parsed_config.completion.endpoint,
            model: parsed_config.completion.model,
            api_key,
            timeout_ms: parsed_config.completion.timeout_ms,
            max_tokens: parsed_config.completion.max_tokens,
            temperature: parsed_config.completion.temperature,
        },
        validation: parsed_config.validation,
        visualization: parsed_config.visualization,
    })
}
