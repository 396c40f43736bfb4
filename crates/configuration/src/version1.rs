//! The version 1 configuration file format.

use std::path::Path;

use schemars::{gen::SchemaSettings, schema::RootSchema, JsonSchema};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::connection_settings::DatabaseConnectionSettings;
use crate::error::{ParseConfigurationError, WriteParsedConfigurationError};
use crate::values::{
    CompletionSettings, ContextSettings, ExecutionSettings, PoolSettings, ValidationSettings,
    VisualizationSettings,
};

const CURRENT_VERSION: u32 = 1;
pub const CONFIGURATION_FILENAME: &str = "configuration.json";
pub const CONFIGURATION_JSONSCHEMA_FILENAME: &str = "schema.json";

/// The configuration as written by the user.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParsedConfiguration {
    /// Which version of the configuration format are we using
    pub version: u32,
    #[serde(default = "DatabaseConnectionSettings::empty")]
    pub connection_settings: DatabaseConnectionSettings,
    #[serde(default, skip_serializing_if = "PoolSettings::is_default")]
    pub pool_settings: PoolSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub completion: CompletionSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub visualization: VisualizationSettings,
}

impl ParsedConfiguration {
    pub fn initial() -> Self {
        ParsedConfiguration::empty()
    }

    pub fn empty() -> Self {
        Self {
            version: CURRENT_VERSION,
            connection_settings: DatabaseConnectionSettings::empty(),
            pool_settings: PoolSettings::default(),
            execution: ExecutionSettings::default(),
            context: ContextSettings::default(),
            completion: CompletionSettings::default(),
            validation: ValidationSettings::default(),
            visualization: VisualizationSettings::default(),
        }
    }
}

/// Parse the configuration found in `configuration_dir`.
pub async fn parse_configuration(
    configuration_dir: impl AsRef<Path>,
) -> Result<ParsedConfiguration, ParseConfigurationError> {
    let configuration_file = configuration_dir.as_ref().join(CONFIGURATION_FILENAME);
    let configuration_file_contents = fs::read_to_string(&configuration_file).await?;

    let parsed: ParsedConfiguration = serde_json::from_str(&configuration_file_contents)
        .map_err(|error| ParseConfigurationError::ParseError {
            file_path: configuration_file.clone(),
            line: error.line(),
            column: error.column(),
            message: error.to_string(),
        })?;

    if parsed.version != CURRENT_VERSION {
        return Err(ParseConfigurationError::UnsupportedVersion(parsed.version));
    }

    tracing::debug!(file = %configuration_file.display(), "parsed configuration");
    Ok(parsed)
}

/// Write the parsed configuration, and its JSON schema, into a directory on disk.
pub async fn write_parsed_configuration(
    parsed_config: ParsedConfiguration,
    out_dir: impl AsRef<Path>,
) -> Result<(), WriteParsedConfigurationError> {
    let out_dir = out_dir.as_ref();
    if !out_dir.is_dir() {
        return Err(WriteParsedConfigurationError::NotADirectory {
            file_path: out_dir.to_owned(),
        });
    }

    let configuration_file = out_dir.join(CONFIGURATION_FILENAME);
    fs::write(
        &configuration_file,
        serde_json::to_string_pretty(&parsed_config)? + "\n",
    )
    .await?;

    let schema_file = out_dir.join(CONFIGURATION_JSONSCHEMA_FILENAME);
    fs::write(
        &schema_file,
        serde_json::to_string_pretty(&configuration_jsonschema())? + "\n",
    )
    .await?;

    Ok(())
}

/// The JSON schema of the configuration file format.
pub fn configuration_jsonschema() -> RootSchema {
    SchemaSettings::draft07()
        .into_generator()
        .into_root_schema_for::<ParsedConfiguration>()
}
