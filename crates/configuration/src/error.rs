//! Errors that can be thrown when processing configuration.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ParseConfigurationError {
    #[error("parse error on {file_path}:{line}:{column}: {message}")]
    ParseError {
        file_path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("unsupported configuration version {0}, expected 1")]
    UnsupportedVersion(u32),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum WriteParsedConfigurationError {
    #[error("{file_path} is not a directory")]
    NotADirectory { file_path: PathBuf },

    #[error("unable to serialize configuration: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum MakeRuntimeConfigurationError {
    #[error("missing required secret: {0}")]
    MissingSecret(#[from] crate::environment::Error),

    #[error("invalid configuration value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}
