//! Transient state used by the service.
//!
//! This is initialized on startup.

use std::sync::Arc;

use nl_sql_configuration::Configuration;
use query_engine_execution::{initialise_metrics, DriverError, SqlxDriver};
use query_engine_generation::{ChatCompletionsBackend, CompletionError};
use thiserror::Error;
use tracing::{info_span, Instrument};

use crate::pipeline::Pipeline;

/// State for our service.
#[derive(Clone)]
pub struct ServerState {
    pub pipeline: Arc<Pipeline>,
    pub metrics_registry: prometheus::Registry,
}

impl ServerState {
    pub fn new(pipeline: Pipeline, metrics_registry: prometheus::Registry) -> Self {
        ServerState {
            pipeline: Arc::new(pipeline),
            metrics_registry,
        }
    }
}

/// Connect the pipeline to the configured database and completion service.
pub async fn create_state(
    configuration: &Configuration,
    metrics_registry: &mut prometheus::Registry,
) -> Result<Pipeline, InitializationError> {
    let metrics = async {
        initialise_metrics(metrics_registry).map_err(InitializationError::MetricsError)
    }
    .instrument(info_span!("Setup metrics"))
    .await?;

    let completion = ChatCompletionsBackend::new(&configuration.completion)
        .map_err(InitializationError::CompletionClient)?;

    let driver = SqlxDriver::new(
        configuration.database_type,
        configuration.connection_uri.clone(),
        configuration.schema_name.clone(),
        &configuration.pool_settings,
    )
    .map_err(InitializationError::UnableToCreatePool)?;

    tracing::info!(
        database_type = %configuration.database_type,
        fingerprint = %configuration.fingerprint(),
        "service state created"
    );

    Ok(Pipeline::new(
        configuration,
        Arc::new(driver),
        Arc::new(completion),
        metrics,
    ))
}

/// State initialization error.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("error initializing metrics: {0}")]
    MetricsError(prometheus::Error),
    #[error("unable to create the completion client: {0}")]
    CompletionClient(CompletionError),
    #[error("unable to create the connection pool: {:?}", .0.kind)]
    UnableToCreatePool(DriverError),
}
