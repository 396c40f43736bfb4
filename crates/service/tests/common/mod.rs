//! Common functions used across test cases.
#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test_helper::TestClient;
use nl_sql::pipeline::Pipeline;
use nl_sql::routes::create_router;
use nl_sql::state::ServerState;
use nl_sql_configuration::{
    CompletionConfiguration, Configuration, ContextSettings, ExecutionSettings, PoolSettings,
    ValidationSettings, VisualizationSettings,
};
use query_engine_execution::initialise_metrics;
use query_engine_metadata::metadata::{Column, DatabaseType, ScalarType, Value};
use tests_common::completion::ScriptedCompletion;
use tests_common::driver::MemoryDriver;
use tests_common::schema::{rental_schema, RENTAL_CONNECTION_URI};

pub const RENTALS_BY_STORE: &str = "```sql\n\
    SELECT rental.store_id, COUNT(rental.rental_id) AS total\n\
    FROM rental GROUP BY rental.store_id;\n```";

pub fn configuration(max_rows: usize) -> Configuration {
    Configuration {
        database_type: DatabaseType::Postgresql,
        connection_uri: RENTAL_CONNECTION_URI.to_string(),
        schema_name: None,
        pool_settings: PoolSettings {
            max_connections: 2,
            pool_timeout: 1,
            ..PoolSettings::default()
        },
        execution: ExecutionSettings {
            query_timeout_ms: 5000,
            max_rows: NonZeroUsize::new(max_rows).unwrap(),
        },
        context: ContextSettings::default(),
        completion: CompletionConfiguration {
            endpoint: "http://localhost:1/v1/chat/completions".to_string(),
            model: "test-model".to_string(),
            api_key: "sk-test".to_string(),
            timeout_ms: 30_000,
            max_tokens: 256,
            temperature: 0.0,
        },
        validation: ValidationSettings::default(),
        visualization: VisualizationSettings::default(),
    }
}

/// Two stores and their rental counts.
pub fn rentals_by_store() -> (Vec<Column>, Vec<Vec<Value>>) {
    (
        vec![
            Column::new("store_id", ScalarType::Integer),
            Column::new("total", ScalarType::Integer),
        ],
        vec![
            vec![Value::Int(1), Value::Int(1250)],
            vec![Value::Int(2), Value::Int(980)],
        ],
    )
}

/// A pipeline over the rental schema, with the scripted collaborators still
/// reachable for inspection.
pub struct TestService {
    pub state: ServerState,
    pub driver: MemoryDriver,
    pub completion: Arc<ScriptedCompletion>,
}

impl TestService {
    pub async fn new(driver: MemoryDriver, completion: ScriptedCompletion) -> Self {
        Self::with_configuration(&configuration(1000), driver, completion).await
    }

    pub async fn with_configuration(
        configuration: &Configuration,
        driver: MemoryDriver,
        completion: ScriptedCompletion,
    ) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut metrics_registry = prometheus::Registry::new();
        let metrics = initialise_metrics(&mut metrics_registry).unwrap();
        let completion = Arc::new(completion);
        let pipeline = Pipeline::new(
            configuration,
            Arc::new(driver.clone()),
            completion.clone(),
            metrics,
        );
        pipeline
            .use_schema(rental_schema(DatabaseType::Postgresql))
            .await;

        TestService {
            state: ServerState::new(pipeline, metrics_registry),
            driver,
            completion,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.state.pipeline
    }

    pub fn client(&self) -> TestClient {
        TestClient::new(create_router(self.state.clone()))
    }

    /// POST a JSON body to `/query`.
    pub async fn query(&self, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let res = self
            .client()
            .post("/query")
            .body(body.to_string())
            .header("Content-Type", "application/json")
            .send()
            .await;
        let status = res.status();
        (status, res.json().await)
    }

    pub async fn get(&self, url: &str) -> (StatusCode, String) {
        let res = self.client().get(url).send().await;
        let status = res.status();
        (status, res.text().await)
    }
}
