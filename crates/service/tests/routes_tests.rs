pub mod common;

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{rentals_by_store, TestService, RENTALS_BY_STORE};
use nl_sql::routes::delete_session;
use query_engine_execution::{DriverError, DriverErrorKind};
use query_engine_metadata::metadata::{Column, DatabaseType, ScalarType, Value};
use serde_json::json;
use similar_asserts::assert_eq;
use tests_common::completion::ScriptedCompletion;
use tests_common::driver::MemoryDriver;

async fn store_service() -> TestService {
    let (columns, rows) = rentals_by_store();
    TestService::new(
        MemoryDriver::new(DatabaseType::Postgresql).returning(columns, rows),
        ScriptedCompletion::new([RENTALS_BY_STORE]),
    )
    .await
}

#[tokio::test]
async fn question_is_answered_with_rows_and_charts() {
    let service = store_service().await;

    let (status, body) = service
        .query(json!({ "session_id": "analyst", "question": "total rentals by store" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], json!("analyst"));
    assert_eq!(
        body["rows"],
        json!([
            { "store_id": 1, "total": 1250 },
            { "store_id": 2, "total": 980 },
        ])
    );
    assert_eq!(body["row_count"], json!(2));
    assert_eq!(body["truncated"], json!(false));
    assert_eq!(body["chart_candidates"][0]["chart_type"], json!("bar"));
    assert_eq!(body["chart_candidates"][0]["x"], json!("store_id"));
    assert_eq!(body["chart_candidates"][0]["y"], json!(["total"]));
    assert!(body.get("chart").is_none());
}

#[tokio::test]
async fn requested_chart_is_drawn() {
    let service = store_service().await;

    let (status, body) = service
        .query(json!({ "question": "total rentals by store", "chart_type": "pie" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chart"]["chart_type"], json!("pie"));
    // a fresh session id was made up
    assert!(body["session_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn requested_chart_that_does_not_fit_is_left_out() {
    let service = store_service().await;

    let (status, body) = service
        .query(json!({ "question": "total rentals by store", "chart_type": "line" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("chart").is_none());
}

#[tokio::test]
async fn unknown_chart_type_is_a_bad_request() {
    let service = store_service().await;

    let (status, _) = service
        .query(json!({ "question": "total rentals by store", "chart_type": "radar" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(service.completion.calls(), 0);
}

#[tokio::test]
async fn question_and_sql_together_are_a_bad_request() {
    let service = store_service().await;

    let (status, body) = service
        .query(json!({ "question": "total rentals by store", "sql": "SELECT 1" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        json!("exactly one of question and sql is required")
    );
}

#[tokio::test]
async fn rejected_sql_reports_every_reason() {
    let service = store_service().await;

    let (status, body) = service
        .query(json!({ "session_id": "analyst", "sql": "DELETE FROM rental; SELECT 1" }))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body,
        json!({
            "kind": "ValidationRejected",
            "message": "the generated SQL was rejected: statement type not allowed: DELETE; \
                        expected a single statement, found 2",
            "retryable": false,
            "reasons": [
                { "reason": "disallowed_statement_type", "detail": "DELETE" },
                { "reason": "multi_statement", "detail": 2 },
            ],
        })
    );
    assert!(service.driver.executed().is_empty());
}

#[tokio::test]
async fn driver_failures_are_classified_without_their_message() {
    let service = TestService::new(
        MemoryDriver::new(DatabaseType::Postgresql).failing_with(DriverError::new(
            DriverErrorKind::Permission,
            "permission denied for table rental (user rental:hunter2)",
        )),
        ScriptedCompletion::new([RENTALS_BY_STORE]),
    )
    .await;

    let (status, body) = service
        .query(json!({ "question": "total rentals by store" }))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], json!("PermissionError"));
    assert_eq!(body["retryable"], json!(false));
    assert!(!body.to_string().contains("hunter2"));
}

#[tokio::test]
async fn session_history_can_be_read_and_deleted() {
    let service = store_service().await;
    service
        .query(json!({ "session_id": "analyst", "question": "total rentals by store" }))
        .await;

    let (status, body) = service.get("/sessions/analyst").await;
    assert_eq!(status, StatusCode::OK);
    let view: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(view["session_id"], json!("analyst"));
    assert_eq!(view["turn_count"], json!(1));
    assert_eq!(view["turns"][0]["user_text"], json!("total rentals by store"));
    assert_eq!(view["turns"][0]["status"], json!("answered"));

    let deleted = delete_session(State(service.state.clone()), Path("analyst".to_string())).await;
    assert!(matches!(deleted, Ok(StatusCode::NO_CONTENT)));
    let deleted_again =
        delete_session(State(service.state.clone()), Path("analyst".to_string())).await;
    assert!(deleted_again.is_err());

    let (status, _) = service.get("/sessions/analyst").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn a_running_question_can_be_cancelled() {
    let (columns, rows) = rentals_by_store();
    let service = TestService::new(
        MemoryDriver::new(DatabaseType::Postgresql)
            .returning(columns, rows)
            .with_latency(Duration::from_secs(30)),
        ScriptedCompletion::new([RENTALS_BY_STORE]),
    )
    .await;

    let ((status, body), cancel_status) = tokio::join!(
        service.query(json!({ "session_id": "analyst", "question": "total rentals by store" })),
        async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            service
                .client()
                .post("/sessions/analyst/cancel")
                .send()
                .await
                .status()
        }
    );

    assert_eq!(cancel_status, StatusCode::ACCEPTED);
    assert_eq!(status.as_u16(), 499);
    assert_eq!(body["kind"], json!("Cancelled"));
    assert_eq!(service.driver.cancels(), vec![100]);

    let (_, view) = service.get("/sessions/analyst").await;
    let view: serde_json::Value = serde_json::from_str(&view).unwrap();
    assert_eq!(view["turns"][0]["status"], json!("cancelled"));
}

#[tokio::test]
async fn cancelling_with_nothing_running_is_not_found() {
    let service = store_service().await;
    service
        .query(json!({ "session_id": "analyst", "question": "total rentals by store" }))
        .await;

    let res = service
        .client()
        .post("/sessions/analyst/cancel")
        .send()
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feedback_is_shown_with_the_session() {
    let service = store_service().await;
    service
        .query(json!({ "session_id": "analyst", "question": "total rentals by store" }))
        .await;

    let post_feedback = |session: &'static str, body: serde_json::Value| {
        let client = service.client();
        async move {
            client
                .post(&format!("/sessions/{session}/feedback"))
                .body(body.to_string())
                .header("Content-Type", "application/json")
                .send()
                .await
                .status()
        }
    };

    assert_eq!(
        post_feedback("analyst", json!({ "turn": 0, "helpful": false, "comment": "wrong store" }))
            .await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        post_feedback("analyst", json!({ "turn": 3, "helpful": true })).await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        post_feedback("nobody", json!({ "turn": 0, "helpful": true })).await,
        StatusCode::NOT_FOUND
    );

    let (_, view) = service.get("/sessions/analyst").await;
    let view: serde_json::Value = serde_json::from_str(&view).unwrap();
    assert_eq!(view["turns"][0]["feedback"]["helpful"], json!(false));
    assert_eq!(view["turns"][0]["feedback"]["comment"], json!("wrong store"));
}

#[tokio::test]
async fn analysis_is_returned_when_asked_for() {
    let (columns, rows) = rentals_by_store();
    let service = TestService::new(
        MemoryDriver::new(DatabaseType::Postgresql)
            .returning(columns, rows)
            .respond_to(
                "EXPLAIN ANALYZE",
                vec![Column::new("QUERY PLAN", ScalarType::Text)],
                vec![vec![Value::Text("Seq Scan on rental  (actual rows=2230 loops=1)".into())]],
            ),
        ScriptedCompletion::new([RENTALS_BY_STORE, RENTALS_BY_STORE]),
    )
    .await;

    let (status, body) = service
        .query(json!({ "question": "total rentals by store", "analyze": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["analysis"],
        json!("Seq Scan on rental  (actual rows=2230 loops=1)")
    );
    assert_eq!(body["row_count"], json!(2));

    let (_, body) = service
        .query(json!({ "question": "total rentals by store" }))
        .await;
    assert!(body.get("analysis").is_none());
}

#[tokio::test]
async fn health_pings_the_database() {
    let service = store_service().await;
    let (status, _) = service.get("/health").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn health_reports_an_unreachable_database() {
    let service = TestService::new(
        MemoryDriver::new(DatabaseType::Postgresql).with_failing_connects(2),
        ScriptedCompletion::new([RENTALS_BY_STORE]),
    )
    .await;

    let res = service.client().get("/health").send().await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await;
    assert_eq!(body["kind"], json!("ConnectionError"));
    assert_eq!(body["retryable"], json!(true));
}

#[tokio::test]
async fn metrics_count_answers_and_rejections() {
    let service = store_service().await;
    service
        .query(json!({ "question": "total rentals by store" }))
        .await;
    service
        .query(json!({ "sql": "DROP TABLE rental" }))
        .await;

    let (status, body) = service.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("nl_sql_query_total 1"), "{body}");
    assert!(body.contains("nl_sql_rejected_total 1"), "{body}");
    assert!(body.contains("nl_sql_pool_max_connections 2"), "{body}");
}

#[tokio::test]
async fn failed_schema_refresh_keeps_answering_from_the_old_snapshot() {
    let (columns, rows) = rentals_by_store();
    let service = TestService::new(
        MemoryDriver::new(DatabaseType::Postgresql)
            .returning(columns, rows)
            .fail_on(
                "information_schema",
                DriverError::new(DriverErrorKind::Permission, "permission denied"),
            ),
        ScriptedCompletion::new([RENTALS_BY_STORE]),
    )
    .await;

    let res = service.client().post("/schema/refresh").send().await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (status, _) = service
        .query(json!({ "question": "total rentals by store" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}
