mod delete_session;
mod get_health;
mod get_metrics;
mod get_session;
mod post_cancel;
mod post_feedback;
mod post_query;
mod post_schema_refresh;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::ServerState;

pub use delete_session::delete_session;
pub use get_health::get_health;
pub use get_metrics::get_metrics;
pub use get_session::get_session;
pub use post_cancel::post_cancel;
pub use post_feedback::{post_feedback, FeedbackRequest};
pub use post_query::{post_query, QueryRequest, QueryResponse};
pub use post_schema_refresh::{post_schema_refresh, SchemaRefreshResponse};

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/query", post(post_query))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
        .route("/sessions/:session_id/cancel", post(post_cancel))
        .route("/sessions/:session_id/feedback", post(post_feedback))
        .route("/schema/refresh", post(post_schema_refresh))
        .with_state(state)
}
