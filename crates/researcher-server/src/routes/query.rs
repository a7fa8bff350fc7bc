use crate::error::ApiError;
use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
}

// non streaming, answers once the loop is done
async fn handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    tracing::info!(conversation = ?request.conversation_id, "query");
    let answer = state
        .agent
        .research_query(&request.query, request.conversation_id.as_deref())
        .await?;

    Ok(Json(QueryResponse { answer }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/query", post(handler))
        .with_state(state)
}
