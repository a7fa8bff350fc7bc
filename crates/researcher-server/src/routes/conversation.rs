use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use researcher::models::message::Message;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct NewConversationResponse {
    conversation_id: String,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    conversation_id: String,
    messages: Vec<Message>,
}

async fn create(State(state): State<AppState>) -> Json<NewConversationResponse> {
    let conversation_id = state.agent.new_conversation();
    tracing::info!(conversation = %conversation_id, "new conversation");
    Json(NewConversationResponse { conversation_id })
}

async fn history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let messages = state.agent.history(&conversation_id)?;
    Ok(Json(HistoryResponse {
        conversation_id,
        messages,
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations", post(create))
        .route("/conversations/:id", get(history))
        .with_state(state)
}
