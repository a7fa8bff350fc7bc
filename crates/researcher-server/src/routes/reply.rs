use crate::routes::query::QueryRequest;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use researcher::agent::Stage;
use serde_json::json;
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

// Line-delimited streaming body in the data stream protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);

        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            [("x-vercel-ai-data-stream", "v1")],
            body,
        )
            .into_response()
    }
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn format_text(text: &str) -> String {
        let encoded_text = serde_json::to_string(text).unwrap_or_else(|_| String::new());
        format!("0:{}\n", encoded_text)
    }

    fn format_action(result: &str) -> String {
        // Tool results start with "a:"
        let action = json!({
            "stage": Stage::Action,
            "result": result,
        });
        format!("a:{}\n", action)
    }

    fn format_fragment(stage: Stage, text: &str) -> String {
        match stage {
            Stage::Llm => Self::format_text(text),
            Stage::Action => Self::format_action(text),
        }
    }

    fn format_error(error: &str) -> String {
        // Errors start with "3:"
        let encoded_error = serde_json::to_string(error).unwrap_or_else(|_| String::new());
        format!("3:{}\n", encoded_error)
    }

    fn format_finish(reason: &str) -> String {
        // Finish messages start with "d:"
        let finish = json!({
            "finishReason": reason,
            "usage": {
                "promptTokens": 0,
                "completionTokens": 0
            }
        });
        format!("d:{}\n", finish)
    }
}

async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<SseResponse, StatusCode> {
    // Check protocol header (optional in our case)
    if let Some(protocol) = headers.get("x-protocol") {
        if protocol.to_str().map(|p| p != "data").unwrap_or(true) {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);
    let agent = state.agent.clone();

    // Spawn task to handle streaming
    tokio::spawn(async move {
        tracing::info!(conversation = ?request.conversation_id, "streaming reply");
        let mut stream =
            agent.research_stream(&request.query, request.conversation_id.as_deref());
        let mut finish_reason = "stop";

        loop {
            match timeout(Duration::from_millis(500), stream.next()).await {
                Ok(Some(Ok((stage, text)))) => {
                    if let Err(e) = tx
                        .send(ProtocolFormatter::format_fragment(stage, &text))
                        .await
                    {
                        tracing::error!("Error sending message through channel: {}", e);
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Error processing message: {}", e);
                    let _ = tx.send(ProtocolFormatter::format_error(&e.to_string())).await;
                    finish_reason = "error";
                    break;
                }
                Ok(None) => {
                    break;
                }
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and stop the loop early.
                    if tx.is_closed() {
                        break;
                    }
                    continue;
                }
            }
        }

        let _ = tx.send(ProtocolFormatter::format_finish(finish_reason)).await;
    });

    Ok(SseResponse::new(stream))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/reply", post(handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{failing_state, search_turn, state_with};
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use researcher::models::message::Message;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn post_reply(state: AppState, body: Value) -> (StatusCode, Vec<String>) {
        let response = routes(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reply")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let lines = String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        (status, lines)
    }

    #[test]
    fn test_format_text() {
        assert_eq!(
            ProtocolFormatter::format_text("line one\nline \"two\""),
            "0:\"line one\\nline \\\"two\\\"\"\n"
        );
    }

    #[test]
    fn test_format_action() {
        let line = ProtocolFormatter::format_fragment(Stage::Action, "Sunny");
        let payload: Value = serde_json::from_str(line.trim_start_matches("a:")).unwrap();
        assert_eq!(payload, json!({"stage": "action", "result": "Sunny"}));
    }

    #[tokio::test]
    async fn test_reply_streams_action_then_text() {
        let state = state_with(vec![
            search_turn(),
            Message::assistant().with_text("It is sunny."),
        ]);

        let (status, lines) = post_reply(state, json!({"query": "weather in sf?"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(lines.len(), 3);
        let action: Value = serde_json::from_str(lines[0].strip_prefix("a:").unwrap()).unwrap();
        assert_eq!(action, json!({"stage": "action", "result": "Sunny, 20C"}));
        assert_eq!(lines[1], r#"0:"It is sunny.""#);
        assert!(lines[2].starts_with(r#"d:{"finishReason":"stop""#));
    }

    #[tokio::test]
    async fn test_reply_reports_errors_in_stream() {
        let state = failing_state();

        let (status, lines) = post_reply(state, json!({"query": "anything"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("3:\"Model backend failed"));
        assert!(lines[1].starts_with(r#"d:{"finishReason":"error""#));
    }

    #[tokio::test]
    async fn test_rejects_other_protocols() {
        let response = routes(state_with(vec![]))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reply")
                    .header("content-type", "application/json")
                    .header("x-protocol", "text")
                    .body(Body::from(json!({"query": "hi"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
