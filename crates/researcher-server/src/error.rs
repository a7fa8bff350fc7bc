use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use researcher::errors::AgentError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Convert a dotted configuration path such as `provider.api_key` into the environment
/// variable that sets it
pub fn to_env_var(field_path: &str) -> String {
    let nested = field_path
        .split('.')
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("__");
    format!("RESEARCHER_{}", nested)
}

/// An agent failure on its way to an HTTP client
#[derive(Debug)]
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            AgentError::ModelBackend(_) | AgentError::LoopBudgetExceeded(_) => {
                StatusCode::BAD_GATEWAY
            }
            AgentError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AgentError::UnknownConversation(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}
