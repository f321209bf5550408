//! Request-level error taxonomy

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Errors that abort a chat request. A failed tool execution is
/// deliberately not represented here: the dispatcher converts it into a
/// textual tool result so the model can see the failure and recover.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The caller supplied a turn the codec doesn't recognize.
    #[error("malformed turn: {0}")]
    MalformedTurn(String),

    /// The model supplied a tool argument that can't be coerced. Not
    /// silently defaulted since that would mask model mistakes.
    #[error("invalid value for `{argument}`: {value}")]
    InvalidArgument {
        argument: &'static str,
        value: String,
    },

    /// The model call itself failed (network/auth/quota). Never retried.
    #[error("model invocation failed: {0}")]
    ModelInvocation(#[source] anyhow::Error),

    /// The model emitted tool calls until the configured cap.
    #[error("tool-call budget exceeded after {0} iterations")]
    LoopBudgetExceeded(usize),

    /// The whole request ran past its deadline.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("Missing Authorization header")]
    MissingAuth,
}

/// Convert `ChatError` into an Axum compatible response. The body shape
/// matches what the original API clients expect.
impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match self {
            ChatError::MalformedTurn(_) => StatusCode::BAD_REQUEST,
            ChatError::MissingAuth => StatusCode::UNAUTHORIZED,
            ChatError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ChatError::InvalidArgument { .. }
            | ChatError::ModelInvocation(_)
            | ChatError::LoopBudgetExceeded(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
