//! Wire shapes for the HTTP API.
//!
//! Successful answers become [`FormattedResponse`]; core errors become an
//! [`ApiError`] carrying a stable code and a fixed message. Internal error
//! text is logged, never returned.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bank_rag::{QaPair, RagError, RagResponse, SystemStatus};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Maximum number of reference answers echoed back with an answer.
pub const MAX_SOURCES: usize = 2;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
}

/// Body of a successful `POST /api/query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedResponse {
    pub answer: String,
    /// Reference answers of the top structured chunks, best first.
    pub source: Vec<String>,
}

impl From<&RagResponse> for FormattedResponse {
    fn from(response: &RagResponse) -> Self {
        let source = response
            .retrieved_chunks
            .iter()
            .filter_map(|chunk| QaPair::parse(&chunk.text))
            .map(|pair| pair.answer.to_string())
            .take(MAX_SOURCES)
            .collect();
        Self { answer: response.answer.clone(), source }
    }
}

/// Body of `GET /api/system_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub model: String,
    pub embedding_model: String,
    /// `"Ready"` or `"Not Ready"`.
    pub status: String,
    pub ready: bool,
}

impl From<SystemStatus> for SystemInfo {
    fn from(status: SystemStatus) -> Self {
        Self {
            model: status.model_identifier,
            embedding_model: status.embedding_model_identifier,
            status: if status.ready { "Ready" } else { "Not Ready" }.to_string(),
            ready: status.ready,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// An error ready to be sent to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: &'static str,
}

impl ApiError {
    pub fn missing_question() -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: "invalid_input", message: "Question is required." }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail { code: self.code.to_string(), message: self.message.to_string() },
        }
    }
}

impl From<&RagError> for ApiError {
    fn from(err: &RagError) -> Self {
        let (status, message) = match err {
            RagError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Question is required."),
            RagError::NotReady { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "The system is still starting up. Please try again shortly.")
            }
            RagError::EmbeddingUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "The search service is temporarily unavailable.")
            }
            RagError::GenerationFailed { .. } => {
                (StatusCode::BAD_GATEWAY, "Sorry, I couldn't process your request.")
            }
            RagError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "The request took too long. Please try again."),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred."),
        };
        Self { status, code: err.code(), message }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        if err.is_query_level() {
            warn!(code = err.code(), error = %err, "query failed");
        } else {
            error!(code = err.code(), error = %err, "query failed");
        }
        Self::from(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}
