//! HTTP error envelope
//!
//! Every failure surfaces as
//! `{ "error": { code, message, details?, traceId?, timestamp } }` with the
//! status pinned to the code.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::agents::error::{AgentError, ErrorCode};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    details: Option<Value>,
    trace_id: Option<String>,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: ErrorCode::ValidationError,
            message: message.into(),
            details: None,
            trace_id: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = match &err {
            AgentError::NotFound(_) | AgentError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            AgentError::McpConnection(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self {
            status,
            code: err.code(),
            message: err.to_string(),
            details: None,
            trace_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let mut error = json!({
            "code": self.code,
            "message": self.message,
            "timestamp": timestamp,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        if let Some(trace_id) = self.trace_id {
            error["traceId"] = json!(trace_id);
        }

        (self.status, Json(json!({ "error": error }))).into_response()
    }
}
