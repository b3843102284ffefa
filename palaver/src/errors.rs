//! Error taxonomy for the relay.
//!
//! Every failure path in the request pipeline maps onto one variant here,
//! and every variant maps onto an HTTP status and a structured JSON body:
//!
//! ```json
//! { "error": "<human readable>", "category": "<snake_case tag>", "details": { ... } }
//! ```
//!
//! The `details` field carries the upstream service's own error payload when
//! one was available, so callers can see what the assistant API actually
//! said. Internal details (stack traces, panics) are never serialized.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Request used anything other than POST on the chat route
    #[error("Method {method} not allowed, use POST")]
    MethodNotAllowed { method: String },

    /// Request body encoding is neither JSON nor multipart
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// Multipart body (or its content-type header) could not be decoded
    #[error("Malformed multipart request: {message}")]
    MalformedMultipart { message: String },

    /// Request carried neither a message nor a file
    #[error("Request contains neither a message nor a file")]
    EmptyRequest,

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Uploaded file exceeds the configured size limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Upstream service rejected the attachment upload
    #[error("Upstream file upload failed")]
    UpstreamUploadFailed { detail: Option<Value> },

    /// Run reached a terminal status other than `completed`
    #[error("Assistant run ended as {status}")]
    UpstreamRunFailed { status: String, detail: Option<Value> },

    /// Polling ceiling exhausted before the run reached a terminal status
    #[error("Assistant run did not finish within {}", humantime::format_duration(*.waited))]
    UpstreamRunTimeout { attempts: u32, waited: Duration },

    /// Run completed but the thread holds no assistant-authored message
    #[error("Run completed but the assistant produced no reply")]
    NoAssistantReply,

    /// Transport or protocol failure talking to the upstream service
    #[error("Upstream request failed: {message}")]
    Upstream { message: String, detail: Option<Value> },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::UnsupportedContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::MalformedMultipart { .. } => StatusCode::BAD_REQUEST,
            Error::EmptyRequest => StatusCode::BAD_REQUEST,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::UpstreamUploadFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::UpstreamRunFailed { .. } => StatusCode::BAD_GATEWAY,
            Error::UpstreamRunTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::NoAssistantReply => StatusCode::BAD_GATEWAY,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Snake-case tag identifying the error category in the response body.
    pub fn category(&self) -> &'static str {
        match self {
            Error::MethodNotAllowed { .. } => "method_not_allowed",
            Error::UnsupportedContentType { .. } => "unsupported_content_type",
            Error::MalformedMultipart { .. } => "malformed_multipart",
            Error::EmptyRequest => "empty_request",
            Error::BadRequest { .. } => "bad_request",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::UpstreamUploadFailed { .. } => "upstream_upload_failed",
            Error::UpstreamRunFailed { .. } => "upstream_run_failed",
            Error::UpstreamRunTimeout { .. } => "upstream_run_timeout",
            Error::NoAssistantReply => "no_assistant_reply",
            Error::Upstream { .. } => "upstream_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// The upstream service's own error payload, when one was captured.
    fn upstream_detail(&self) -> Option<&Value> {
        match self {
            Error::UpstreamUploadFailed { detail }
            | Error::UpstreamRunFailed { detail, .. }
            | Error::Upstream { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Other(_) => {
                tracing::error!("Internal relay error: {:#}", self);
            }
            Error::Upstream { .. }
            | Error::UpstreamUploadFailed { .. }
            | Error::UpstreamRunFailed { .. }
            | Error::UpstreamRunTimeout { .. }
            | Error::NoAssistantReply => {
                tracing::warn!("Upstream failure: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let mut body = json!({
            "error": self.user_message(),
            "category": self.category(),
        });
        if let Some(detail) = self.upstream_detail() {
            body["details"] = detail.clone();
        }

        (status, Json(body)).into_response()
    }
}

/// Transport-level reqwest failures carry no upstream payload by definition
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Upstream {
            message: err.to_string(),
            detail: None,
        }
    }
}

/// Type alias for relay operation results
pub type Result<T> = std::result::Result<T, Error>;
