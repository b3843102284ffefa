//! Request/response data structures for the chat endpoint.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Successful textual reply.
///
/// `threadId` is the opaque conversation handle issued by the upstream
/// service; clients send it back on the next request to continue the same
/// conversation. Binary replies bypass this shape and are returned as an
/// attachment body instead.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    /// The assistant's reply text
    pub message: String,
    /// Opaque conversation handle to supply on the next request
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

/// Structured error body returned on every failure path.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatError {
    /// Human-readable description of the failure
    pub error: String,
    /// Stable snake_case failure category
    pub category: String,
    /// The upstream service's own error payload, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

/// JSON request body (the multipart encoding carries the same fields).
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequestBody {
    /// Message text; may be omitted when a file is attached
    pub message: Option<String>,
    /// Conversation handle from a previous response
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    /// Attachment as a `data:<mime>;base64,<bytes>` data URL
    pub file: Option<String>,
    /// Filename for the data URL attachment
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
}
