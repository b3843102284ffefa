//! The chat relay handler.
//!
//! One stateless request pipeline: decode the payload, upload the attachment
//! if present, reuse or create the conversation thread, post the message,
//! run the assistant and poll to completion, then map the newest assistant
//! message back onto HTTP - JSON for text, an attachment body for generated
//! files.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{info, instrument};

use crate::AppState;
use crate::api::models::chat::ChatResponse;
use crate::api::payload;
use crate::assistant::models::ThreadMessage;
use crate::assistant::poll::{RunOutcome, RunPoller};
use crate::errors::{Error, Result};

/// Text substituted when the request carried a file but no message.
/// The upstream service rejects empty message content.
const FILE_ONLY_PLACEHOLDER: &str = "file attached";

/// Default name for generated files whose upstream metadata is unavailable
const GENERATED_FILE_FALLBACK_NAME: &str = "result.pdf";

#[utoipa::path(
    post,
    path = "/api/v1/chat",
    tag = "chat",
    summary = "Relay a chat message",
    description = "Forward a message and/or a single file attachment to the assistant service and \
                   wait for its reply. Accepts `application/json` or `multipart/form-data`. \
                   Returns JSON for textual replies, or the generated file as an attachment body.",
    request_body(content = crate::api::models::chat::ChatRequestBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Assistant replied", body = ChatResponse),
        (status = 400, description = "Malformed or empty request", body = crate::api::models::chat::ChatError),
        (status = 405, description = "Method not allowed", body = crate::api::models::chat::ChatError),
        (status = 415, description = "Unsupported content type", body = crate::api::models::chat::ChatError),
        (status = 502, description = "Upstream service failure", body = crate::api::models::chat::ChatError),
        (status = 504, description = "Assistant run timed out", body = crate::api::models::chat::ChatError)
    )
)]
#[instrument(skip_all)]
pub async fn relay_chat(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let decoded = payload::decode(content_type, body, state.config.limits.max_upload_bytes).await?;

    // An all-whitespace message counts as absent
    let message = decoded
        .message
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty());
    if message.is_none() && decoded.file.is_none() {
        return Err(Error::EmptyRequest);
    }

    let client = &state.assistant;

    let file_id = match &decoded.file {
        Some(file) => Some(client.upload_file(&file.filename, &file.content_type, file.bytes.clone()).await?),
        None => None,
    };

    // Reuse the caller's handle verbatim; only mint a new thread without one
    let thread_id = match decoded.thread_id {
        Some(thread_id) => thread_id,
        None => client.create_thread().await?,
    };

    let text = message.unwrap_or(FILE_ONLY_PLACEHOLDER);
    client.create_message(&thread_id, text, file_id.as_deref()).await?;

    let run = client.create_run(&thread_id).await?;
    let outcome = RunPoller::new(client, &state.config.assistant)
        .wait(&thread_id, &run.id, &state.tools)
        .await?;

    match outcome {
        RunOutcome::Completed => {}
        RunOutcome::Failed { status, last_error } => {
            return Err(Error::UpstreamRunFailed {
                status: status.as_str().to_string(),
                detail: last_error,
            });
        }
        RunOutcome::TimedOut { attempts, waited } => {
            return Err(Error::UpstreamRunTimeout { attempts, waited });
        }
    }

    let messages = client.list_messages(&thread_id).await?;
    let reply = newest_assistant_message(&messages).ok_or(Error::NoAssistantReply)?;

    if let Some(file_id) = reply.generated_file_id() {
        return generated_file_response(&state, file_id).await;
    }

    let text = reply.text_segments().collect::<Vec<_>>().join("\n").trim().to_string();
    info!(thread_id = %thread_id, reply_chars = text.len(), "Relayed assistant reply");

    Ok(Json(ChatResponse {
        message: text,
        thread_id,
    })
    .into_response())
}

/// The most recent assistant-authored message of a thread.
///
/// Continued threads always contain assistant messages from earlier turns,
/// so selection orders by creation time rather than trusting list order.
fn newest_assistant_message(messages: &[ThreadMessage]) -> Option<&ThreadMessage> {
    messages
        .iter()
        .filter(|m| m.role == crate::assistant::models::MessageRole::Assistant)
        .max_by_key(|m| m.created_at)
}

/// Stream a generated file back as an attachment.
async fn generated_file_response(state: &AppState, file_id: &str) -> Result<Response> {
    let filename = match state.assistant.file_metadata(file_id).await {
        Ok(metadata) => metadata.filename.unwrap_or_else(|| GENERATED_FILE_FALLBACK_NAME.to_string()),
        // Metadata is cosmetic; the content download decides success
        Err(_) => GENERATED_FILE_FALLBACK_NAME.to_string(),
    };
    let bytes = state.assistant.file_content(file_id).await?;

    let content_type = mime_guess::from_path(&filename)
        .first_raw()
        .unwrap_or("application/pdf");

    info!(file_id = %file_id, filename = %filename, size = bytes.len(), "Relaying generated file");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", sanitize_filename(&filename)),
        )
        .body(Body::from(bytes))
        .map_err(|e| Error::Other(e.into()))
}

/// Strip characters that would break the Content-Disposition header
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

/// Structured 405 for non-POST methods on the chat route.
pub async fn method_not_allowed(method: Method) -> Error {
    Error::MethodNotAllowed {
        method: method.to_string(),
    }
}
