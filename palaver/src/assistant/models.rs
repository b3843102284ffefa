//! Wire types for the upstream assistant service (Assistants v2 REST dialect).
//!
//! Only the fields the relay actually reads are modeled; everything else the
//! upstream returns is ignored on deserialization. Identifiers are kept as
//! opaque strings throughout - the relay never interprets their structure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation thread, identified by an opaque handle.
#[derive(Debug, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// A file registered with the upstream service.
#[derive(Debug, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Status of an asynchronous run, as reported by the upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// Terminal statuses that mean the run will never complete.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Failed | RunStatus::Incomplete | RunStatus::Expired
        )
    }

    /// Snake-case name matching the upstream wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        }
    }
}

/// One asynchronous unit of work on the upstream service.
#[derive(Debug, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    /// Present while the run waits for tool outputs from the caller
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    /// Upstream error payload for failed runs
    #[serde(default)]
    pub last_error: Option<Value>,
}

/// Action the upstream service requires before the run can continue.
#[derive(Debug, Deserialize)]
pub struct RequiredAction {
    pub submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCall>,
}

/// A request, emitted mid-run, for the caller to perform an external
/// computation and supply its result.
#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: ToolFunction,
}

#[derive(Debug, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    /// JSON-encoded argument object, passed through verbatim
    pub arguments: String,
}

/// A computed result submitted back to a pending run, keyed by call id.
#[derive(Debug, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageList {
    pub data: Vec<ThreadMessage>,
}

/// Author role of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

/// One message in a conversation thread.
#[derive(Debug, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub created_at: i64,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    /// Files the message references (e.g. generated by the code interpreter)
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
}

impl ThreadMessage {
    /// All textual segments of the message, in order.
    pub fn text_segments(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|part| match part {
            MessageContent::Text { text } => Some(text.value.as_str()),
            _ => None,
        })
    }

    /// Id of the first generated file this message carries, if any.
    ///
    /// Generated files surface either as an attachment or as an image-file
    /// content part depending on which upstream tool produced them.
    pub fn generated_file_id(&self) -> Option<&str> {
        if let Some(attachment) = self.attachments.first() {
            return Some(attachment.file_id.as_str());
        }
        self.content.iter().find_map(|part| match part {
            MessageContent::ImageFile { image_file } => Some(image_file.file_id.as_str()),
            _ => None,
        })
    }
}

/// One content part of a thread message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    ImageFile { image_file: FileReference },
    /// Content kinds the relay does not render (image URLs, refusals, ...)
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct FileReference {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageAttachment {
    pub file_id: String,
}
