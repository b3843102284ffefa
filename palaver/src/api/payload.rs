//! Request payload decoding.
//!
//! The chat endpoint accepts two encodings, dispatched on the content-type
//! header by one tested routine:
//!
//! - `application/json` with `message`, `threadId`, and optionally a file as
//!   a `data:<mime>;base64,<bytes>` data URL plus `fileName`
//! - `multipart/form-data` with `message`, `file`, and `threadId` fields
//!
//! The multipart boundary is extracted defensively: a content-type header
//! without a usable `boundary=` parameter is a client error, never a decode
//! attempt or a crash. Anything that is neither encoding is rejected naming
//! the offending type.

use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

use crate::errors::{Error, Result};

/// A single attachment extracted from the request.
#[derive(Debug, Clone)]
pub struct AttachedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// The decoded chat request, independent of its wire encoding.
#[derive(Debug, Default)]
pub struct DecodedRequest {
    pub message: Option<String>,
    pub file: Option<AttachedFile>,
    pub thread_id: Option<String>,
}

/// Supported request encodings.
#[derive(Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    Multipart { boundary: String },
}

/// Classify the content-type header into a supported encoding.
///
/// Multipart classification extracts the boundary here so that a malformed
/// header fails before the body is ever touched.
pub fn classify(content_type: Option<&str>) -> Result<PayloadKind> {
    let content_type = content_type.unwrap_or("").trim();
    let essence = content_type.split(';').next().unwrap_or("").trim();

    if essence.eq_ignore_ascii_case("application/json") {
        return Ok(PayloadKind::Json);
    }

    if essence.eq_ignore_ascii_case("multipart/form-data") {
        let boundary = multer::parse_boundary(content_type).map_err(|e| Error::MalformedMultipart {
            message: format!("content-type header has no usable boundary: {e}"),
        })?;
        return Ok(PayloadKind::Multipart { boundary });
    }

    Err(Error::UnsupportedContentType {
        content_type: if content_type.is_empty() {
            "(none)".to_string()
        } else {
            content_type.to_string()
        },
    })
}

/// Decode a request body into a [`DecodedRequest`].
pub async fn decode(content_type: Option<&str>, body: Bytes, max_upload_bytes: u64) -> Result<DecodedRequest> {
    match classify(content_type)? {
        PayloadKind::Json => decode_json(&body, max_upload_bytes),
        PayloadKind::Multipart { boundary } => decode_multipart(body, &boundary, max_upload_bytes).await,
    }
}

/// JSON wire shape of the chat request.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonChatRequest {
    message: Option<String>,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
    /// Attachment as a `data:<mime>;base64,<bytes>` data URL
    file: Option<String>,
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

fn decode_json(body: &[u8], max_upload_bytes: u64) -> Result<DecodedRequest> {
    let request: JsonChatRequest = serde_json::from_slice(body).map_err(|e| Error::BadRequest {
        message: format!("Invalid JSON body: {e}"),
    })?;

    let file = match request.file {
        Some(data_url) => Some(decode_data_url(&data_url, request.file_name.as_deref(), max_upload_bytes)?),
        None => None,
    };

    Ok(DecodedRequest {
        message: request.message,
        file,
        thread_id: request.thread_id,
    })
}

/// Decode a `data:<mime>;base64,<bytes>` data URL into an attachment.
fn decode_data_url(data_url: &str, file_name: Option<&str>, max_upload_bytes: u64) -> Result<AttachedFile> {
    let invalid = || Error::BadRequest {
        message: "file must be a data:<mime>;base64,<bytes> data URL".to_string(),
    };

    let rest = data_url.strip_prefix("data:").ok_or_else(invalid)?;
    let (content_type, encoded) = rest.split_once(";base64,").ok_or_else(invalid)?;
    if content_type.is_empty() {
        return Err(invalid());
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::BadRequest {
            message: format!("file data URL holds invalid base64: {e}"),
        })?;

    if bytes.len() as u64 > max_upload_bytes {
        return Err(Error::PayloadTooLarge {
            message: format!(
                "Attachment exceeds maximum allowed size of {} bytes ({} MB)",
                max_upload_bytes,
                max_upload_bytes / (1024 * 1024)
            ),
        });
    }

    let filename = file_name
        .map(str::to_string)
        .unwrap_or_else(|| default_filename(content_type));

    Ok(AttachedFile {
        filename,
        content_type: content_type.to_string(),
        bytes: Bytes::from(bytes),
    })
}

/// Pick a filename for attachments that arrived without one.
fn default_filename(content_type: &str) -> String {
    let extension = mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or("bin");
    format!("upload.{extension}")
}

async fn decode_multipart(body: Bytes, boundary: &str, max_upload_bytes: u64) -> Result<DecodedRequest> {
    let stream = futures::stream::once(async move { Ok::<Bytes, std::convert::Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut decoded = DecodedRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| Error::MalformedMultipart {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "message" => {
                decoded.message = Some(field.text().await.map_err(|e| Error::MalformedMultipart {
                    message: format!("Failed to read message field: {e}"),
                })?);
            }
            "threadId" => {
                decoded.thread_id = Some(field.text().await.map_err(|e| Error::MalformedMultipart {
                    message: format!("Failed to read threadId field: {e}"),
                })?);
            }
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(|m| m.to_string());

                let bytes = field.bytes().await.map_err(|e| Error::MalformedMultipart {
                    message: format!("Failed to read file field: {e}"),
                })?;
                if bytes.len() as u64 > max_upload_bytes {
                    return Err(Error::PayloadTooLarge {
                        message: format!(
                            "Attachment exceeds maximum allowed size of {} bytes ({} MB)",
                            max_upload_bytes,
                            max_upload_bytes / (1024 * 1024)
                        ),
                    });
                }

                let filename = filename.unwrap_or_else(|| "upload.bin".to_string());
                let content_type = content_type
                    .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());

                decoded.file = Some(AttachedFile {
                    filename,
                    content_type,
                    bytes,
                });
            }
            other => {
                // Unknown fields are skipped rather than rejected so widget
                // revisions can add fields without breaking older relays
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(decoded)
}
