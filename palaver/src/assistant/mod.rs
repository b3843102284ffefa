//! Client for the upstream assistant service.
//!
//! This module owns every HTTP exchange with the hosted assistant API:
//! uploading attachments, creating threads, posting messages, starting and
//! polling runs, submitting tool outputs, and downloading generated files.
//! The relay treats the service as an opaque collaborator - identifiers it
//! issues (thread, file, run, tool-call ids) are passed through verbatim.
//!
//! Requests are authenticated with a bearer credential and pinned to the
//! Assistants v2 dialect via the `OpenAI-Beta` header. Non-2xx upstream
//! responses are surfaced as [`Error::Upstream`] (or
//! [`Error::UpstreamUploadFailed`] for the upload step) carrying the
//! service's own error payload so callers can report it.

pub mod models;
pub mod poll;

use crate::config::AssistantConfig;
use crate::errors::{Error, Result};
use anyhow::Context;
use bytes::Bytes;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use models::{FileObject, MessageList, Run, Thread, ThreadMessage, ToolOutput};

/// Purpose tag required by the upstream file endpoint for assistant inputs
const FILE_PURPOSE: &str = "assistants";

/// HTTP client for the upstream assistant service.
pub struct AssistantClient {
    client: Client,
    base_url: String,
    assistant_id: String,
    vector_store_id: Option<String>,
}

impl AssistantClient {
    /// Build a client from validated configuration.
    ///
    /// Fails if the credential or assistant id is missing, or if the
    /// underlying HTTP client cannot be constructed.
    pub fn new(config: &AssistantConfig) -> anyhow::Result<Self> {
        let api_key = config.api_key.as_deref().context("assistant.api_key is not configured")?;
        let assistant_id = config
            .assistant_id
            .clone()
            .context("assistant.assistant_id is not configured")?;

        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("assistant.api_key contains invalid header characters")?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", reqwest::header::HeaderValue::from_static("assistants=v2"));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create assistant HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            assistant_id,
            vector_store_id: config.vector_store_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Decode a response, mapping non-2xx statuses to `Error::Upstream`
    /// with the service's own error payload attached.
    async fn expect_json<T: serde::de::DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.json::<Value>().await.ok();
            return Err(Error::Upstream {
                message: format!("{what} returned HTTP {status}"),
                detail,
            });
        }
        response.json::<T>().await.map_err(|e| Error::Upstream {
            message: format!("{what} returned an undecodable body: {e}"),
            detail: None,
        })
    }

    /// Register a file with the upstream service and return its asset id.
    ///
    /// If a vector store is configured, the uploaded file is additionally
    /// attached to it for file-search indexing; indexing failures are logged
    /// and do not fail the request, since the asset itself is usable.
    #[instrument(skip(self, bytes), fields(filename = %filename, size = bytes.len()))]
    pub async fn upload_file(&self, filename: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        let part = reqwest::multipart::Part::stream(reqwest::Body::from(bytes))
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| Error::BadRequest {
                message: format!("Invalid attachment MIME type: {e}"),
            })?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", FILE_PURPOSE)
            .part("file", part);

        let response = self.client.post(self.url("files")).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.json::<Value>().await.ok();
            return Err(Error::UpstreamUploadFailed { detail });
        }
        let file: FileObject = response.json().await.map_err(|e| Error::Upstream {
            message: format!("file upload returned an undecodable body: {e}"),
            detail: None,
        })?;

        debug!(file_id = %file.id, "Uploaded attachment to upstream service");

        if let Some(vector_store_id) = &self.vector_store_id {
            let result = self
                .client
                .post(self.url(&format!("vector_stores/{vector_store_id}/files")))
                .json(&json!({ "file_id": file.id }))
                .send()
                .await;
            match result {
                Ok(r) if r.status().is_success() => {
                    debug!(file_id = %file.id, vector_store_id = %vector_store_id, "Attached file to vector store");
                }
                Ok(r) => {
                    warn!(file_id = %file.id, status = %r.status(), "Vector store indexing failed, continuing without it");
                }
                Err(e) => {
                    warn!(file_id = %file.id, error = %e, "Vector store indexing failed, continuing without it");
                }
            }
        }

        Ok(file.id)
    }

    /// Create a new conversation thread and return its opaque handle.
    #[instrument(skip(self))]
    pub async fn create_thread(&self) -> Result<String> {
        let response = self.client.post(self.url("threads")).json(&json!({})).send().await?;
        let thread: Thread = Self::expect_json(response, "thread creation").await?;
        debug!(thread_id = %thread.id, "Created new conversation thread");
        Ok(thread.id)
    }

    /// Post a user message to a thread, optionally referencing an uploaded
    /// asset so the upstream service's tools can read it.
    #[instrument(skip(self, text), fields(thread_id = %thread_id))]
    pub async fn create_message(&self, thread_id: &str, text: &str, file_id: Option<&str>) -> Result<()> {
        let mut body = json!({
            "role": "user",
            "content": text,
        });
        if let Some(file_id) = file_id {
            body["attachments"] = json!([{
                "file_id": file_id,
                "tools": [{"type": "code_interpreter"}, {"type": "file_search"}],
            }]);
        }

        let response = self
            .client
            .post(self.url(&format!("threads/{thread_id}/messages")))
            .json(&body)
            .send()
            .await?;
        Self::expect_json::<Value>(response, "message creation").await?;
        Ok(())
    }

    /// Start a run of the configured assistant against a thread.
    #[instrument(skip(self), fields(thread_id = %thread_id))]
    pub async fn create_run(&self, thread_id: &str) -> Result<Run> {
        let response = self
            .client
            .post(self.url(&format!("threads/{thread_id}/runs")))
            .json(&json!({ "assistant_id": self.assistant_id }))
            .send()
            .await?;
        let run: Run = Self::expect_json(response, "run creation").await?;
        debug!(run_id = %run.id, status = run.status.as_str(), "Started assistant run");
        Ok(run)
    }

    /// Fetch the current status of a run.
    pub async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let response = self
            .client
            .get(self.url(&format!("threads/{thread_id}/runs/{run_id}")))
            .send()
            .await?;
        Self::expect_json(response, "run retrieval").await
    }

    /// Submit computed tool outputs for a run waiting on them.
    #[instrument(skip(self, outputs), fields(thread_id = %thread_id, run_id = %run_id, count = outputs.len()))]
    pub async fn submit_tool_outputs(&self, thread_id: &str, run_id: &str, outputs: &[ToolOutput]) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs")))
            .json(&json!({ "tool_outputs": outputs }))
            .send()
            .await?;
        Self::expect_json::<Value>(response, "tool output submission").await?;
        Ok(())
    }

    /// List the messages of a thread, newest first.
    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let response = self
            .client
            .get(self.url(&format!("threads/{thread_id}/messages")))
            .send()
            .await?;
        let list: MessageList = Self::expect_json(response, "message listing").await?;
        Ok(list.data)
    }

    /// Fetch the metadata of an uploaded or generated file.
    pub async fn file_metadata(&self, file_id: &str) -> Result<FileObject> {
        let response = self.client.get(self.url(&format!("files/{file_id}"))).send().await?;
        Self::expect_json(response, "file metadata retrieval").await
    }

    /// Download the raw content of a generated file.
    pub async fn file_content(&self, file_id: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(self.url(&format!("files/{file_id}/content")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.json::<Value>().await.ok();
            return Err(Error::Upstream {
                message: format!("file download returned HTTP {status}"),
                detail,
            });
        }
        response.bytes().await.map_err(Error::from)
    }
}
