//! HTTP client for the companion computation backend.
//!
//! The backend's operations are opaque to the relay: an operation name maps
//! to a path under the configured base URL, arguments are forwarded as a
//! JSON body, and the response body is returned verbatim as the tool output.

use anyhow::Context;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::ComputeConfig;

pub struct ComputeClient {
    client: Client,
    base_url: String,
}

impl ComputeClient {
    pub fn new(config: &ComputeConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create compute backend HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Invoke one operation and return its response body as the tool output.
    #[instrument(skip(self, arguments))]
    pub async fn call(&self, operation: &str, arguments: &Value) -> anyhow::Result<String> {
        // Operation names come from the upstream assistant configuration;
        // constrain them to path-safe characters before building a URL.
        if !operation.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            anyhow::bail!("compute operation has non path-safe name: {operation:?}");
        }

        let url = format!("{}/{}", self.base_url, operation);
        let response = self
            .client
            .post(&url)
            .json(arguments)
            .send()
            .await
            .with_context(|| format!("compute backend request to {url} failed"))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("compute backend returned HTTP {status}: {body}");
        }

        debug!(operation, bytes = body.len(), "Compute backend call succeeded");
        Ok(body)
    }
}
