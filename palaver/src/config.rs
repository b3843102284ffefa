//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `PALAVER_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `PALAVER_` override YAML values
//! 3. **ASSISTANT_API_KEY** - Special case: overrides `assistant.api_key` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `PALAVER_ASSISTANT__POLL_MAX_ATTEMPTS=10` sets the `assistant.poll_max_attempts` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! PALAVER_PORT=8080
//!
//! # Set the upstream credential (preferred method)
//! ASSISTANT_API_KEY="sk-..."
//!
//! # Or use PALAVER_ASSISTANT__API_KEY
//! PALAVER_ASSISTANT__API_KEY="sk-..."
//!
//! # Override nested values
//! PALAVER_ASSISTANT__ASSISTANT_ID=asst_abc123
//! PALAVER_ASSISTANT__POLL_INTERVAL=500ms
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "PALAVER_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upstream assistant service configuration
    pub assistant: AssistantConfig,
    /// Companion computation backend used by the tool-call extension.
    /// When absent, pending tool calls are answered with an error output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute: Option<ComputeConfig>,
    /// Resource limits for protecting system capacity
    pub limits: LimitsConfig,
    /// CORS configuration for the chat endpoint
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Upstream assistant service configuration.
///
/// The relay speaks the Assistants v2 REST dialect against `base_url` using
/// `api_key` as a bearer credential. `assistant_id` selects which assistant
/// configuration runs are started against.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssistantConfig {
    /// Base URL of the assistant API (e.g., "https://api.openai.com/v1")
    pub base_url: Url,
    /// API credential. Required; usually supplied via ASSISTANT_API_KEY.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Assistant configuration identifier runs are started against. Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    /// Optional vector store attached to file uploads for file-search indexing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_store_id: Option<String>,
    /// Fixed delay between run status polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Maximum number of status polls before the run is declared timed out
    pub poll_max_attempts: u32,
    /// Timeout applied to each individual upstream HTTP request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.openai.com/v1").expect("valid default URL"),
            api_key: None,
            assistant_id: None,
            vector_store_id: None,
            poll_interval: Duration::from_secs(1),
            poll_max_attempts: 30,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Companion computation backend configuration.
///
/// Tool calls emitted by a run are forwarded here as JSON-over-HTTP requests;
/// the backend's operations and payloads are opaque to the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeConfig {
    /// Base URL of the computation backend
    pub base_url: Url,
    /// Timeout for a single computation request
    #[serde(default = "default_compute_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_compute_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Request limits configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum accepted size in bytes for an uploaded attachment.
    /// Default: 20MB, matching the upstream service's own per-file ceiling.
    pub max_upload_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * 1024 * 1024, // 20MB
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// CORS configuration for browser clients hosted on other origins.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins. The widget is served from the relay itself, so the
    /// default is empty; add origins here when embedding the widget elsewhere.
    pub allowed_origins: Vec<CorsOrigin>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            assistant: AssistantConfig::default(),
            compute: None,
            limits: LimitsConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("PALAVER_").split("__"))
            // Common bare credential pattern, mirroring the upstream SDKs
            .merge(
                Env::raw()
                    .only(&["ASSISTANT_API_KEY"])
                    .map(|_| "assistant__api_key".into())
                    .split("__"),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.assistant.api_key.is_none() {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: assistant.api_key is not configured. \
                 Please set the ASSISTANT_API_KEY environment variable or add assistant.api_key to the config file."
            )));
        }

        if self.assistant.assistant_id.is_none() {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: assistant.assistant_id is not configured. \
                 Please set PALAVER_ASSISTANT__ASSISTANT_ID or add assistant.assistant_id to the config file."
            )));
        }

        if self.assistant.poll_max_attempts == 0 {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: assistant.poll_max_attempts must be at least 1"
            )));
        }

        Ok(())
    }
}
