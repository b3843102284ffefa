//! Pluggable tool-call resolution.
//!
//! A run may pause and ask the caller to perform an external computation
//! before it can finish. The set of supported operations is expected to
//! grow, so resolution goes through a registry mapping operation names to
//! async callbacks instead of hard-coded branching. A registry may also
//! carry a fallback that receives every unregistered operation - the
//! compute-backend integration uses this to forward arbitrary operations
//! without enumerating them here.

pub mod compute;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::ComputeConfig;

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;
type Fallback = Arc<dyn Fn(String, Value) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Maps tool-call operation names to external computations.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Handler>,
    fallback: Option<Fallback>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry whose fallback forwards every operation to the
    /// companion computation backend.
    pub fn with_compute_backend(config: &ComputeConfig) -> anyhow::Result<Self> {
        let client = Arc::new(compute::ComputeClient::new(config)?);
        let mut registry = Self::new();
        registry.set_fallback(move |operation, arguments| {
            let client = client.clone();
            Box::pin(async move { client.call(&operation, &arguments).await })
        });
        Ok(registry)
    }

    /// Register a handler for one operation name.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(move |args| Box::pin(handler(args))));
    }

    /// Install the fallback invoked for operations with no registered handler.
    pub fn set_fallback<F>(&mut self, fallback: F)
    where
        F: Fn(String, Value) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
    }

    /// Resolve one tool call.
    ///
    /// `arguments` is the upstream's JSON-encoded argument string; it is
    /// decoded here once so handlers receive a structured value. Unknown
    /// operations (no handler, no fallback) are an error - the caller turns
    /// that into a structured error output.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> anyhow::Result<String> {
        let args: Value = if arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| anyhow::anyhow!("tool call arguments are not valid JSON: {e}"))?
        };

        if let Some(handler) = self.handlers.get(name) {
            return handler(args).await;
        }
        if let Some(fallback) = &self.fallback {
            return fallback(name.to_string(), args).await;
        }
        anyhow::bail!("unsupported tool: {name}")
    }
}
