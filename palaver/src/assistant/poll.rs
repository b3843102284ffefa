//! Run polling with a bounded ceiling.
//!
//! One routine owns the wait-for-completion loop: poll the run status at a
//! fixed interval, resolve tool calls through the registry whenever the run
//! asks for them, and stop with a tagged outcome once the run is terminal or
//! the attempt ceiling is exhausted. Callers never see a bare boolean or a
//! fabricated success.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::AssistantConfig;
use crate::errors::Result;
use crate::tools::ToolRegistry;

use super::AssistantClient;
use super::models::{RunStatus, ToolOutput};

/// Terminal outcome of waiting for a run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Run completed; the thread now holds the assistant's reply
    Completed,
    /// Run reached a terminal status other than `completed`
    Failed {
        status: RunStatus,
        last_error: Option<Value>,
    },
    /// Attempt ceiling exhausted before a terminal status was observed
    TimedOut { attempts: u32, waited: Duration },
}

/// Polls one run to a terminal state.
pub struct RunPoller<'a> {
    client: &'a AssistantClient,
    interval: Duration,
    max_attempts: u32,
}

impl<'a> RunPoller<'a> {
    pub fn new(client: &'a AssistantClient, config: &AssistantConfig) -> Self {
        Self {
            client,
            interval: config.poll_interval,
            max_attempts: config.poll_max_attempts,
        }
    }

    /// Wait for the run to reach a terminal state.
    ///
    /// A `requires_action` report does not consume the loop silently: each
    /// pending tool call is resolved through `tools` and the outputs are
    /// submitted back keyed by call id before polling resumes. The
    /// sub-protocol may repeat within one run.
    ///
    /// Returns `Err` only for transport-level failures; every run-level
    /// result (including timeout) is a [`RunOutcome`].
    #[instrument(skip(self, tools), fields(thread_id = %thread_id, run_id = %run_id))]
    pub async fn wait(&self, thread_id: &str, run_id: &str, tools: &ToolRegistry) -> Result<RunOutcome> {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;

            let run = self.client.retrieve_run(thread_id, run_id).await?;
            debug!(attempt, status = run.status.as_str(), "Polled run status");

            match run.status {
                RunStatus::Completed => return Ok(RunOutcome::Completed),
                status if status.is_failure() => {
                    return Ok(RunOutcome::Failed {
                        status,
                        last_error: run.last_error,
                    });
                }
                RunStatus::RequiresAction => {
                    let Some(action) = run.required_action else {
                        // Status and action payload disagree; keep polling
                        warn!("Run requires action but carries no pending tool calls");
                        continue;
                    };
                    let outputs = self.resolve_tool_calls(action.submit_tool_outputs.tool_calls, tools).await;
                    self.client.submit_tool_outputs(thread_id, run_id, &outputs).await?;
                }
                _ => {}
            }
        }

        let waited = self.interval * self.max_attempts;
        info!(attempts = self.max_attempts, "Run polling ceiling exhausted");
        Ok(RunOutcome::TimedOut {
            attempts: self.max_attempts,
            waited,
        })
    }

    /// Resolve pending tool calls through the registry.
    ///
    /// Every call gets an output: handler failures and unknown operations
    /// become structured error outputs so the run can terminate upstream
    /// instead of waiting forever on a missing submission.
    async fn resolve_tool_calls(&self, calls: Vec<super::models::ToolCall>, tools: &ToolRegistry) -> Vec<ToolOutput> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let name = call.function.name;
            let output = match tools.dispatch(&name, &call.function.arguments).await {
                Ok(output) => {
                    info!(tool = %name, call_id = %call.id, "Resolved tool call");
                    output
                }
                Err(e) => {
                    warn!(tool = %name, call_id = %call.id, error = %e, "Tool call failed");
                    serde_json::json!({ "error": e.to_string() }).to_string()
                }
            };
            outputs.push(ToolOutput {
                tool_call_id: call.id,
                output,
            });
        }
        outputs
    }
}
