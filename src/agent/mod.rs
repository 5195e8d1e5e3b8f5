//! The model-runner abstraction: a uniform contract for invoking pluggable
//! agents with timeouts, cancellation, and retryable-error classification.

pub mod claude;
pub mod gemini;
pub mod mock;
pub mod registry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Error, Result, is_retryable};

pub use registry::{AgentConfigSource, AgentRegistry, AgentSettings};

/// One agent invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub work_dir: PathBuf,
    /// Overrides the agent's default model when set.
    pub model: Option<String>,
    /// Overrides the agent's configured timeout when set.
    pub timeout: Option<Duration>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExecuteResponse {
    pub content: String,
    pub model: String,
    pub elapsed: Duration,
}

/// Uniform agent contract. Implementations honor cancellation, enforce the
/// timeout, and measure elapsed time; they never encode retry policy.
pub trait ModelRunner {
    fn execute(
        &self,
        cancel: &CancellationToken,
        req: &ExecuteRequest,
    ) -> impl Future<Output = Result<ExecuteResponse>> + Send;

    fn name(&self) -> &'static str;
}

/// Closed dispatch over the built-in runners.
#[derive(Clone)]
pub enum AnyRunner {
    Claude(claude::ClaudeRunner),
    Gemini(gemini::GeminiRunner),
    Mock(mock::MockRunner),
}

impl std::fmt::Debug for AnyRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnyRunner::Claude(_) => f.write_str("AnyRunner::Claude"),
            AnyRunner::Gemini(_) => f.write_str("AnyRunner::Gemini"),
            AnyRunner::Mock(_) => f.write_str("AnyRunner::Mock"),
        }
    }
}

impl ModelRunner for AnyRunner {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        req: &ExecuteRequest,
    ) -> Result<ExecuteResponse> {
        match self {
            AnyRunner::Claude(r) => r.execute(cancel, req).await,
            AnyRunner::Gemini(r) => r.execute(cancel, req).await,
            AnyRunner::Mock(r) => r.execute(cancel, req).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AnyRunner::Claude(r) => r.name(),
            AnyRunner::Gemini(r) => r.name(),
            AnyRunner::Mock(r) => r.name(),
        }
    }
}

/// Retry schedule shared by both engines: the delay starts at
/// `initial_delay`, doubles per attempt, and is capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(300),
        }
    }
}

/// Execute with bounded retries. Only retryable errors are retried; the
/// wait is interruptible by cancellation. Fatal errors and the last
/// attempt's error propagate unchanged.
pub async fn execute_with_retry(
    runner: &AnyRunner,
    cancel: &CancellationToken,
    req: &ExecuteRequest,
    policy: RetryPolicy,
) -> Result<ExecuteResponse> {
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;

    for attempt in 1..=attempts {
        match runner.execute(cancel, req).await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                warn!(
                    agent = runner.name(),
                    attempt,
                    backoff_secs = delay.as_secs(),
                    error = %e,
                    "retrying agent call after transient error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!()
}
