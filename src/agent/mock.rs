//! Deterministic mock runner for tests and dry runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::{ExecuteRequest, ExecuteResponse, ModelRunner};

/// One scripted reply. When the script is exhausted (or absent) the runner
/// falls back to a deterministic success derived from the prompt.
#[derive(Debug, Clone)]
pub enum MockReply {
    Content(String),
    /// Returned as `Error::AgentExecution` (retryable).
    Retryable(String),
    /// Returned as `Error::AgentUnavailable` (fatal).
    Fatal(String),
}

#[derive(Clone, Default)]
pub struct MockRunner {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    received: Arc<Mutex<Vec<ExecuteRequest>>>,
}

impl MockRunner {
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into())),
            received: Arc::default(),
        }
    }

    /// Append a reply to the script.
    pub fn push(&self, reply: MockReply) {
        self.script.lock().expect("mock script lock").push_back(reply);
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().expect("mock script lock").len()
    }

    /// Requests observed so far, in call order.
    pub fn received(&self) -> Vec<ExecuteRequest> {
        self.received.lock().expect("mock received lock").clone()
    }
}

impl ModelRunner for MockRunner {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        req: &ExecuteRequest,
    ) -> Result<ExecuteResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.received.lock().expect("mock received lock").push(req.clone());
        let next = self.script.lock().expect("mock script lock").pop_front();
        match next {
            Some(MockReply::Content(content)) => Ok(ExecuteResponse {
                content,
                model: "mock".to_string(),
                elapsed: Duration::ZERO,
            }),
            Some(MockReply::Retryable(message)) => Err(Error::AgentExecution(message)),
            Some(MockReply::Fatal(message)) => Err(Error::AgentUnavailable(message)),
            None => Ok(ExecuteResponse {
                content: format!("mock response ({} prompt bytes)", req.prompt.len()),
                model: "mock".to_string(),
                elapsed: Duration::ZERO,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
