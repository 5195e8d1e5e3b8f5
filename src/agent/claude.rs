//! Anthropic-family CLI runner.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::process::{ProcessConfig, spawn_and_stream};

use super::registry::{AgentConfigSource, AgentSettings};
use super::{ExecuteRequest, ExecuteResponse, ModelRunner};

const DEFAULT_BINARY: &str = "claude";

#[derive(Clone)]
pub struct ClaudeRunner {
    source: Arc<dyn AgentConfigSource>,
}

impl ClaudeRunner {
    pub fn new(source: Arc<dyn AgentConfigSource>) -> Self {
        Self { source }
    }

    /// Live settings, read once per execute.
    pub fn settings(&self) -> AgentSettings {
        self.source.agent_settings("claude")
    }

    /// Build the CLI invocation for a prompt and optional model.
    pub fn build_command(settings: &AgentSettings, prompt: &str, model: &str) -> (String, Vec<String>) {
        let binary = if settings.binary.is_empty() {
            DEFAULT_BINARY.to_string()
        } else {
            settings.binary.clone()
        };

        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        if !model.is_empty() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push("-p".to_string());
        args.push(prompt.to_string());

        (binary, args)
    }
}

impl ModelRunner for ClaudeRunner {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        req: &ExecuteRequest,
    ) -> Result<ExecuteResponse> {
        let settings = self.settings();
        let model = req
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| settings.default_model.clone());
        let (command, args) = Self::build_command(&settings, &req.prompt, &model);

        let config = ProcessConfig {
            command,
            args,
            working_dir: req.work_dir.clone(),
            timeout: req.timeout.or(settings.timeout),
            log_prefix: "agent:claude".to_string(),
            env: vec![],
            stdin_data: None,
        };

        let started = Instant::now();
        let output = spawn_and_stream(cancel, config).await?;

        if let Some(sig) = output.signal {
            return Err(Error::AgentExecution(format!("claude killed by signal {sig}")));
        }
        if output.exit_code != 0 {
            return Err(Error::AgentExecution(format!(
                "claude exited with code {}: {}",
                output.exit_code,
                output.stderr_lines.join("\n")
            )));
        }

        Ok(ExecuteResponse {
            content: output.stdout_lines.join("\n"),
            model: if model.is_empty() { "default".to_string() } else { model },
            elapsed: started.elapsed(),
        })
    }

    fn name(&self) -> &'static str {
        "claude"
    }
}
