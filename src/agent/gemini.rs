//! Google-family CLI runner. The prompt is fed through stdin.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::process::{ProcessConfig, spawn_and_stream};

use super::registry::{AgentConfigSource, AgentSettings};
use super::{ExecuteRequest, ExecuteResponse, ModelRunner};

const DEFAULT_BINARY: &str = "gemini";
const DEFAULT_MODEL: &str = "gemini-2.5-pro";

#[derive(Clone)]
pub struct GeminiRunner {
    source: Arc<dyn AgentConfigSource>,
}

impl GeminiRunner {
    pub fn new(source: Arc<dyn AgentConfigSource>) -> Self {
        Self { source }
    }

    pub fn settings(&self) -> AgentSettings {
        self.source.agent_settings("gemini")
    }

    pub fn build_command(settings: &AgentSettings, model: &str) -> (String, Vec<String>) {
        let binary = if settings.binary.is_empty() {
            DEFAULT_BINARY.to_string()
        } else {
            settings.binary.clone()
        };

        let mut args = vec!["--yolo".to_string()];
        if !model.is_empty() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }

        (binary, args)
    }
}

impl ModelRunner for GeminiRunner {
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
            .or_else(|| {
                if settings.default_model.is_empty() {
                    None
                } else {
                    Some(settings.default_model.clone())
                }
            })
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let (command, args) = Self::build_command(&settings, &model);

        let config = ProcessConfig {
            command,
            args,
            working_dir: req.work_dir.clone(),
            timeout: req.timeout.or(settings.timeout),
            log_prefix: "agent:gemini".to_string(),
            env: vec![],
            stdin_data: Some(req.prompt.clone()),
        };

        let started = Instant::now();
        let output = spawn_and_stream(cancel, config).await?;

        if let Some(sig) = output.signal {
            return Err(Error::AgentExecution(format!("gemini killed by signal {sig}")));
        }
        if output.exit_code != 0 {
            return Err(Error::AgentExecution(format!(
                "gemini exited with code {}: {}",
                output.exit_code,
                output.stderr_lines.join("\n")
            )));
        }

        Ok(ExecuteResponse {
            content: output.stdout_lines.join("\n"),
            model,
            elapsed: started.elapsed(),
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
