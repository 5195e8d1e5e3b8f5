//! Explicit agent registry, constructed at startup and threaded through the
//! engines. No process-global state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

use super::AnyRunner;
use super::claude::ClaudeRunner;
use super::gemini::GeminiRunner;
use super::mock::MockRunner;

/// Mutable agent configuration, read by runners on every execute so that
/// live settings changes take effect without rebuilding runners.
pub trait AgentConfigSource: Send + Sync {
    fn agent_settings(&self, agent: &str) -> AgentSettings;
}

#[derive(Debug, Clone, Default)]
pub struct AgentSettings {
    /// CLI binary path; empty means the agent's conventional name.
    pub binary: String,
    /// Model used when the request carries no override.
    pub default_model: String,
    pub timeout: Option<Duration>,
}

/// Settings that never change at runtime.
#[derive(Debug, Default)]
pub struct StaticAgentConfig {
    pub settings: HashMap<String, AgentSettings>,
}

impl AgentConfigSource for StaticAgentConfig {
    fn agent_settings(&self, agent: &str) -> AgentSettings {
        self.settings.get(agent).cloned().unwrap_or_default()
    }
}

type Factory = Box<dyn Fn(Arc<dyn AgentConfigSource>) -> AnyRunner + Send + Sync>;

/// Name → factory map. Populated during startup; reads afterwards are
/// unsynchronized by design.
pub struct AgentRegistry {
    factories: HashMap<String, Factory>,
    source: Arc<dyn AgentConfigSource>,
}

impl AgentRegistry {
    /// Registry with the built-in agents: `claude`, `gemini`, `mock`.
    pub fn new(source: Arc<dyn AgentConfigSource>) -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            source,
        };
        registry.register("claude", |src| AnyRunner::Claude(ClaudeRunner::new(src)));
        registry.register("gemini", |src| AnyRunner::Gemini(GeminiRunner::new(src)));
        registry.register("mock", |_| AnyRunner::Mock(MockRunner::default()));
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        factory: impl Fn(Arc<dyn AgentConfigSource>) -> AnyRunner + Send + Sync + 'static,
    ) {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Swap the configuration source runners will read from. Affects
    /// runners created afterwards.
    pub fn set_config_source(&mut self, source: Arc<dyn AgentConfigSource>) {
        self.source = source;
    }

    /// Instantiate a runner. Empty names fall back to `claude`.
    pub fn create(&self, name: &str) -> Result<AnyRunner> {
        let name = if name.is_empty() { "claude" } else { name };
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::AgentUnavailable(format!(
                "unknown agent '{name}' (registered: {})",
                self.names().join(", ")
            ))
        })?;
        Ok(factory(self.source.clone()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
