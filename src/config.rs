//! Process-level runtime settings and the read-through configuration
//! provider the engines consult at each relevant call site.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;

use crate::agent::{AgentConfigSource, AgentSettings, RetryPolicy};
use crate::cli::Cli;
use crate::error::{Error, Result};

const DEFAULT_CONFIG_FILE: &str = ".scopeview/config.toml";
/// Retry delays double per attempt and never exceed this.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub review_workers: Option<usize>,
    pub report_workers: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub agent_timeout_secs: Option<u64>,
    pub agent_model: Option<String>,
    pub claude_binary: Option<String>,
    pub gemini_binary: Option<String>,
    pub output_dir: Option<String>,
    pub state_dir: Option<String>,
    pub workspace_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub review_workers: usize,
    pub report_workers: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub agent_timeout: Option<Duration>,
    pub agent_model: String,
    pub claude_binary: String,
    pub gemini_binary: String,
    pub output_dir: String,
    pub state_dir: String,
    pub workspace_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        merge(SettingsFile::default(), &NO_OVERRIDES).expect("defaults are valid")
    }
}

/// CLI-shaped overrides without requiring a parsed CLI (tests, defaults).
#[derive(Debug, Default)]
pub struct Overrides {
    pub state_dir: Option<String>,
    pub agent_binary: Option<String>,
    pub agent_model: Option<String>,
    pub agent_timeout: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<u64>,
    pub review_workers: Option<usize>,
    pub report_workers: Option<usize>,
    pub output_dir: Option<String>,
}

const NO_OVERRIDES: Overrides = Overrides {
    state_dir: None,
    agent_binary: None,
    agent_model: None,
    agent_timeout: None,
    max_retries: None,
    retry_delay: None,
    review_workers: None,
    report_workers: None,
    output_dir: None,
};

impl From<&Cli> for Overrides {
    fn from(cli: &Cli) -> Self {
        Self {
            state_dir: cli.state_dir.clone(),
            agent_binary: cli.agent_binary.clone(),
            agent_model: cli.agent_model.clone(),
            agent_timeout: cli.agent_timeout,
            max_retries: cli.max_retries,
            retry_delay: cli.retry_delay,
            review_workers: cli.review_workers,
            report_workers: cli.report_workers,
            output_dir: cli.output_dir.clone(),
        }
    }
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_from(cli, Path::new("."))
    }

    pub fn load_from(cli: &Cli, project_dir: &Path) -> Result<Self> {
        let file = match &cli.config {
            Some(explicit) => {
                let path = Path::new(explicit);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_settings(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = project_dir.join(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    parse_settings(&std::fs::read_to_string(&path)?)?
                } else {
                    SettingsFile::default()
                }
            }
        };
        merge(file, &Overrides::from(cli))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_delay: self.retry_delay,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

pub fn parse_settings(content: &str) -> Result<SettingsFile> {
    Ok(toml::from_str(content)?)
}

pub fn merge(file: SettingsFile, overrides: &Overrides) -> Result<Settings> {
    let settings = Settings {
        review_workers: overrides.review_workers.or(file.review_workers).unwrap_or(3),
        report_workers: overrides.report_workers.or(file.report_workers).unwrap_or(3),
        max_retries: overrides.max_retries.or(file.max_retries).unwrap_or(3),
        retry_delay: Duration::from_secs(
            overrides.retry_delay.or(file.retry_delay_secs).unwrap_or(10),
        ),
        agent_timeout: overrides
            .agent_timeout
            .or(file.agent_timeout_secs)
            .or(Some(600))
            .map(Duration::from_secs),
        agent_model: overrides
            .agent_model
            .clone()
            .or(file.agent_model)
            .unwrap_or_default(),
        claude_binary: overrides
            .agent_binary
            .clone()
            .or(file.claude_binary)
            .unwrap_or_default(),
        gemini_binary: file.gemini_binary.unwrap_or_default(),
        output_dir: overrides
            .output_dir
            .clone()
            .or(file.output_dir)
            .unwrap_or_else(|| "review-output".to_string()),
        state_dir: overrides
            .state_dir
            .clone()
            .or(file.state_dir)
            .unwrap_or_else(|| ".scopeview/state".to_string()),
        workspace_dir: file
            .workspace_dir
            .unwrap_or_else(|| ".scopeview/workspaces".to_string()),
    };
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.review_workers == 0 {
        return Err(Error::ConfigValidation(
            "review_workers must be > 0".to_string(),
        ));
    }
    if settings.report_workers == 0 {
        return Err(Error::ConfigValidation(
            "report_workers must be > 0".to_string(),
        ));
    }
    if settings.max_retries == 0 {
        return Err(Error::ConfigValidation("max_retries must be > 0".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ConfigProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub output_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub workspace_dir: String,
}

/// Read-through settings capability. Engines call this per relevant call
/// site (e.g. per section) instead of holding settings across suspensions;
/// cache invalidation is the provider's concern.
pub trait ConfigProvider: Send + Sync {
    fn review(&self) -> ReviewSettings;
    fn report(&self) -> ReportSettings;
}

/// Provider over a settings snapshot that can be swapped at runtime.
pub struct SharedProvider {
    settings: Mutex<Settings>,
}

impl SharedProvider {
    pub fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            settings: Mutex::new(settings),
        })
    }

    pub fn replace(&self, settings: Settings) {
        *self.settings.lock().expect("settings lock") = settings;
    }

    fn snapshot(&self) -> Settings {
        self.settings.lock().expect("settings lock").clone()
    }
}

impl ConfigProvider for SharedProvider {
    fn review(&self) -> ReviewSettings {
        let s = self.snapshot();
        ReviewSettings {
            workers: s.review_workers,
            retry: s.retry_policy(),
            output_dir: s.output_dir,
        }
    }

    fn report(&self) -> ReportSettings {
        let s = self.snapshot();
        ReportSettings {
            workers: s.report_workers,
            retry: s.retry_policy(),
            workspace_dir: s.workspace_dir,
        }
    }
}

impl AgentConfigSource for SharedProvider {
    fn agent_settings(&self, agent: &str) -> AgentSettings {
        let s = self.snapshot();
        let binary = match agent {
            "claude" => s.claude_binary,
            "gemini" => s.gemini_binary,
            _ => String::new(),
        };
        AgentSettings {
            binary,
            default_model: s.agent_model,
            timeout: s.agent_timeout,
        }
    }
}
