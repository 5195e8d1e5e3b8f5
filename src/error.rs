use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("agent execution failed: {0}")]
    AgentExecution(String),

    #[error("agent timed out: {0}")]
    AgentTimeout(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("repository error: {0}")]
    Repo(String),

    #[error("task queue is full")]
    QueueFull,

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Classify an error as retryable or fatal.
///
/// Retry policy lives in the engines; agents only classify. Timeouts and
/// execution failures (non-zero exit, signal kill, transient transport) are
/// worth retrying. A missing binary, a malformed config, or cancellation
/// will not get better on a second attempt.
pub fn is_retryable(err: &Error) -> bool {
    matches!(
        err,
        Error::AgentTimeout(_) | Error::AgentExecution(_) | Error::Process(_)
    )
}
