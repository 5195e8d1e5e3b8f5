use clap::{Parser, Subcommand};

/// scopeview — AI-assisted code review and repository reports
#[derive(Parser, Debug)]
#[command(name = "scopeview", version, about)]
pub struct Cli {
    /// Path to the settings file
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// State directory for persisted reports and reviews
    #[arg(long, global = true)]
    pub state_dir: Option<String>,

    /// Agent binary override (applies to the default agent)
    #[arg(long, global = true)]
    pub agent_binary: Option<String>,

    /// Model override for all agents
    #[arg(long, global = true)]
    pub agent_model: Option<String>,

    /// Agent timeout in seconds
    #[arg(long, global = true)]
    pub agent_timeout: Option<u64>,

    /// Maximum agent attempts per call
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Initial retry delay in seconds
    #[arg(long, global = true)]
    pub retry_delay: Option<u64>,

    /// Review worker count
    #[arg(long, global = true)]
    pub review_workers: Option<usize>,

    /// Report worker count
    #[arg(long, global = true)]
    pub report_workers: Option<usize>,

    /// Output directory for file channels
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate review rules and report configs
    Validate {
        /// Rules file (default: discovered in --repo)
        #[arg(long)]
        rules: Option<String>,
        /// Repository root to discover configs in
        #[arg(long, default_value = ".")]
        repo: String,
        /// Report config directory
        #[arg(long)]
        reports_dir: Option<String>,
        /// Require at least one goal area per rule
        #[arg(long)]
        strict: bool,
    },

    /// Run the review pipeline against a repository
    Review {
        /// Local repository path
        #[arg(long)]
        repo: String,
        /// Rules file (default: discovered in the repository)
        #[arg(long)]
        rules: Option<String>,
        /// Repository owner (for PR comments and history keys)
        #[arg(long, default_value = "")]
        owner: String,
        /// Repository name
        #[arg(long, default_value = "")]
        name: String,
        /// Branch or ref under review
        #[arg(long, default_value = "")]
        git_ref: String,
        /// Head commit SHA
        #[arg(long, default_value = "")]
        commit_sha: String,
        /// Pull request number (0 for non-PR runs)
        #[arg(long, default_value_t = 0)]
        pr: u64,
        /// Pull request title
        #[arg(long, default_value = "")]
        pr_title: String,
        /// Base commit SHA of the PR
        #[arg(long, default_value = "")]
        base_sha: String,
        /// Output language for the review
        #[arg(long, default_value = "")]
        language: String,
    },

    /// Generate a repository report
    Report {
        /// Repository URL
        #[arg(long)]
        repo_url: String,
        /// Report type (a report config id, e.g. wiki)
        #[arg(long = "type")]
        report_type: String,
        /// Git ref to report on
        #[arg(long, default_value = "main")]
        git_ref: String,
        /// Report id (derived from the repo and type when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Report config directory
        #[arg(long)]
        reports_dir: Option<String>,
    },

    /// Resume a stored report
    Resume {
        /// Report id to resume
        report_id: String,
        /// Report config directory
        #[arg(long)]
        reports_dir: Option<String>,
    },
}
