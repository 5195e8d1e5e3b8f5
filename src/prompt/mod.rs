//! Prompt assembly: a rule plus runtime context becomes a [`Spec`], and a
//! `Spec` renders to a deterministic Markdown prompt. Format instructions
//! derived from the composed finding schema are appended separately.

pub mod build;
pub mod format;
pub mod render;

pub use build::{BuildContext, build_spec};
pub use render::render;

/// Intermediate prompt value. Pure data, never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Spec {
    pub reviewer_id: String,
    pub system_role: String,
    pub goals: SpecGoals,
    pub constraints: SpecConstraints,
    pub context: SpecContext,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecGoals {
    pub areas: Vec<AreaGoal>,
}

/// A focus area with its taxonomy description (empty for unknown ids).
#[derive(Debug, Clone, PartialEq)]
pub struct AreaGoal {
    pub id: String,
    pub description: String,
}

/// The single home for everything that bounds the reviewer's output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecConstraints {
    pub scope_control: Vec<String>,
    pub avoid: Vec<String>,
    pub severity_levels: Vec<String>,
    pub min_severity: String,
    pub tone: String,
    pub concise: bool,
    pub no_emoji: bool,
    pub no_date: bool,
    pub language: String,
    pub focus_on_issues_only: bool,
}

/// Repository and change-request context carried into the prompt.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecContext {
    pub repo_url: String,
    pub repo_name: String,
    pub branch: String,
    pub base_sha: String,
    pub commit_sha: String,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_description: String,
    pub changed_files: Vec<String>,
    /// Prior review output for the same (PR, rule); non-empty only when
    /// history comparison is enabled and a prior result exists.
    pub previous_review: String,
}
