//! The review pipeline: declarative rules run against a pull request, with
//! findings published through the configured output channels.

pub mod engine;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::dsl::RulesConfig;

/// One review submission.
#[derive(Debug, Clone)]
pub struct ReviewTask {
    pub review_id: String,
    pub repo_path: PathBuf,
    pub repo_url: String,
    pub owner: String,
    pub name: String,
    pub git_ref: String,
    pub commit_sha: String,
    pub pr: Option<PrInfo>,
    pub rules: RulesConfig,
    /// Where the rules were loaded from; persisted so recovery can rebuild
    /// the task after a restart.
    pub rules_path: String,
    pub output_dir: String,
    pub output_language: String,
    pub submitted_at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PrInfo {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub base_sha: String,
    pub changed_files: Vec<String>,
}

impl ReviewTask {
    /// History-comparison key; empty when the task has no PR.
    pub fn pr_id(&self) -> String {
        match &self.pr {
            Some(pr) => format!("{}/{}#{}", self.owner, self.name, pr.number),
            None => String::new(),
        }
    }
}

/// Transient per-rule execution artifact. Channels own its publication.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ReviewResult {
    pub reviewer_id: String,
    /// Structured body parsed from the agent response, when available.
    pub data: HashMap<String, serde_json::Value>,
    /// Raw agent response text.
    pub text: String,
    pub agent_name: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReviewResult {
    pub fn failed(reviewer_id: &str, agent_name: &str, error: String) -> Self {
        Self {
            reviewer_id: reviewer_id.to_string(),
            agent_name: agent_name.to_string(),
            error: Some(error),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pr_id_shape() {
        let task = ReviewTask {
            review_id: "rev1".into(),
            repo_path: PathBuf::from("/repo"),
            repo_url: String::new(),
            owner: "acme".into(),
            name: "app".into(),
            git_ref: "main".into(),
            commit_sha: String::new(),
            pr: Some(PrInfo {
                number: 42,
                ..Default::default()
            }),
            rules: RulesConfig::default(),
            rules_path: String::new(),
            output_dir: String::new(),
            output_language: String::new(),
            submitted_at: 0,
        };
        assert_eq!(task.pr_id(), "acme/app#42");
    }

    #[test]
    fn test_failed_result_carries_error() {
        let result = ReviewResult::failed("sec", "claude", "boom".into());
        assert_eq!(result.reviewer_id, "sec");
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.text.is_empty());
    }
}
