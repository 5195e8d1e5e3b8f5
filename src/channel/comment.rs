//! PR comment channel, publishing through a git-provider capability.

use std::sync::Arc;

use serde::Deserialize;

use crate::dsl::ChannelConfig;
use crate::error::{Error, Result};
use crate::review::ReviewResult;

use super::{ChannelFormat, DEFAULT_MARKER_PREFIX, PublishOptions, effective_format, render_payload};

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderComment {
    pub id: u64,
    pub body: String,
}

/// Minimal git-provider surface the channel needs. Implementations are
/// external collaborators; tests script this trait directly.
pub trait GitProvider: Send + Sync {
    fn list_comments(&self, pr_number: u64) -> Result<Vec<ProviderComment>>;
    fn post_comment(&self, pr_number: u64, body: &str) -> Result<()>;
    fn delete_comment(&self, comment_id: u64) -> Result<()>;
}

pub struct CommentChannel {
    format: ChannelFormat,
    marker_prefix: String,
    overwrite: bool,
    provider: Arc<dyn GitProvider>,
}

impl CommentChannel {
    pub fn new(config: &ChannelConfig, provider: Arc<dyn GitProvider>) -> Self {
        Self {
            format: effective_format(config),
            marker_prefix: config.marker_prefix.clone(),
            overwrite: config.overwrite.unwrap_or(false),
            provider,
        }
    }

    /// Marker identifying this rule's comments: `[{prefix}:{rule_id}]`.
    pub fn marker(&self, opts: &PublishOptions, rule_id: &str) -> String {
        let prefix = if !self.marker_prefix.is_empty() {
            &self.marker_prefix
        } else if !opts.marker_prefix.is_empty() {
            &opts.marker_prefix
        } else {
            DEFAULT_MARKER_PREFIX
        };
        format!("[{prefix}:{rule_id}]")
    }

    pub fn publish(&self, result: &ReviewResult, opts: &PublishOptions) -> Result<()> {
        if opts.pr_number == 0 {
            return Err(Error::Channel(
                "comment channel requires a pull request".to_string(),
            ));
        }

        let marker = self.marker(opts, &result.reviewer_id);

        if self.overwrite || opts.overwrite {
            let existing = self.provider.list_comments(opts.pr_number)?;
            for comment in existing.iter().filter(|c| c.body.contains(&marker)) {
                self.provider.delete_comment(comment.id)?;
            }
        }

        let payload = render_payload(self.format, result, &opts.review_id);
        let body = format!("{marker}\n\n{payload}");
        self.provider.post_comment(opts.pr_number, &body)?;

        tracing::info!(pr = opts.pr_number, rule = %result.reviewer_id, "review comment posted");
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        "comment"
    }
}

// ---------------------------------------------------------------------------
// GitHub REST implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GhComment {
    id: u64,
    body: Option<String>,
}

/// GitHub issue-comments client over `ureq`. Token comes from
/// `GITHUB_TOKEN`; an empty token sends unauthenticated requests.
pub struct GitHubProvider {
    api_base: String,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubProvider {
    pub fn new(owner: &str, repo: &str) -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: std::env::var("GITHUB_TOKEN").unwrap_or_default(),
        }
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut req = ureq::request(method, url)
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", "scopeview");
        if !self.token.is_empty() {
            req = req.set("Authorization", &format!("Bearer {}", self.token));
        }
        req
    }

    fn comments_url(&self, pr_number: u64) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base, self.owner, self.repo, pr_number
        )
    }
}

impl GitProvider for GitHubProvider {
    fn list_comments(&self, pr_number: u64) -> Result<Vec<ProviderComment>> {
        let response = self
            .request("GET", &self.comments_url(pr_number))
            .call()
            .map_err(|e| Error::Channel(format!("failed to list comments: {e}")))?;
        let comments: Vec<GhComment> = response
            .into_json()
            .map_err(|e| Error::Channel(format!("failed to parse comments: {e}")))?;
        Ok(comments
            .into_iter()
            .map(|c| ProviderComment {
                id: c.id,
                body: c.body.unwrap_or_default(),
            })
            .collect())
    }

    fn post_comment(&self, pr_number: u64, body: &str) -> Result<()> {
        self.request("POST", &self.comments_url(pr_number))
            .send_json(serde_json::json!({ "body": body }))
            .map_err(|e| Error::Channel(format!("failed to post comment: {e}")))?;
        Ok(())
    }

    fn delete_comment(&self, comment_id: u64) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/issues/comments/{}",
            self.api_base, self.owner, self.repo, comment_id
        );
        self.request("DELETE", &url)
            .call()
            .map_err(|e| Error::Channel(format!("failed to delete comment: {e}")))?;
        Ok(())
    }
}
