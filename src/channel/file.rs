//! File channel: writes the formatted result under an output directory.

use std::path::{Path, PathBuf};

use crate::dsl::ChannelConfig;
use crate::error::{Error, Result};
use crate::review::ReviewResult;

use super::{ChannelFormat, PublishOptions, effective_format, render_payload};

pub struct FileChannel {
    format: ChannelFormat,
    output_dir: String,
    overwrite: bool,
}

impl FileChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            format: effective_format(config),
            output_dir: config.output_dir.clone(),
            overwrite: config.overwrite.unwrap_or(false),
        }
    }

    /// Workspace name from the repo path basename, with spaces and slashes
    /// replaced by hyphens.
    pub fn workspace_name(repo_path: &str) -> String {
        let base = Path::new(repo_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(repo_path);
        base.replace([' ', '/', '\\'], "-")
    }

    /// `review-{workspace}-{pr?}-{rule}.{ext}`; the PR segment is omitted
    /// for non-PR runs.
    pub fn target_path(&self, result: &ReviewResult, opts: &PublishOptions) -> PathBuf {
        let dir = if self.output_dir.is_empty() {
            &opts.output_dir
        } else {
            &self.output_dir
        };
        let workspace = Self::workspace_name(&opts.repo_path);
        let ext = self.format.extension();
        let name = if opts.pr_number > 0 {
            format!("review-{workspace}-{}-{}.{ext}", opts.pr_number, result.reviewer_id)
        } else {
            format!("review-{workspace}-{}.{ext}", result.reviewer_id)
        };
        Path::new(dir).join(name)
    }

    pub fn publish(&self, result: &ReviewResult, opts: &PublishOptions) -> Result<()> {
        let path = self.target_path(result, opts);
        let overwrite = self.overwrite || opts.overwrite;
        if !overwrite && path.exists() {
            return Err(Error::Channel(format!(
                "refusing to overwrite existing {}",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Channel(format!("failed to create {}: {e}", parent.display())))?;
        }
        let payload = render_payload(self.format, result, &opts.review_id);
        std::fs::write(&path, payload)
            .map_err(|e| Error::Channel(format!("failed to write {}: {e}", path.display())))?;

        tracing::info!(path = %path.display(), rule = %result.reviewer_id, "review written");
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        "file"
    }
}
