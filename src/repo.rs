//! Repository preparation: the capability interface the report engine
//! depends on, plus a git-CLI implementation for the binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Inputs identifying one repository checkout.
#[derive(Debug, Clone, Default)]
pub struct RepoRequest {
    pub provider: String,
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    /// Directory the checkout lives under.
    pub workspace: PathBuf,
}

/// Repository-preparation capability. Implementations clone or
/// fetch + reset; the engines only depend on receiving a usable local path.
pub trait RepositoryManager: Send + Sync {
    fn ensure_repository(&self, req: &RepoRequest) -> Result<PathBuf>;
}

/// Create a path-safe slug from an arbitrary string.
pub fn slugify(input: &str) -> String {
    let mut result = String::new();
    let mut prev_hyphen = false;
    for c in input.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen && !result.is_empty() {
            result.push('-');
            prev_hyphen = true;
        } else {
            prev_hyphen = true;
        }
    }
    if result.ends_with('-') {
        result.pop();
    }
    if result.len() > 50 {
        result.truncate(50);
        if result.ends_with('-') {
            result.pop();
        }
    }
    result
}

/// Git-CLI repository manager. Clones on first use; on later uses fetches
/// and hard-resets to the requested ref.
pub struct GitRepositoryManager {
    base_url: String,
}

impl GitRepositoryManager {
    /// `base_url` is the clone-URL prefix, e.g. `https://github.com`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn clone_url(&self, req: &RepoRequest) -> String {
        format!("{}/{}/{}.git", self.base_url, req.owner, req.repo)
    }

    fn checkout_dir(&self, req: &RepoRequest) -> PathBuf {
        req.workspace
            .join(format!("{}-{}", slugify(&req.owner), slugify(&req.repo)))
    }

    fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        debug!(dir = %dir.display(), ?args, "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| Error::Repo(format!("failed to run git: {e}")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Repo(format!("git {} failed: {stderr}", args.join(" "))))
        }
    }
}

impl RepositoryManager for GitRepositoryManager {
    fn ensure_repository(&self, req: &RepoRequest) -> Result<PathBuf> {
        let dir = self.checkout_dir(req);
        std::fs::create_dir_all(&req.workspace)
            .map_err(|e| Error::Repo(format!("failed to create workspace: {e}")))?;

        if dir.join(".git").exists() {
            info!(path = %dir.display(), git_ref = %req.git_ref, "refreshing checkout");
            self.git(&dir, &["fetch", "origin", &req.git_ref])?;
            self.git(&dir, &["reset", "--hard", "FETCH_HEAD"])?;
        } else {
            info!(path = %dir.display(), git_ref = %req.git_ref, "cloning repository");
            let url = self.clone_url(req);
            self.git(
                &req.workspace,
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--branch",
                    &req.git_ref,
                    &url,
                    dir.to_str()
                        .ok_or_else(|| Error::Repo("non-utf8 checkout path".to_string()))?,
                ],
            )?;
        }

        Ok(dir)
    }
}

/// Manager for repositories that already exist on disk; used by the CLI
/// when reviewing a local checkout and by tests.
pub struct LocalRepositoryManager {
    path: PathBuf,
}

impl LocalRepositoryManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RepositoryManager for LocalRepositoryManager {
    fn ensure_repository(&self, _req: &RepoRequest) -> Result<PathBuf> {
        if !self.path.is_dir() {
            return Err(Error::Repo(format!(
                "local repository {} does not exist",
                self.path.display()
            )));
        }
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My Repo"), "my-repo");
        assert_eq!(slugify("acme/app"), "acme-app");
        assert_eq!(slugify("--weird--name--"), "weird-name");
        assert_eq!(slugify(""), "");
        let long = "x".repeat(80);
        assert!(slugify(&long).len() <= 50);
    }

    #[test]
    fn test_clone_url_and_checkout_dir() {
        let manager = GitRepositoryManager::new("https://github.com/");
        let req = RepoRequest {
            provider: "github".into(),
            owner: "acme".into(),
            repo: "app".into(),
            git_ref: "main".into(),
            workspace: PathBuf::from("/ws"),
        };
        assert_eq!(manager.clone_url(&req), "https://github.com/acme/app.git");
        assert_eq!(manager.checkout_dir(&req), PathBuf::from("/ws/acme-app"));
    }

    #[test]
    fn test_local_manager_requires_existing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = LocalRepositoryManager::new(tmp.path());
        let path = manager.ensure_repository(&RepoRequest::default()).unwrap();
        assert_eq!(path, tmp.path());

        let manager = LocalRepositoryManager::new("/definitely/not/there");
        assert!(manager.ensure_repository(&RepoRequest::default()).is_err());
    }
}
