//! Config file loading: search paths, environment expansion, parsing,
//! validation, and RuleBase application.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::env;
use super::report::{ReportConfig, validate_report_config};
use super::rules::{ReviewRule, RulesFile, apply_rule_base};
use super::validate::validate_rules_file;

/// In-repo review config at the repository root.
pub const REVIEW_CONFIG_FILE: &str = ".verust-review.yaml";
/// Fallback review config inside a `reviews/` directory.
pub const REVIEW_CONFIG_DIR_FILE: &str = "reviews/default.yaml";
/// Default directory of report configs.
pub const REPORT_CONFIG_DIR: &str = "config/reports";

/// A loaded, validated rules file with the RuleBase already folded in.
#[derive(Debug, Clone, Default)]
pub struct RulesConfig {
    pub version: String,
    pub rules: Vec<ReviewRule>,
}

impl RulesConfig {
    pub fn rule(&self, id: &str) -> Option<&ReviewRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// Parse, validate, and resolve a rules document from a YAML string.
/// Environment expansion runs over the raw text before parsing.
pub fn parse_rules(content: &str, strict: bool) -> Result<RulesConfig> {
    let expanded = env::expand(content);
    let file: RulesFile = serde_yaml::from_str(&expanded)?;
    validate_rules_file(&file, strict)?;

    let mut rules = file.rules;
    if let Some(base) = &file.rule_base {
        for rule in &mut rules {
            apply_rule_base(base, rule);
        }
    }

    Ok(RulesConfig {
        version: file.version,
        rules,
    })
}

/// Load a rules file from disk. A missing file is `ConfigNotFound`, which
/// callers route differently from malformed content.
pub fn load_rules_file(path: &Path, strict: bool) -> Result<RulesConfig> {
    if !path.exists() {
        return Err(Error::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_rules(&content, strict)
}

/// Locate the review config for a repository: `.verust-review.yaml` at the
/// root wins, then `reviews/default.yaml`.
pub fn find_review_config(repo_root: &Path) -> Option<PathBuf> {
    let root_file = repo_root.join(REVIEW_CONFIG_FILE);
    if root_file.exists() {
        return Some(root_file);
    }
    let dir_file = repo_root.join(REVIEW_CONFIG_DIR_FILE);
    if dir_file.exists() {
        return Some(dir_file);
    }
    None
}

/// Loaded report configs, addressable by id.
#[derive(Debug, Clone, Default)]
pub struct ReportConfigSet {
    by_id: HashMap<String, ReportConfig>,
}

impl ReportConfigSet {
    pub fn get(&self, id: &str) -> Option<&ReportConfig> {
        self.by_id.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.by_id.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn insert(&mut self, config: ReportConfig) -> Result<()> {
        if self.by_id.contains_key(&config.id) {
            return Err(Error::ConfigValidation(format!(
                "duplicate report config id '{}'",
                config.id
            )));
        }
        self.by_id.insert(config.id.clone(), config);
        Ok(())
    }
}

/// Parse and validate one report config document.
pub fn parse_report_config(content: &str) -> Result<ReportConfig> {
    let expanded = env::expand(content);
    let config: ReportConfig = serde_yaml::from_str(&expanded)?;
    validate_report_config(&config)?;
    Ok(config)
}

pub fn load_report_config_file(path: &Path) -> Result<ReportConfig> {
    if !path.exists() {
        return Err(Error::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_report_config(&content)
}

/// Load every report config in a directory. Files with `.example.` in the
/// name are excluded from listings. Individual load failures are skipped
/// with a warning; the load as a whole fails only when nothing loads.
pub fn load_report_configs_dir(dir: &Path) -> Result<ReportConfigSet> {
    if !dir.is_dir() {
        return Err(Error::ConfigNotFound(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let is_yaml = name.ends_with(".yaml") || name.ends_with(".yml");
            is_yaml && !name.contains(".example.")
        })
        .collect();
    paths.sort();

    let mut set = ReportConfigSet::default();
    let mut loaded = 0usize;
    for path in &paths {
        match load_report_config_file(path) {
            Ok(config) => {
                debug!(path = %path.display(), id = %config.id, "loaded report config");
                set.insert(config)?;
                loaded += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping report config");
            }
        }
    }

    if loaded == 0 {
        return Err(Error::ConfigValidation(format!(
            "no report config loaded from {}",
            dir.display()
        )));
    }

    Ok(set)
}
