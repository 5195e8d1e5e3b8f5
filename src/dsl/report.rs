//! Typed report configuration: one named config per report type, with the
//! three phase specs (structure, section, summary).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::rules::AgentConfig;

pub const MAX_PHASE_REFERENCE_DOCS: usize = 10;
pub const MIN_SECTION_LENGTH: u32 = 500;
pub const MAX_SUMMARY_LENGTH: u32 = 1000;
pub const DEFAULT_SUMMARY_LENGTH: u32 = 200;
pub const DEFAULT_HEADING_LEVEL: u8 = 2;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default)]
    pub version: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub output: ReportOutput,
    #[serde(default)]
    pub structure: StructurePhase,
    #[serde(default)]
    pub section: SectionPhase,
    #[serde(default)]
    pub summary: PhaseSpec,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReportOutput {
    #[serde(default)]
    pub style: ReportStyle,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReportStyle {
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub concise: Option<bool>,
    #[serde(default)]
    pub no_emoji: Option<bool>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub use_mermaid: Option<bool>,
    /// Markdown heading level for section titles, 1..=4. None means 2.
    #[serde(default)]
    pub heading_level: Option<u8>,
    /// Soft cap on generated section length in characters; 0 disables,
    /// otherwise at least 500.
    #[serde(default)]
    pub max_section_length: u32,
    #[serde(default)]
    pub include_line_numbers: Option<bool>,
    /// Additional trailing meta-commentary patterns stripped from generated
    /// content, appended to the built-in list.
    #[serde(default)]
    pub extra_trailing_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PhaseGoals {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
}

// No deny_unknown_fields here: this struct is flattened into the phase
// wrappers below, and serde cannot combine the two.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct PhaseSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goals: PhaseGoals,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub reference_docs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StructurePhase {
    #[serde(flatten)]
    pub spec: PhaseSpec,
    /// Request two-level structures: every top-level section must carry
    /// subsections.
    #[serde(default)]
    pub nested: bool,
    /// When nested structures are requested but the agent returns a flat
    /// one: false (default) accepts it, treating top-level sections as
    /// leaves; true rejects it as a schema violation.
    #[serde(default)]
    pub require_nested: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct SectionPhase {
    #[serde(flatten)]
    pub spec: PhaseSpec,
    #[serde(default)]
    pub summary: SectionSummary,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SectionSummary {
    /// Per-section summary budget in characters; 0 means the default 200,
    /// at most 1000.
    #[serde(default)]
    pub max_length: u32,
}

impl ReportConfig {
    /// Effective heading level (1..=4), defaulting to 2.
    pub fn heading_level(&self) -> u8 {
        self.output.style.heading_level.unwrap_or(DEFAULT_HEADING_LEVEL)
    }

    /// Effective per-section summary budget.
    pub fn summary_max_length(&self) -> u32 {
        match self.section.summary.max_length {
            0 => DEFAULT_SUMMARY_LENGTH,
            n => n,
        }
    }
}

fn fail(path: &str, message: &str) -> Error {
    Error::ConfigValidation(format!("{path}: {message}"))
}

pub fn validate_report_config(config: &ReportConfig) -> Result<()> {
    if config.id.is_empty() {
        return Err(fail("id", "report config id must not be empty"));
    }

    if let Some(level) = config.output.style.heading_level
        && !(1..=4).contains(&level)
    {
        return Err(fail(
            "output.style.heading_level",
            &format!("{level} is outside [1, 4]"),
        ));
    }

    let max_len = config.output.style.max_section_length;
    if max_len != 0 && max_len < MIN_SECTION_LENGTH {
        return Err(fail(
            "output.style.max_section_length",
            &format!("{max_len} must be 0 or at least {MIN_SECTION_LENGTH}"),
        ));
    }

    if config.section.summary.max_length > MAX_SUMMARY_LENGTH {
        return Err(fail(
            "section.summary.max_length",
            &format!(
                "{} exceeds the maximum of {MAX_SUMMARY_LENGTH}",
                config.section.summary.max_length
            ),
        ));
    }

    for (phase, spec) in [
        ("structure", &config.structure.spec),
        ("section", &config.section.spec),
        ("summary", &config.summary),
    ] {
        if spec.reference_docs.len() > MAX_PHASE_REFERENCE_DOCS {
            return Err(fail(
                &format!("{phase}.reference_docs"),
                &format!(
                    "{} reference docs exceed the maximum of {MAX_PHASE_REFERENCE_DOCS}",
                    spec.reference_docs.len()
                ),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReportConfig {
        ReportConfig {
            id: "wiki".into(),
            name: "Repository wiki".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_minimal_config() {
        validate_report_config(&config()).unwrap();
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut c = config();
        c.id.clear();
        assert!(validate_report_config(&c).is_err());
    }

    #[test]
    fn test_heading_level_boundaries() {
        for (level, ok) in [(1u8, true), (4, true), (0, false), (5, false)] {
            let mut c = config();
            c.output.style.heading_level = Some(level);
            assert_eq!(validate_report_config(&c).is_ok(), ok, "level {level}");
        }
        // Unset is fine and defaults to 2.
        assert_eq!(config().heading_level(), 2);
    }

    #[test]
    fn test_max_section_length_boundaries() {
        for (len, ok) in [(0u32, true), (499, false), (500, true), (5000, true)] {
            let mut c = config();
            c.output.style.max_section_length = len;
            assert_eq!(validate_report_config(&c).is_ok(), ok, "length {len}");
        }
    }

    #[test]
    fn test_summary_max_length_boundaries() {
        for (len, ok) in [(0u32, true), (1000, true), (1001, false)] {
            let mut c = config();
            c.section.summary.max_length = len;
            assert_eq!(validate_report_config(&c).is_ok(), ok, "length {len}");
        }
    }

    #[test]
    fn test_summary_length_zero_uses_default() {
        let mut c = config();
        c.section.summary.max_length = 0;
        assert_eq!(c.summary_max_length(), 200);
        c.section.summary.max_length = 600;
        assert_eq!(c.summary_max_length(), 600);
    }

    #[test]
    fn test_phase_reference_docs_limit() {
        let mut c = config();
        c.section.spec.reference_docs = (0..10).map(|i| format!("doc{i}.md")).collect();
        validate_report_config(&c).unwrap();
        c.section.spec.reference_docs.push("extra.md".into());
        let err = validate_report_config(&c).unwrap_err();
        assert!(err.to_string().contains("section.reference_docs"));
    }

    #[test]
    fn test_yaml_parse_full_config() {
        let yaml = r#"
version: "1"
id: wiki
name: Repository Wiki
description: Long-form documentation of the repository
agent:
  type: claude
output:
  style:
    tone: neutral
    heading_level: 3
    max_section_length: 800
    use_mermaid: true
structure:
  description: Design the wiki outline
  nested: true
  goals:
    topics: [architecture, onboarding]
section:
  description: Write one wiki section
  summary:
    max_length: 300
summary:
  description: Summarize the whole wiki
"#;
        let config: ReportConfig = serde_yaml::from_str(yaml).unwrap();
        validate_report_config(&config).unwrap();
        assert!(config.structure.nested);
        assert!(!config.structure.require_nested);
        assert_eq!(config.heading_level(), 3);
        assert_eq!(config.summary_max_length(), 300);
        assert_eq!(config.structure.spec.goals.topics.len(), 2);
    }
}
