//! Typed review-rules configuration and RuleBase inheritance.

use serde::{Deserialize, Serialize};

/// Top-level shape of a review rules file.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RulesFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub rule_base: Option<RuleBase>,
    pub rules: Vec<ReviewRule>,
}

/// Inheritable defaults applied to every rule in the file.
///
/// `output.schema` is parsed but never propagated: schema extensions are
/// only meaningful at rule level.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleBase {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub output: Output,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReviewRule {
    pub id: String,
    /// Role statement injected as the system role of the prompt.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goals: Goals,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub reference_docs: Vec<String>,
    #[serde(default)]
    pub multi_run: Option<MultiRun>,
    #[serde(default)]
    pub history_compare: Option<HistoryCompare>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(rename = "type", default)]
    pub agent_type: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Goals {
    /// Focus area ids drawn from the area taxonomy.
    #[serde(default)]
    pub areas: Vec<String>,
    /// Things the reviewer should not report on.
    #[serde(default)]
    pub avoid: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Constraints {
    /// Free-form scope-control lines prepended to the constraints section.
    #[serde(default)]
    pub scope_control: Vec<String>,
    /// Minimum severity worth reporting; must be one of the system levels.
    #[serde(default)]
    pub min_report: String,
    /// Duplicate-suppression similarity threshold in [0,1].
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub focus_on_issues_only: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Output {
    #[serde(default)]
    pub style: OutputStyle,
    #[serde(default)]
    pub schema: Option<SchemaExtensions>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputStyle {
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub concise: Option<bool>,
    #[serde(default)]
    pub no_emoji: Option<bool>,
    #[serde(default)]
    pub no_date: Option<bool>,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SchemaExtensions {
    #[serde(default)]
    pub extra_fields: Vec<ExtraField>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtraField {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    #[serde(rename = "type", default)]
    pub channel_type: String,
    /// `markdown` or `json`; empty means the per-type default.
    #[serde(default)]
    pub format: String,
    // file
    #[serde(default)]
    pub output_dir: String,
    #[serde(default)]
    pub overwrite: Option<bool>,
    // comment
    #[serde(default)]
    pub marker_prefix: String,
    // webhook
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub header_secret: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MultiRun {
    pub runs: u32,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub merge_model: String,
}

impl MultiRun {
    /// Multi-run is active iff at least two runs are requested.
    pub fn is_active(&self) -> bool {
        self.runs >= 2
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HistoryCompare {
    #[serde(default)]
    pub enabled: bool,
}

impl ReviewRule {
    pub fn history_compare_enabled(&self) -> bool {
        self.history_compare.as_ref().is_some_and(|h| h.enabled)
    }

    pub fn multi_run_active(&self) -> bool {
        self.multi_run.as_ref().is_some_and(MultiRun::is_active)
    }

    pub fn extra_fields(&self) -> &[ExtraField] {
        self.output
            .schema
            .as_ref()
            .map(|s| s.extra_fields.as_slice())
            .unwrap_or(&[])
    }
}

/// Fold the RuleBase into a rule. Idempotent: applying the same base twice
/// yields the same effective rule.
///
/// Merge policy per field group:
/// - agent type/model merged independently, rule wins when non-empty
/// - constraints and output.style deep-merged field by field
/// - output.channels replaced wholesale (rule list wins when non-empty)
/// - output.schema never inherited
pub fn apply_rule_base(base: &RuleBase, rule: &mut ReviewRule) {
    if rule.agent.agent_type.is_empty() {
        rule.agent.agent_type = base.agent.agent_type.clone();
    }
    if rule.agent.model.is_empty() {
        rule.agent.model = base.agent.model.clone();
    }

    merge_constraints(&base.constraints, &mut rule.constraints);
    merge_style(&base.output.style, &mut rule.output.style);

    if rule.output.channels.is_empty() {
        rule.output.channels = base.output.channels.clone();
    }
}

fn merge_constraints(base: &Constraints, rule: &mut Constraints) {
    if rule.scope_control.is_empty() {
        rule.scope_control = base.scope_control.clone();
    }
    if rule.min_report.is_empty() {
        rule.min_report = base.min_report.clone();
    }
    if rule.similarity.is_none() {
        rule.similarity = base.similarity;
    }
    if rule.focus_on_issues_only.is_none() {
        rule.focus_on_issues_only = base.focus_on_issues_only;
    }
}

fn merge_style(base: &OutputStyle, rule: &mut OutputStyle) {
    if rule.tone.is_empty() {
        rule.tone = base.tone.clone();
    }
    if rule.concise.is_none() {
        rule.concise = base.concise;
    }
    if rule.no_emoji.is_none() {
        rule.no_emoji = base.no_emoji;
    }
    if rule.no_date.is_none() {
        rule.no_date = base.no_date;
    }
    if rule.language.is_empty() {
        rule.language = base.language.clone();
    }
}
