//! [`Spec`] construction from a rule and its runtime context.

use crate::dsl::areas;
use crate::dsl::rules::ReviewRule;
use crate::dsl::schema::SEVERITY_LEVELS;

use super::{AreaGoal, Spec, SpecConstraints, SpecContext, SpecGoals};

pub const DEFAULT_TONE: &str = "constructive";
pub const DEFAULT_SYSTEM_ROLE: &str =
    "You are an experienced code reviewer examining a change request.";

/// Runtime inputs for spec construction, assembled by the review engine.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub repo_url: String,
    pub repo_name: String,
    pub git_ref: String,
    pub base_sha: String,
    pub commit_sha: String,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_description: String,
    pub changed_files: Vec<String>,
    /// Task-level output language, overridden by the rule's style.
    pub output_language: String,
    pub previous_review: String,
}

/// Build the prompt spec for one rule execution.
///
/// Defaults live here, not in the DSL structs: tone `constructive`;
/// concise, no-emoji, no-date, and focus-on-issues-only all default true.
/// Language priority is rule style, then context, then unset. The avoid
/// list moves from goals into constraints; goals keep only the areas.
pub fn build_spec(rule: &ReviewRule, ctx: &BuildContext) -> Spec {
    let areas = rule
        .goals
        .areas
        .iter()
        .map(|id| AreaGoal {
            id: id.clone(),
            description: areas::description(id).unwrap_or("").to_string(),
        })
        .collect();

    let style = &rule.output.style;
    let language = if !style.language.is_empty() {
        style.language.clone()
    } else {
        ctx.output_language.clone()
    };

    let mut scope_control = rule.constraints.scope_control.clone();
    if !rule.reference_docs.is_empty() {
        scope_control.push(format!(
            "Consult these reference documents first: {}",
            rule.reference_docs.join(", ")
        ));
    }

    let constraints = SpecConstraints {
        scope_control,
        avoid: rule.goals.avoid.clone(),
        severity_levels: SEVERITY_LEVELS.iter().map(|s| s.to_string()).collect(),
        min_severity: rule.constraints.min_report.clone(),
        tone: if style.tone.is_empty() {
            DEFAULT_TONE.to_string()
        } else {
            style.tone.clone()
        },
        concise: style.concise.unwrap_or(true),
        no_emoji: style.no_emoji.unwrap_or(true),
        no_date: style.no_date.unwrap_or(true),
        language,
        focus_on_issues_only: rule.constraints.focus_on_issues_only.unwrap_or(true),
    };

    let context = SpecContext {
        repo_url: ctx.repo_url.clone(),
        repo_name: ctx.repo_name.clone(),
        branch: ctx.git_ref.clone(),
        base_sha: ctx.base_sha.clone(),
        commit_sha: ctx.commit_sha.clone(),
        pr_number: ctx.pr_number,
        pr_title: ctx.pr_title.clone(),
        pr_description: ctx.pr_description.clone(),
        changed_files: ctx.changed_files.clone(),
        previous_review: ctx.previous_review.clone(),
    };

    Spec {
        reviewer_id: rule.id.clone(),
        system_role: if rule.description.is_empty() {
            DEFAULT_SYSTEM_ROLE.to_string()
        } else {
            rule.description.clone()
        },
        goals: SpecGoals { areas },
        constraints,
        context,
    }
}
