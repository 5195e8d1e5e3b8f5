//! Report-phase prompt templates: embedded defaults with user overrides,
//! rendered through `upon`.

use std::collections::HashMap;
use std::path::Path;

use crate::dsl::report::{PhaseSpec, ReportConfig};
use crate::error::{Error, Result};
use crate::store::ReportSection;

const DEFAULT_STRUCTURE: &str = include_str!("templates/structure.md");
const DEFAULT_SECTION: &str = include_str!("templates/section.md");
const DEFAULT_SUMMARY: &str = include_str!("templates/summary.md");

fn default_template(phase: &str) -> Option<&'static str> {
    match phase {
        "structure" => Some(DEFAULT_STRUCTURE),
        "section" => Some(DEFAULT_SECTION),
        "summary" => Some(DEFAULT_SUMMARY),
        _ => None,
    }
}

/// Template engine for the three report phases. User overrides in
/// `override_dir` (named `{phase}.md`) take precedence over the embedded
/// defaults.
pub struct ReportPromptEngine {
    override_dir: Option<String>,
}

impl ReportPromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    pub fn load_template(&self, phase: &str) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(format!("{phase}.md"));
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!("failed to read override template {}: {e}", path.display()))
                });
            }
        }
        default_template(phase)
            .map(str::to_string)
            .ok_or_else(|| Error::Prompt(format!("unknown report phase: {phase}")))
    }

    pub fn render_phase(&self, phase: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.load_template(phase)?;
        render_template(&template, vars)
    }

    /// Phase 1 prompt.
    pub fn structure_prompt(&self, config: &ReportConfig, repo_path: &str) -> Result<String> {
        let mut vars = phase_vars(&config.structure.spec);
        vars.insert("repo_path".to_string(), repo_path.to_string());
        vars.insert("report_name".to_string(), config.name.clone());
        vars.insert("report_description".to_string(), config.description.clone());
        vars.insert(
            "nested".to_string(),
            if config.structure.nested { "true".to_string() } else { String::new() },
        );
        self.render_phase("structure", &vars)
    }

    /// Phase 2 prompt for one leaf section.
    pub fn section_prompt(
        &self,
        config: &ReportConfig,
        report_title: &str,
        section: &ReportSection,
        repo_path: &str,
    ) -> Result<String> {
        let mut vars = phase_vars(&config.section.spec);
        vars.insert("repo_path".to_string(), repo_path.to_string());
        vars.insert("report_title".to_string(), report_title.to_string());
        vars.insert("section_title".to_string(), section.title.clone());
        vars.insert("section_description".to_string(), section.description.clone());
        vars.insert("style".to_string(), style_lines(config));
        vars.insert(
            "heading_hashes".to_string(),
            "#".repeat(config.heading_level() as usize),
        );
        vars.insert("summary_max".to_string(), config.summary_max_length().to_string());
        self.render_phase("section", &vars)
    }

    /// Phase 3 prompt over the structural outline.
    pub fn summary_prompt(
        &self,
        config: &ReportConfig,
        report_title: &str,
        sections: &[ReportSection],
    ) -> Result<String> {
        let mut vars = phase_vars(&config.summary);
        vars.insert("report_title".to_string(), report_title.to_string());
        vars.insert("style".to_string(), style_lines(config));
        vars.insert("outline".to_string(), outline(sections));
        self.render_phase("summary", &vars)
    }
}

fn phase_vars(spec: &PhaseSpec) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("phase_description".to_string(), spec.description.clone());
    vars.insert("topics".to_string(), spec.goals.topics.join(", "));
    vars.insert("avoid".to_string(), spec.goals.avoid.join(", "));
    vars.insert(
        "constraints".to_string(),
        spec.constraints
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    vars.insert("reference_docs".to_string(), spec.reference_docs.join(", "));
    vars
}

/// Style directives shared by the section and summary phases.
fn style_lines(config: &ReportConfig) -> String {
    let style = &config.output.style;
    let mut lines = Vec::new();
    if !style.tone.is_empty() {
        lines.push(format!("- Tone: {}", style.tone));
    }
    if style.concise.unwrap_or(false) {
        lines.push("- Be concise".to_string());
    }
    if style.no_emoji.unwrap_or(true) {
        lines.push("- Do not use emoji".to_string());
    }
    if !style.language.is_empty() {
        lines.push(format!("- Write in {}", style.language));
    }
    if style.use_mermaid.unwrap_or(false) {
        lines.push("- Use Mermaid diagrams where they clarify structure".to_string());
    }
    if style.max_section_length > 0 {
        lines.push(format!(
            "- Keep the section under roughly {} characters",
            style.max_section_length
        ));
    }
    if style.include_line_numbers.unwrap_or(false) {
        lines.push("- Cite code as path:line".to_string());
    }
    lines.join("\n")
}

/// Structural outline: every section in order, leaves annotated with their
/// short summaries.
fn outline(sections: &[ReportSection]) -> String {
    sections
        .iter()
        .map(|s| {
            let indent = if s.parent_section_id.is_some() { "  " } else { "" };
            if s.is_leaf && !s.summary.is_empty() {
                format!("{indent}- {} — {}", s.title, s.summary)
            } else {
                format!("{indent}- {}", s.title)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a template string using the `upon` engine. Supports `{{ var }}`
/// and `{% if %}` blocks.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let engine = upon::Engine::new();
    let compiled = engine
        .compile(template)
        .map_err(|e| Error::Prompt(format!("template compile error: {e}")))?;
    compiled
        .render(
            &engine,
            upon::to_value(vars).map_err(|e| Error::Prompt(e.to_string()))?,
        )
        .to_string()
        .map_err(|e| Error::Prompt(format!("template render error: {e}")))
}
