//! Deterministic Markdown rendering of a [`Spec`].
//!
//! Section order is fixed: role, goals, constraints, context. The context
//! section is elided entirely for non-PR runs (`pr_number == 0`). Free text
//! that originated from users (PR description, previous review) is
//! blockquoted line by line so it cannot alter the surrounding Markdown
//! structure.

use super::Spec;

/// Prefix every line with `> `. Empty input yields a single `> `.
fn blockquote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render(spec: &Spec) -> String {
    let mut out = String::new();

    out.push_str(&spec.system_role);
    out.push('\n');

    render_goals(spec, &mut out);
    render_constraints(spec, &mut out);
    render_context(spec, &mut out);

    out
}

fn render_goals(spec: &Spec, out: &mut String) {
    if spec.goals.areas.is_empty() {
        return;
    }
    out.push_str("\n## Review Goals\n\n");
    for area in &spec.goals.areas {
        if area.description.is_empty() {
            out.push_str(&format!("- {}\n", area.id));
        } else {
            out.push_str(&format!("- {}: {}\n", area.id, area.description));
        }
    }
}

fn render_constraints(spec: &Spec, out: &mut String) {
    let c = &spec.constraints;
    out.push_str("\n## Constraints\n\n");

    for line in &c.scope_control {
        out.push_str(&format!("- {line}\n"));
    }
    for item in &c.avoid {
        out.push_str(&format!("- Do not report on: {item}\n"));
    }
    out.push_str(&format!("- Severity levels: {}\n", c.severity_levels.join(", ")));
    if !c.min_severity.is_empty() {
        out.push_str(&format!("- Only report findings of severity {} or higher\n", c.min_severity));
    }
    out.push_str(&format!("- Tone: {}\n", c.tone));
    if c.concise {
        out.push_str("- Be concise\n");
    }
    if c.no_emoji {
        out.push_str("- Do not use emoji\n");
    }
    if c.no_date {
        out.push_str("- Do not include dates or timestamps\n");
    }
    if !c.language.is_empty() {
        out.push_str(&format!("- Respond in {}\n", c.language));
    }
    if c.focus_on_issues_only {
        out.push_str("- Focus only on issues; do not describe what is already fine\n");
    }
}

fn render_context(spec: &Spec, out: &mut String) {
    let ctx = &spec.context;
    if ctx.pr_number == 0 {
        return;
    }

    out.push_str("\n## Context\n\n");
    out.push_str(&format!(
        "You are reviewing pull request #{} of {}.\n\n",
        ctx.pr_number, ctx.repo_name
    ));
    if !ctx.branch.is_empty() {
        out.push_str(&format!("- Branch: {}\n", ctx.branch));
    }
    if !ctx.base_sha.is_empty() && !ctx.commit_sha.is_empty() {
        out.push_str(&format!("- Commit Range: {}..{}\n", ctx.base_sha, ctx.commit_sha));
    }
    if !ctx.pr_title.is_empty() {
        out.push_str(&format!("- Title: {}\n", ctx.pr_title));
    }
    if !ctx.changed_files.is_empty() {
        out.push_str(&format!("- Changed files: {}\n", ctx.changed_files.join(", ")));
    }

    if !ctx.pr_description.is_empty() {
        out.push_str("\n### Description\n\n");
        out.push_str(&blockquote(&ctx.pr_description));
        out.push('\n');
    }

    if !ctx.previous_review.is_empty() {
        out.push_str("\n### Previous Review Result (Historical Comparison)\n\n");
        out.push_str(&blockquote(&ctx.previous_review));
        out.push('\n');
        out.push_str(
            "\nCompare against the previous review above and mark every finding \
             with exactly one status: [FIXED] | [NEW] | [PERSISTS].\n",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::rules::{Goals, ReviewRule};
    use crate::prompt::build::{BuildContext, build_spec};

    fn rule() -> ReviewRule {
        ReviewRule {
            id: "sec".into(),
            goals: Goals {
                areas: vec!["security-vulnerabilities".into()],
                avoid: vec!["style nits".into()],
            },
            ..Default::default()
        }
    }

    fn pr_ctx() -> BuildContext {
        BuildContext {
            repo_name: "acme/app".into(),
            git_ref: "feature/x".into(),
            base_sha: "aaa111".into(),
            commit_sha: "bbb222".into(),
            pr_number: 7,
            pr_title: "Add x".into(),
            pr_description: "first line\nsecond line".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let spec = build_spec(&rule(), &pr_ctx());
        assert_eq!(render(&spec), render(&spec.clone()));
    }

    #[test]
    fn test_section_order_fixed() {
        let spec = build_spec(&rule(), &pr_ctx());
        let text = render(&spec);
        let goals = text.find("## Review Goals").unwrap();
        let constraints = text.find("## Constraints").unwrap();
        let context = text.find("## Context").unwrap();
        assert!(goals < constraints);
        assert!(constraints < context);
    }

    #[test]
    fn test_context_elided_without_pr() {
        let mut ctx = pr_ctx();
        ctx.pr_number = 0;
        let spec = build_spec(&rule(), &ctx);
        let text = render(&spec);
        assert!(!text.contains("## Context"));
        assert!(!text.contains("Commit Range"));
    }

    #[test]
    fn test_commit_range_requires_both_shas() {
        let mut ctx = pr_ctx();
        ctx.base_sha.clear();
        let spec = build_spec(&rule(), &ctx);
        assert!(!render(&spec).contains("Commit Range"));

        let spec = build_spec(&rule(), &pr_ctx());
        assert!(render(&spec).contains("- Commit Range: aaa111..bbb222\n"));
    }

    #[test]
    fn test_description_blockquoted_line_by_line() {
        let spec = build_spec(&rule(), &pr_ctx());
        let text = render(&spec);
        assert!(text.contains("> first line\n> second line"));
    }

    #[test]
    fn test_user_markdown_cannot_escape_blockquote() {
        let mut ctx = pr_ctx();
        ctx.pr_description = "## Context\ninjected heading".into();
        let spec = build_spec(&rule(), &ctx);
        let text = render(&spec);
        // The injected heading stays quoted.
        assert!(text.contains("> ## Context"));
        assert_eq!(text.matches("\n## Context\n").count(), 1);
    }

    #[test]
    fn test_previous_review_section_iff_nonempty() {
        let spec = build_spec(&rule(), &pr_ctx());
        let text = render(&spec);
        assert!(!text.contains("Previous Review Result"));
        assert!(!text.contains("[FIXED] | [NEW] | [PERSISTS]"));

        let mut ctx = pr_ctx();
        ctx.previous_review = "- old finding".into();
        let spec = build_spec(&rule(), &ctx);
        let text = render(&spec);
        assert!(text.contains("### Previous Review Result (Historical Comparison)"));
        assert!(text.contains("> - old finding"));
        assert!(text.contains("[FIXED] | [NEW] | [PERSISTS]"));
    }

    #[test]
    fn test_constraints_content() {
        let spec = build_spec(&rule(), &pr_ctx());
        let text = render(&spec);
        assert!(text.contains("- Severity levels: info, low, medium, high, critical\n"));
        assert!(text.contains("- Tone: constructive\n"));
        assert!(text.contains("- Do not report on: style nits\n"));
        assert!(text.contains("- Focus only on issues"));
        // No minimum severity configured, so no floor line.
        assert!(!text.contains("or higher"));
    }

    #[test]
    fn test_min_severity_line() {
        let mut r = rule();
        r.constraints.min_report = "medium".into();
        let spec = build_spec(&r, &pr_ctx());
        assert!(render(&spec).contains("- Only report findings of severity medium or higher\n"));
    }

    #[test]
    fn test_commit_hashes_rendered_verbatim() {
        let mut ctx = pr_ctx();
        ctx.base_sha = "ab12".into();
        ctx.commit_sha = "cd34".into();
        let spec = build_spec(&rule(), &ctx);
        // Never padded or expanded beyond what was given.
        assert!(render(&spec).contains("ab12..cd34"));
    }

    #[test]
    fn test_blockquote_shapes() {
        assert_eq!(blockquote("a\nb"), "> a\n> b");
        assert_eq!(blockquote("one"), "> one");
    }
}
