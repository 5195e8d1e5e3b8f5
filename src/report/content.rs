//! Phase 2/3 response post-processing: marker parsing, fence unwrapping,
//! meta-commentary stripping, and rune-safe summary truncation.

use std::sync::OnceLock;

use regex::Regex;

pub const ELLIPSIS: char = '…';
pub const FALLBACK_SUMMARY_LEN: u32 = 200;
/// At most this many trailing lines are examined for meta-commentary.
const MAX_TRAILING_META_LINES: usize = 5;

/// A parsed section response.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionBody {
    pub content: String,
    pub summary: String,
    /// False when the summary was derived from the content instead of a
    /// `[SUMMARY]` marker.
    pub summary_from_marker: bool,
}

// Byte-offset search so multibyte text before a marker cannot skew the
// split points (lowercasing a string may change its length).
fn find_marker(haystack: &str, marker: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(marker.len())
        .position(|window| window.eq_ignore_ascii_case(marker.as_bytes()))
}

/// Split an agent response on the `[CONTENT]` / `[SUMMARY]` markers
/// (case-insensitive). Three shapes are accepted:
/// - both markers, in that order: content between them, summary after;
/// - only `[SUMMARY]`: content before it, summary after;
/// - neither: the whole response is content and the summary falls back to
///   the first paragraph.
pub fn parse_section_response(raw: &str) -> SectionBody {
    const CONTENT: &str = "[content]";
    const SUMMARY: &str = "[summary]";

    let content_at = find_marker(raw, CONTENT);
    let summary_at = find_marker(raw, SUMMARY);

    match (content_at, summary_at) {
        (Some(c), Some(s)) if c < s => SectionBody {
            content: raw[c + CONTENT.len()..s].trim().to_string(),
            summary: raw[s + SUMMARY.len()..].trim().to_string(),
            summary_from_marker: true,
        },
        (_, Some(s)) => SectionBody {
            content: raw[..s].trim().to_string(),
            summary: raw[s + SUMMARY.len()..].trim().to_string(),
            summary_from_marker: true,
        },
        _ => SectionBody {
            content: raw.trim().to_string(),
            summary: String::new(),
            summary_from_marker: false,
        },
    }
}

/// Strip a ```` ```markdown ````, ```` ```md ````, or ```` ``` ```` wrapper,
/// but only when the fence wraps the entire body (the closing fence is the
/// very end of the content). Internal fences are never touched.
pub fn strip_fence_wrapper(content: &str) -> String {
    let trimmed = content.trim();
    let Some(first_newline) = trimmed.find('\n') else {
        return content.to_string();
    };
    let first_line = trimmed[..first_newline].trim_end();
    if !matches!(first_line, "```markdown" | "```md" | "```") {
        return content.to_string();
    }
    let rest = &trimmed[first_newline + 1..];
    let Some(body) = rest.strip_suffix("```") else {
        return content.to_string();
    };
    body.trim_end_matches(['\n', ' ']).trim_start_matches('\n').to_string()
}

/// Drop leading lines until the first Markdown heading. Content without
/// any heading is returned unchanged.
pub fn strip_leading_until_heading(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    match lines.iter().position(|line| line.starts_with('#')) {
        Some(0) | None => content.to_string(),
        Some(at) => lines[at..].join("\n"),
    }
}

fn builtin_trailing_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^(the )?(report |section |content |file |document )?(has been |was |is )(saved|written|created)( (to|in|at|as) \S.*)?[.!]?$",
            r"(?i)^i('ve| have)? (saved|written|created) .*$",
            r"(?i)^(file|content|output) (saved|written|created)\b.*$",
            r"(?i)^saved (to|as) \S.*$",
            r"^.*已(保存|写入|生成)(到|至).*$",
            r"^(以上|上述|该|本)(内容|文件|章节|文档)已.*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("trailing meta pattern"))
        .collect()
    })
}

/// Compile extra trailing patterns from the report config, skipping
/// invalid ones with a warning.
pub fn compile_extra_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "ignoring invalid trailing pattern");
                None
            }
        })
        .collect()
}

/// Remove trailing file-save meta-commentary: up to five trailing lines
/// matching the built-in patterns (or `extra` ones), blank lines between
/// them included.
pub fn strip_trailing_meta(content: &str, extra: &[Regex]) -> String {
    let mut lines: Vec<&str> = content.lines().collect();

    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    let mut removed = 0usize;
    while removed < MAX_TRAILING_META_LINES {
        let Some(last) = lines.last() else { break };
        let last = last.trim();
        let matches = builtin_trailing_patterns()
            .iter()
            .chain(extra.iter())
            .any(|re| re.is_match(last));
        if !matches {
            break;
        }
        lines.pop();
        removed += 1;
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }
    }

    lines.join("\n")
}

fn leading_meta_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^(here('s| is)|below is|the following is) .*[:：]?$",
            r"(?i)^(sure|certainly|of course)[,.!].*$",
            r"^(以下是|下面是).*[:：]?$",
            r"^(总结|摘要|概述)(如下)?[:：]?$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("leading meta pattern"))
        .collect()
    })
}

/// Remove leading `Here is the summary:`-style commentary from a summary.
pub fn strip_leading_meta(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    loop {
        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        match lines.first() {
            Some(first) if leading_meta_patterns().iter().any(|re| re.is_match(first.trim())) => {
                lines.remove(0);
            }
            _ => break,
        }
    }
    lines.join("\n")
}

/// Derive a fallback summary: the first non-heading paragraph, stripped of
/// `**`, `*`, and backtick formatting, truncated to 200 characters.
pub fn fallback_summary(content: &str) -> String {
    let mut paragraph = String::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        if trimmed.starts_with('#') {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        if !paragraph.is_empty() {
            paragraph.push(' ');
        }
        paragraph.push_str(trimmed);
    }

    let cleaned = paragraph.replace("**", "").replace(['*', '`'], "");
    truncate_summary(&cleaned, FALLBACK_SUMMARY_LEN)
}

/// Truncate to at most `max_len` characters (code points, never bytes).
/// When the cut lands past two thirds of the budget, it moves back to the
/// last word boundary; a `…` marks any truncation.
pub fn truncate_summary(text: &str, max_len: u32) -> String {
    let max_len = max_len as usize;
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text.to_string();
    }

    let mut cut = max_len;
    let boundary = chars[..max_len]
        .iter()
        .rposition(|c| c.is_whitespace())
        .unwrap_or(0);
    if boundary * 3 >= max_len * 2 {
        cut = boundary;
    }

    let mut out: String = chars[..cut].iter().collect();
    let trimmed = out.trim_end();
    if trimmed.len() != out.len() {
        out.truncate(trimmed.len());
    }
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- marker parsing ----

    #[test]
    fn test_both_markers_in_order() {
        let raw = "[CONTENT]\n## X\ntext\n[SUMMARY]\nshort";
        let body = parse_section_response(raw);
        assert_eq!(body.content, "## X\ntext");
        assert_eq!(body.summary, "short");
        assert!(body.summary_from_marker);
    }

    #[test]
    fn test_markers_case_insensitive() {
        let raw = "[Content]\nbody\n[summary]\nsum";
        let body = parse_section_response(raw);
        assert_eq!(body.content, "body");
        assert_eq!(body.summary, "sum");
    }

    #[test]
    fn test_markers_after_multibyte_text() {
        let raw = "[CONTENT]\n日本語の本文です。\n[SUMMARY]\n概要";
        let body = parse_section_response(raw);
        assert_eq!(body.content, "日本語の本文です。");
        assert_eq!(body.summary, "概要");
    }

    #[test]
    fn test_only_summary_marker() {
        let raw = "everything before\n[SUMMARY]\nafter";
        let body = parse_section_response(raw);
        assert_eq!(body.content, "everything before");
        assert_eq!(body.summary, "after");
        assert!(body.summary_from_marker);
    }

    #[test]
    fn test_no_markers() {
        let body = parse_section_response("just prose");
        assert_eq!(body.content, "just prose");
        assert!(body.summary.is_empty());
        assert!(!body.summary_from_marker);
    }

    #[test]
    fn test_markers_out_of_order_treated_as_summary_only() {
        let raw = "intro\n[SUMMARY]\nsum\n[CONTENT]\nlate";
        let body = parse_section_response(raw);
        assert_eq!(body.content, "intro");
        assert!(body.summary.starts_with("sum"));
    }

    #[test]
    fn test_marker_roundtrip() {
        let content = "## X\ntext";
        let summary = "short";
        let rendered = format!("[CONTENT]\n{content}\n[SUMMARY]\n{summary}");
        let body = parse_section_response(&rendered);
        assert_eq!(body.content, content);
        assert_eq!(body.summary, summary);
    }

    // ---- fence stripping ----

    #[test]
    fn test_strip_full_markdown_fence() {
        let wrapped = "```markdown\n# Title\nbody\n```";
        assert_eq!(strip_fence_wrapper(wrapped), "# Title\nbody");
    }

    #[test]
    fn test_strip_md_and_bare_fences() {
        assert_eq!(strip_fence_wrapper("```md\nx\n```"), "x");
        assert_eq!(strip_fence_wrapper("```\nx\n```"), "x");
    }

    #[test]
    fn test_partial_fence_preserved() {
        // Closing fence is not at the very end: leave everything alone.
        let input = "```markdown\n# Title\n```\ntrailing prose";
        assert_eq!(strip_fence_wrapper(input), input);
    }

    #[test]
    fn test_internal_fences_preserved() {
        let input = "# Title\n```rust\nfn main() {}\n```\nmore";
        assert_eq!(strip_fence_wrapper(input), input);

        // A wrapping fence with an internal code block still unwraps once.
        let wrapped = "```markdown\n# T\n```rust\ncode\n```\nprose\n```";
        let out = strip_fence_wrapper(wrapped);
        assert!(out.starts_with("# T"));
        assert!(out.contains("```rust"));
    }

    #[test]
    fn test_non_fence_content_untouched() {
        assert_eq!(strip_fence_wrapper("plain text"), "plain text");
        assert_eq!(strip_fence_wrapper("```inline only"), "```inline only");
    }

    // ---- leading / trailing cleanup ----

    #[test]
    fn test_leading_lines_removed_until_heading() {
        let input = "Sure, here's the section.\nIt follows below.\n# Actual Title\nbody";
        assert_eq!(strip_leading_until_heading(input), "# Actual Title\nbody");
    }

    #[test]
    fn test_leading_untouched_when_heading_first_or_absent() {
        assert_eq!(strip_leading_until_heading("# T\nbody"), "# T\nbody");
        assert_eq!(strip_leading_until_heading("no heading here"), "no heading here");
    }

    #[test]
    fn test_trailing_meta_english() {
        let input = "# T\nbody\n\nThe content has been saved to docs/section.md.";
        assert_eq!(strip_trailing_meta(input, &[]), "# T\nbody");
    }

    #[test]
    fn test_trailing_meta_chinese() {
        let input = "# T\nbody\n\n以上内容已保存。\n文件已保存到 docs/x.md";
        assert_eq!(strip_trailing_meta(input, &[]), "# T\nbody");
    }

    #[test]
    fn test_trailing_meta_limit_of_five() {
        let meta = "File saved to out.md";
        let input = format!("# T\nbody\n{}", [meta; 7].join("\n"));
        let output = strip_trailing_meta(&input, &[]);
        // Only five trailing lines are examined; the deeper ones stay.
        assert_eq!(output.matches(meta).count(), 2);
    }

    #[test]
    fn test_trailing_prose_kept() {
        let input = "# T\nbody ends with a normal sentence.";
        assert_eq!(strip_trailing_meta(input, &[]), input);
    }

    #[test]
    fn test_extra_trailing_patterns() {
        let extra = compile_extra_patterns(&["^Generated by .*$".to_string()]);
        let input = "# T\nbody\nGenerated by scopeview";
        assert_eq!(strip_trailing_meta(input, &extra), "# T\nbody");

        // Invalid patterns are dropped, not fatal.
        assert!(compile_extra_patterns(&["([".to_string()]).is_empty());
    }

    #[test]
    fn test_strip_leading_meta_summary() {
        assert_eq!(strip_leading_meta("Here is the summary:\n\nReal text"), "Real text");
        assert_eq!(strip_leading_meta("以下是总结：\n实际内容"), "实际内容");
        assert_eq!(strip_leading_meta("Plain summary"), "Plain summary");
    }

    // ---- fallback summary & truncation ----

    #[test]
    fn test_fallback_summary_skips_headings() {
        let content = "# Title\n\n**Bold** start with `code` and *emphasis*.\n\nSecond paragraph.";
        assert_eq!(fallback_summary(content), "Bold start with code and emphasis.");
    }

    #[test]
    fn test_fallback_summary_truncates_at_200() {
        let content = format!("# T\n\n{}", "word ".repeat(100));
        let summary = fallback_summary(&content);
        assert!(summary.chars().count() <= 201);
        assert!(summary.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_summary("short", 200), "short");
        assert_eq!(truncate_summary("", 200), "");
    }

    #[test]
    fn test_truncate_prefers_word_boundary() {
        let text = "alpha beta gamma delta epsilon";
        let out = truncate_summary(text, 20);
        // Cut lands past 2/3 of the budget, so it backs up to a boundary.
        assert_eq!(out, "alpha beta gamma…");
    }

    #[test]
    fn test_truncate_hard_cut_without_usable_boundary() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let out = truncate_summary(text, 10);
        assert_eq!(out, "abcdefghij…");
        assert_eq!(out.chars().count(), 11);
    }

    #[test]
    fn test_truncate_is_rune_safe() {
        let text = "日本語のテキストが続いています。".repeat(20);
        for max in [1u32, 5, 10, 31, 100] {
            let out = truncate_summary(&text, max);
            assert!(out.chars().count() <= max as usize + 1, "max {max}");
            assert!(out.ends_with(ELLIPSIS));
        }
    }

    #[test]
    fn test_truncate_never_exceeds_budget_plus_ellipsis() {
        let mixed = "héllo wörld → ünïcode test ".repeat(30);
        for max in [10u32, 50, 200, 1000] {
            let out = truncate_summary(&mixed, max);
            assert!(out.chars().count() <= max as usize + 1);
        }
    }
}
