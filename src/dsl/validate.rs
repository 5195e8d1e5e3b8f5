//! Validation for review rules files.
//!
//! Errors carry a human-readable field path. Unknown area ids only warn:
//! the taxonomy grows over time and old binaries must keep loading newer
//! configs.

use std::collections::HashSet;

use tracing::warn;

use crate::error::{Error, Result};

use super::areas;
use super::rules::{ChannelConfig, ExtraField, ReviewRule, RulesFile};
use super::schema::{EXTRA_FIELD_TYPES, RESERVED_FIELDS, SEVERITY_LEVELS};

pub const MAX_RULE_REFERENCE_DOCS: usize = 5;
pub const CHANNEL_TYPES: [&str; 3] = ["file", "comment", "webhook"];
pub const CHANNEL_FORMATS: [&str; 2] = ["markdown", "json"];

pub const WEBHOOK_TIMEOUT_RANGE: (u64, u64) = (30, 300);
pub const WEBHOOK_RETRIES_RANGE: (u32, u32) = (3, 12);
pub const WEBHOOK_SECRET_LEN_RANGE: (usize, usize) = (12, 64);
pub const MULTI_RUN_MAX: u32 = 3;

fn fail(path: &str, message: &str) -> Error {
    Error::ConfigValidation(format!("{path}: {message}"))
}

/// Validate a parsed rules file. `strict` additionally requires at least
/// one goal area per rule.
pub fn validate_rules_file(file: &RulesFile, strict: bool) -> Result<()> {
    let mut seen = HashSet::new();
    for (i, rule) in file.rules.iter().enumerate() {
        let path = format!("rules[{i}]");
        if rule.id.is_empty() {
            return Err(fail(&path, "rule id must not be empty"));
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(fail(&path, &format!("duplicate rule id '{}'", rule.id)));
        }
        validate_rule(rule, &path, strict)?;
    }
    Ok(())
}

fn validate_rule(rule: &ReviewRule, path: &str, strict: bool) -> Result<()> {
    for area in &rule.goals.areas {
        if !areas::is_valid(area) {
            warn!(rule = %rule.id, area = %area, "unknown focus area (passed through)");
        }
    }
    if strict && rule.goals.areas.is_empty() {
        return Err(fail(
            &format!("{path}.goals.areas"),
            "at least one focus area is required in strict mode",
        ));
    }

    let min = &rule.constraints.min_report;
    if !min.is_empty() && !SEVERITY_LEVELS.contains(&min.as_str()) {
        return Err(fail(
            &format!("{path}.constraints.min_report"),
            &format!("'{min}' is not a severity level"),
        ));
    }

    if let Some(similarity) = rule.constraints.similarity
        && !(0.0..=1.0).contains(&similarity)
    {
        return Err(fail(
            &format!("{path}.constraints.similarity"),
            &format!("{similarity} is outside [0, 1]"),
        ));
    }

    if let Some(multi_run) = &rule.multi_run
        && multi_run.runs > MULTI_RUN_MAX
    {
        return Err(fail(
            &format!("{path}.multi_run.runs"),
            &format!("{} exceeds the maximum of {MULTI_RUN_MAX}", multi_run.runs),
        ));
    }

    if rule.reference_docs.len() > MAX_RULE_REFERENCE_DOCS {
        return Err(fail(
            &format!("{path}.reference_docs"),
            &format!(
                "{} reference docs exceed the maximum of {MAX_RULE_REFERENCE_DOCS}",
                rule.reference_docs.len()
            ),
        ));
    }

    for (c, channel) in rule.output.channels.iter().enumerate() {
        validate_channel(channel, &format!("{path}.output.channels[{c}]"))?;
    }

    validate_extra_fields(rule.extra_fields(), &format!("{path}.output.schema.extra_fields"))?;

    Ok(())
}

fn validate_channel(channel: &ChannelConfig, path: &str) -> Result<()> {
    if !CHANNEL_TYPES.contains(&channel.channel_type.as_str()) {
        return Err(fail(
            &format!("{path}.type"),
            &format!(
                "'{}' is not a channel type (expected: file, comment, webhook)",
                channel.channel_type
            ),
        ));
    }

    if !channel.format.is_empty() && !CHANNEL_FORMATS.contains(&channel.format.as_str()) {
        return Err(fail(
            &format!("{path}.format"),
            &format!("'{}' is not a format (expected: markdown, json)", channel.format),
        ));
    }

    if channel.channel_type == "webhook" {
        if channel.url.is_empty() {
            return Err(fail(&format!("{path}.url"), "webhook url is required"));
        }
        let (lo, hi) = WEBHOOK_TIMEOUT_RANGE;
        if channel.timeout != 0 && !(lo..=hi).contains(&channel.timeout) {
            return Err(fail(
                &format!("{path}.timeout"),
                &format!("{} is outside [{lo}, {hi}] seconds", channel.timeout),
            ));
        }
        let (lo, hi) = WEBHOOK_RETRIES_RANGE;
        if channel.max_retries != 0 && !(lo..=hi).contains(&channel.max_retries) {
            return Err(fail(
                &format!("{path}.max_retries"),
                &format!("{} is outside [{lo}, {hi}]", channel.max_retries),
            ));
        }
        let (lo, hi) = WEBHOOK_SECRET_LEN_RANGE;
        let len = channel.header_secret.len();
        if len != 0 && !(lo..=hi).contains(&len) {
            return Err(fail(
                &format!("{path}.header_secret"),
                &format!("secret length {len} is outside [{lo}, {hi}]"),
            ));
        }
    }

    Ok(())
}

fn validate_extra_fields(fields: &[ExtraField], path: &str) -> Result<()> {
    let mut names = HashSet::new();
    for (i, field) in fields.iter().enumerate() {
        let path = format!("{path}[{i}]");
        if field.name.is_empty() {
            // Skipped later during schema composition; not a hard error.
            continue;
        }
        if RESERVED_FIELDS.contains(&field.name.as_str()) {
            return Err(fail(
                &format!("{path}.name"),
                &format!("'{}' collides with a reserved finding field", field.name),
            ));
        }
        if !names.insert(field.name.as_str()) {
            return Err(fail(
                &format!("{path}.name"),
                &format!("duplicate extra field '{}'", field.name),
            ));
        }
        if field.description.is_empty() {
            return Err(fail(&format!("{path}.description"), "description must not be empty"));
        }
        if !EXTRA_FIELD_TYPES.contains(&field.field_type.as_str()) {
            return Err(fail(
                &format!("{path}.type"),
                &format!(
                    "'{}' is not a field type (expected: string, integer, boolean, array)",
                    field.field_type
                ),
            ));
        }
        if !field.enum_values.is_empty() && field.field_type != "string" {
            return Err(fail(
                &format!("{path}.enum"),
                "enum values are only allowed on string fields",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::rules::{MultiRun, SchemaExtensions};

    fn rule(id: &str) -> ReviewRule {
        ReviewRule {
            id: id.into(),
            goals: crate::dsl::rules::Goals {
                areas: vec!["security-vulnerabilities".into()],
                avoid: vec![],
            },
            ..Default::default()
        }
    }

    fn file_of(rules: Vec<ReviewRule>) -> RulesFile {
        RulesFile {
            version: "1".into(),
            rule_base: None,
            rules,
        }
    }

    fn webhook(url: &str, timeout: u64, retries: u32, secret: &str) -> ChannelConfig {
        ChannelConfig {
            channel_type: "webhook".into(),
            url: url.into(),
            timeout,
            max_retries: retries,
            header_secret: secret.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_minimal_file() {
        validate_rules_file(&file_of(vec![rule("sec")]), false).unwrap();
    }

    #[test]
    fn test_duplicate_rule_ids_rejected() {
        let err = validate_rules_file(&file_of(vec![rule("a"), rule("a")]), false).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id 'a'"));
    }

    #[test]
    fn test_empty_rule_id_rejected() {
        let err = validate_rules_file(&file_of(vec![rule("")]), false).unwrap_err();
        assert!(err.to_string().contains("rule id must not be empty"));
    }

    #[test]
    fn test_unknown_area_is_not_an_error() {
        let mut r = rule("a");
        r.goals.areas.push("brand-new-area".into());
        validate_rules_file(&file_of(vec![r]), false).unwrap();
    }

    #[test]
    fn test_strict_mode_requires_goal_area() {
        let mut r = rule("a");
        r.goals.areas.clear();
        assert!(validate_rules_file(&file_of(vec![r.clone()]), false).is_ok());
        let err = validate_rules_file(&file_of(vec![r]), true).unwrap_err();
        assert!(err.to_string().contains("at least one focus area"));
    }

    #[test]
    fn test_bad_min_report_rejected() {
        let mut r = rule("a");
        r.constraints.min_report = "warning".into();
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("not a severity level"));
    }

    #[test]
    fn test_similarity_bounds() {
        for ok in [0.0, 0.5, 1.0] {
            let mut r = rule("a");
            r.constraints.similarity = Some(ok);
            validate_rules_file(&file_of(vec![r]), false).unwrap();
        }
        for bad in [-0.1, 1.1] {
            let mut r = rule("a");
            r.constraints.similarity = Some(bad);
            assert!(validate_rules_file(&file_of(vec![r]), false).is_err());
        }
    }

    #[test]
    fn test_multi_run_upper_bound() {
        for ok in [1, 2, 3] {
            let mut r = rule("a");
            r.multi_run = Some(MultiRun {
                runs: ok,
                ..Default::default()
            });
            validate_rules_file(&file_of(vec![r]), false).unwrap();
        }
        let mut r = rule("a");
        r.multi_run = Some(MultiRun {
            runs: 4,
            ..Default::default()
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("multi_run.runs"));
    }

    #[test]
    fn test_reference_docs_limit() {
        let mut r = rule("a");
        r.reference_docs = (0..5).map(|i| format!("doc{i}.md")).collect();
        validate_rules_file(&file_of(vec![r.clone()]), false).unwrap();
        r.reference_docs.push("one-too-many.md".into());
        assert!(validate_rules_file(&file_of(vec![r]), false).is_err());
    }

    #[test]
    fn test_unknown_channel_type_rejected() {
        let mut r = rule("a");
        r.output.channels.push(ChannelConfig {
            channel_type: "carrier-pigeon".into(),
            ..Default::default()
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("not a channel type"));
    }

    #[test]
    fn test_bad_channel_format_rejected() {
        let mut r = rule("a");
        r.output.channels.push(ChannelConfig {
            channel_type: "file".into(),
            format: "xml".into(),
            ..Default::default()
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("not a format"));
    }

    #[test]
    fn test_webhook_requires_url() {
        let mut r = rule("a");
        r.output.channels.push(webhook("", 0, 0, ""));
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("webhook url is required"));
    }

    #[test]
    fn test_webhook_timeout_boundaries() {
        for (timeout, ok) in [(0, true), (29, false), (30, true), (300, true), (301, false)] {
            let mut r = rule("a");
            r.output.channels.push(webhook("https://x.test/h", timeout, 0, ""));
            let result = validate_rules_file(&file_of(vec![r]), false);
            assert_eq!(result.is_ok(), ok, "timeout {timeout}");
        }
    }

    #[test]
    fn test_webhook_retries_boundaries() {
        for (retries, ok) in [(0, true), (2, false), (3, true), (12, true), (13, false)] {
            let mut r = rule("a");
            r.output.channels.push(webhook("https://x.test/h", 0, retries, ""));
            let result = validate_rules_file(&file_of(vec![r]), false);
            assert_eq!(result.is_ok(), ok, "retries {retries}");
        }
    }

    #[test]
    fn test_webhook_secret_length_boundaries() {
        for (len, ok) in [(0, true), (11, false), (12, true), (64, true), (65, false)] {
            let mut r = rule("a");
            r.output.channels.push(webhook("https://x.test/h", 0, 0, &"s".repeat(len)));
            let result = validate_rules_file(&file_of(vec![r]), false);
            assert_eq!(result.is_ok(), ok, "secret length {len}");
        }
    }

    #[test]
    fn test_extra_field_reserved_collision() {
        let mut r = rule("a");
        r.output.schema = Some(SchemaExtensions {
            extra_fields: vec![ExtraField {
                name: "severity".into(),
                description: "clash".into(),
                field_type: "string".into(),
                ..Default::default()
            }],
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("reserved finding field"));
    }

    #[test]
    fn test_extra_field_duplicate_name() {
        let dup = ExtraField {
            name: "cwe".into(),
            description: "d".into(),
            field_type: "string".into(),
            ..Default::default()
        };
        let mut r = rule("a");
        r.output.schema = Some(SchemaExtensions {
            extra_fields: vec![dup.clone(), dup],
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("duplicate extra field"));
    }

    #[test]
    fn test_extra_field_empty_description() {
        let mut r = rule("a");
        r.output.schema = Some(SchemaExtensions {
            extra_fields: vec![ExtraField {
                name: "cwe".into(),
                field_type: "string".into(),
                ..Default::default()
            }],
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("description must not be empty"));
    }

    #[test]
    fn test_extra_field_bad_type() {
        let mut r = rule("a");
        r.output.schema = Some(SchemaExtensions {
            extra_fields: vec![ExtraField {
                name: "cwe".into(),
                description: "d".into(),
                field_type: "float".into(),
                ..Default::default()
            }],
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("not a field type"));
    }

    #[test]
    fn test_extra_field_enum_only_on_string() {
        let mut r = rule("a");
        r.output.schema = Some(SchemaExtensions {
            extra_fields: vec![ExtraField {
                name: "count".into(),
                description: "d".into(),
                field_type: "integer".into(),
                enum_values: vec!["1".into()],
                ..Default::default()
            }],
        });
        let err = validate_rules_file(&file_of(vec![r]), false).unwrap_err();
        assert!(err.to_string().contains("only allowed on string fields"));
    }

    #[test]
    fn test_validation_result_stable_across_roundtrip() {
        let file = file_of(vec![rule("a"), rule("b")]);
        let serialized = serde_yaml::to_string(&file).unwrap();
        let reloaded: RulesFile = serde_yaml::from_str(&serialized).unwrap();
        assert_eq!(
            validate_rules_file(&file, true).is_ok(),
            validate_rules_file(&reloaded, true).is_ok()
        );
    }
}
