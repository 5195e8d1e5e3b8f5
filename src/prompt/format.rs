//! Format instructions appended to the rendered prompt.
//!
//! JSON channels get the composed schema verbatim plus a strictness
//! directive. Markdown channels get a format spec derived from the same
//! schema, so both modes are driven by one neutral schema value.

use serde_json::Value;

use crate::channel::ChannelFormat;

/// Top-level schema sections rendered before everything else, in this
/// order. Remaining sections are alphabetical.
const SECTION_PRIORITY: [&str; 3] = ["summary", "findings", "stats"];

pub fn format_instructions(format: ChannelFormat, schema: &Value, language: &str) -> String {
    match format {
        ChannelFormat::Json => json_instructions(schema, language),
        ChannelFormat::Markdown => markdown_instructions(schema, language),
    }
}

fn json_instructions(schema: &Value, language: &str) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    let mut out = String::from("\n## Output Format\n\n```json\n");
    out.push_str(&pretty);
    out.push_str("\n```\n\n");
    out.push_str(
        "Your output MUST be valid JSON strictly matching the schema above, \
         with no surrounding prose and no code fences.\n",
    );
    if !language.is_empty() {
        out.push_str(&format!(
            "Localize all content and field values to {language}.\n"
        ));
    }
    out
}

fn markdown_instructions(schema: &Value, language: &str) -> String {
    let mut out = String::from("\n## Output Format\n\nRespond in Markdown with these sections:\n");
    out.push_str(&markdown_format_spec(schema));
    if !language.is_empty() {
        out.push_str(&format!("\nWrite the review in {language}.\n"));
    }
    out
}

/// Derive a Markdown format spec from a composed JSON schema.
pub fn markdown_format_spec(schema: &Value) -> String {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return String::new();
    };

    let mut names: Vec<&String> = props.keys().collect();
    names.sort_by_key(|name| section_order(name));

    let mut out = String::new();
    for name in names {
        let prop = &props[name.as_str()];
        out.push_str(&format!("\n### {name}\n\n"));
        if prop.get("type").and_then(Value::as_str) == Some("array") {
            render_findings_section(prop, &mut out);
        } else {
            out.push_str(&format!("{}\n", field_description(prop)));
        }
    }
    out
}

fn section_order(name: &str) -> (usize, String) {
    match SECTION_PRIORITY.iter().position(|s| *s == name) {
        Some(i) => (i, String::new()),
        None => (SECTION_PRIORITY.len(), name.to_string()),
    }
}

fn render_findings_section(prop: &Value, out: &mut String) {
    let Some(items) = prop.get("items") else {
        out.push_str("List of values\n");
        return;
    };
    let required: Vec<&str> = items
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(fields) = items.get("properties").and_then(Value::as_object) else {
        out.push_str("List of values\n");
        return;
    };

    out.push_str("One entry per finding.\n\nRequired fields:\n");
    for (name, field) in fields {
        if required.contains(&name.as_str()) {
            out.push_str(&format!("- {name}: {}\n", field_description(field)));
        }
    }
    out.push_str("\nOptional fields:\n");
    for (name, field) in fields {
        if !required.contains(&name.as_str()) {
            out.push_str(&format!("- {name}: {}\n", field_description(field)));
        }
    }
}

/// A field's own description wins; otherwise a default per shape:
/// `One of: …` for enums, `Text value` for strings, `Integer value` for
/// integers, `List of values` for arrays, empty otherwise.
fn field_description(field: &Value) -> String {
    if let Some(desc) = field.get("description").and_then(Value::as_str)
        && !desc.is_empty()
    {
        return desc.to_string();
    }
    if let Some(values) = field.get("enum").and_then(Value::as_array) {
        let list: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
        return format!("One of: {}", list.join(", "));
    }
    match field.get("type").and_then(Value::as_str) {
        Some("string") => "Text value".to_string(),
        Some("integer") => "Integer value".to_string(),
        Some("array") => "List of values".to_string(),
        _ => String::new(),
    }
}
