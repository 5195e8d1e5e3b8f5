//! Finding output schema: the immutable base plus user-declared extensions.
//!
//! The composed schema is a plain `serde_json::Value` tree so that both the
//! JSON format instructions and the derived Markdown format spec operate on
//! one neutral representation.

use serde_json::{Value, json};
use tracing::warn;

use super::rules::ExtraField;

/// Ordered severity levels, lowest first. Not user-extensible.
pub const SEVERITY_LEVELS: [&str; 5] = ["info", "low", "medium", "high", "critical"];

/// Finding field names owned by the base schema. Extra fields must not
/// collide with these.
pub const RESERVED_FIELDS: [&str; 8] = [
    "severity",
    "title",
    "description",
    "category",
    "location",
    "suggestion",
    "code_snippet",
    "status",
];

/// Extra-field types accepted by validation.
pub const EXTRA_FIELD_TYPES: [&str; 4] = ["string", "integer", "boolean", "array"];

/// Rank of a severity within [`SEVERITY_LEVELS`], lowest = 0.
pub fn severity_rank(level: &str) -> Option<usize> {
    SEVERITY_LEVELS.iter().position(|s| *s == level)
}

/// The immutable base schema: a summary string and an array of findings
/// with `{severity, title, description}` required.
pub fn base_schema() -> Value {
    json!({
        "type": "object",
        "required": ["summary", "findings"],
        "properties": {
            "summary": {
                "type": "string",
                "description": "Overall assessment of the change"
            },
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["severity", "title", "description"],
                    "properties": {
                        "severity": {
                            "type": "string",
                            "enum": SEVERITY_LEVELS,
                            "description": "Severity of the finding"
                        },
                        "title": {
                            "type": "string",
                            "description": "Short title of the finding"
                        },
                        "description": {
                            "type": "string",
                            "description": "Detailed explanation of the finding"
                        },
                        "category": {
                            "type": "string",
                            "description": "Focus area the finding belongs to"
                        },
                        "location": {
                            "type": "string",
                            "description": "File path and line, e.g. src/main.rs:42"
                        },
                        "suggestion": {
                            "type": "string",
                            "description": "Suggested fix"
                        },
                        "code_snippet": {
                            "type": "string",
                            "description": "Relevant code excerpt"
                        },
                        "status": {
                            "type": "string",
                            "enum": ["FIXED", "NEW", "PERSISTS"],
                            "description": "Status relative to the previous review"
                        }
                    }
                }
            }
        }
    })
}

/// Compose the effective findings schema for a rule.
///
/// Extra fields land under `findings.items.properties`; `required` is
/// extended by fields declared required and, when history comparison is
/// enabled, by `status`. The base is deep-cloned; callers never observe a
/// mutated base. Extras with an empty name are skipped with a warning —
/// name collisions are rejected earlier, during validation.
pub fn build_json_schema(extra_fields: &[ExtraField], history_compare: bool) -> Value {
    let mut schema = base_schema();

    {
        let items = schema
            .pointer_mut("/properties/findings/items")
            .expect("base schema has findings.items");

        for field in extra_fields {
            if field.name.is_empty() {
                warn!("skipping extra finding field with empty name");
                continue;
            }
            let mut prop = json!({
                "type": field.field_type,
                "description": field.description,
            });
            if !field.enum_values.is_empty() {
                prop["enum"] = json!(field.enum_values);
            }
            items["properties"][&field.name] = prop;
            if field.required {
                items["required"]
                    .as_array_mut()
                    .expect("required is an array")
                    .push(json!(field.name));
            }
        }

        if history_compare {
            let required = items["required"].as_array_mut().expect("required is an array");
            if !required.iter().any(|v| v == "status") {
                required.push(json!("status"));
            }
        }
    }

    schema
}
