//! Phase 1 artifacts: the report structure returned by the agent, its
//! validation, leaf accounting, and the section rows derived from it.
//!
//! Sections form a shallow forest (depth <= 2), stored as a flat row list
//! with parent ids. Only leaves receive generated content.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{ReportSection, SectionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportStructure {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sections: Vec<StructureSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructureSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsections: Option<Vec<StructureSection>>,
}

impl StructureSection {
    fn subsection_count(&self) -> usize {
        self.subsections.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Extract the first balanced `{…}` span, respecting JSON strings and
/// escapes. Agents habitually wrap the object in prose.
pub fn extract_json_object(raw: &str) -> Result<&str> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::SchemaViolation("no JSON object in response".to_string()))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Err(Error::SchemaViolation("unbalanced JSON object in response".to_string()))
}

/// Parse a phase 1 agent response into a structure.
pub fn parse_structure(raw: &str) -> Result<ReportStructure> {
    let json = extract_json_object(raw)?;
    serde_json::from_str(json)
        .map_err(|e| Error::SchemaViolation(format!("structure parse failed: {e}")))
}

/// Validate structural invariants. `require_nested` additionally demands a
/// subsection under every top-level section.
pub fn validate_structure(structure: &ReportStructure, require_nested: bool) -> Result<()> {
    if structure.title.is_empty() {
        return Err(Error::SchemaViolation("structure title is empty".to_string()));
    }
    if structure.summary.is_empty() {
        return Err(Error::SchemaViolation("structure summary is empty".to_string()));
    }
    if structure.sections.is_empty() {
        return Err(Error::SchemaViolation("structure has no sections".to_string()));
    }

    for section in &structure.sections {
        validate_section(section)?;
        if require_nested && section.subsection_count() == 0 {
            return Err(Error::SchemaViolation(format!(
                "section '{}' has no subsections but a nested structure was required",
                section.id
            )));
        }
        for sub in section.subsections.iter().flatten() {
            validate_section(sub)?;
        }
    }
    Ok(())
}

fn validate_section(section: &StructureSection) -> Result<()> {
    if section.id.is_empty() {
        return Err(Error::SchemaViolation(format!(
            "section '{}' has an empty id",
            section.title
        )));
    }
    if section.title.is_empty() {
        return Err(Error::SchemaViolation(format!(
            "section '{}' has an empty title",
            section.id
        )));
    }
    Ok(())
}

/// Leaf count: a top-level section contributes `max(1, |subsections|)`.
pub fn leaf_count(structure: &ReportStructure) -> u32 {
    structure
        .sections
        .iter()
        .map(|s| s.subsection_count().max(1) as u32)
        .sum()
}

/// Flatten the structure into store rows in depth-first order. Parents get
/// `is_leaf = false`; their children carry the parent's section id.
pub fn build_section_rows(report_id: &str, structure: &ReportStructure) -> Vec<ReportSection> {
    let mut rows = Vec::new();
    let mut index = 0u32;

    let mut push = |id: &str, title: &str, description: &str, parent: Option<&str>, is_leaf: bool, index: &mut u32| {
        rows.push(ReportSection {
            report_id: report_id.to_string(),
            section_index: *index,
            section_id: id.to_string(),
            parent_section_id: parent.map(str::to_string),
            is_leaf,
            title: title.to_string(),
            description: description.to_string(),
            content: String::new(),
            summary: String::new(),
            status: SectionStatus::Pending,
            error: String::new(),
            duration_secs: 0,
        });
        *index += 1;
    };

    for section in &structure.sections {
        match &section.subsections {
            Some(subs) if !subs.is_empty() => {
                push(&section.id, &section.title, &section.description, None, false, &mut index);
                for sub in subs {
                    push(
                        &sub.id,
                        &sub.title,
                        &sub.description,
                        Some(&section.id),
                        true,
                        &mut index,
                    );
                }
            }
            _ => {
                push(&section.id, &section.title, &section.description, None, true, &mut index);
            }
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_structure() -> ReportStructure {
        ReportStructure {
            title: "Wiki".into(),
            summary: "The wiki".into(),
            sections: vec![
                StructureSection {
                    id: "arch".into(),
                    title: "Architecture".into(),
                    description: "High level".into(),
                    subsections: Some(vec![
                        StructureSection {
                            id: "arch-overview".into(),
                            title: "Overview".into(),
                            description: String::new(),
                            subsections: None,
                        },
                        StructureSection {
                            id: "arch-data".into(),
                            title: "Data Flow".into(),
                            description: String::new(),
                            subsections: None,
                        },
                    ]),
                },
                StructureSection {
                    id: "ops".into(),
                    title: "Operations".into(),
                    description: String::new(),
                    subsections: Some(vec![
                        StructureSection {
                            id: "ops-deploy".into(),
                            title: "Deployment".into(),
                            description: String::new(),
                            subsections: None,
                        },
                        StructureSection {
                            id: "ops-monitoring".into(),
                            title: "Monitoring".into(),
                            description: String::new(),
                            subsections: None,
                        },
                    ]),
                },
            ],
        }
    }

    #[test]
    fn test_extract_plain_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#).unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_object_with_surrounding_prose() {
        let raw = "Here is the structure:\n{\"a\": {\"b\": 2}}\nHope that helps!";
        assert_eq!(extract_json_object(raw).unwrap(), r#"{"a": {"b": 2}}"#);
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let raw = r#"{"text": "closing } brace and \" quote"} trailing"#;
        assert_eq!(
            extract_json_object(raw).unwrap(),
            r#"{"text": "closing } brace and \" quote"}"#
        );
    }

    #[test]
    fn test_extract_errors() {
        assert!(matches!(
            extract_json_object("no braces at all"),
            Err(Error::SchemaViolation(_))
        ));
        assert!(matches!(
            extract_json_object(r#"{"a": 1"#),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_parse_structure_roundtrip() {
        let structure = nested_structure();
        let json = serde_json::to_string(&structure).unwrap();
        let reparsed = parse_structure(&json).unwrap();
        assert_eq!(structure, reparsed);
    }

    #[test]
    fn test_parse_structure_from_prose_response() {
        let raw = "Sure! Here it is:\n{\"title\": \"T\", \"summary\": \"S\", \"sections\": [{\"id\": \"a\", \"title\": \"A\"}]}";
        let structure = parse_structure(raw).unwrap();
        assert_eq!(structure.title, "T");
        assert_eq!(structure.sections.len(), 1);
        assert_eq!(structure.sections[0].subsections, None);
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let mut s = nested_structure();
        s.title.clear();
        assert!(validate_structure(&s, false).is_err());

        let mut s = nested_structure();
        s.summary.clear();
        assert!(validate_structure(&s, false).is_err());

        let mut s = nested_structure();
        s.sections.clear();
        assert!(validate_structure(&s, false).is_err());

        let mut s = nested_structure();
        s.sections[0].subsections.as_mut().unwrap()[0].id.clear();
        assert!(validate_structure(&s, false).is_err());
    }

    #[test]
    fn test_validate_nested_requirement() {
        let mut s = nested_structure();
        validate_structure(&s, true).unwrap();
        s.sections[1].subsections = None;
        // Flat top-level sections are fine unless nesting is required.
        validate_structure(&s, false).unwrap();
        let err = validate_structure(&s, true).unwrap_err();
        assert!(err.to_string().contains("no subsections"));
    }

    #[test]
    fn test_leaf_count() {
        assert_eq!(leaf_count(&nested_structure()), 4);

        let mut s = nested_structure();
        s.sections[0].subsections = None; // 1 + 2
        assert_eq!(leaf_count(&s), 3);

        s.sections[1].subsections = Some(vec![]); // max(1, 0) each
        assert_eq!(leaf_count(&s), 2);
    }

    #[test]
    fn test_section_rows_nested() {
        let rows = build_section_rows("rep", &nested_structure());
        assert_eq!(rows.len(), 6); // 2 parents + 4 leaves

        let parents: Vec<&ReportSection> = rows.iter().filter(|r| !r.is_leaf).collect();
        assert_eq!(parents.len(), 2);
        assert!(parents.iter().all(|p| p.parent_section_id.is_none()));

        let leaves: Vec<&ReportSection> = rows.iter().filter(|r| r.is_leaf).collect();
        assert_eq!(leaves.len(), 4);
        assert_eq!(leaves[0].parent_section_id.as_deref(), Some("arch"));
        assert_eq!(leaves[2].parent_section_id.as_deref(), Some("ops"));

        // Depth-first structural order with contiguous indices.
        let ids: Vec<&str> = rows.iter().map(|r| r.section_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["arch", "arch-overview", "arch-data", "ops", "ops-deploy", "ops-monitoring"]
        );
        let indices: Vec<u32> = rows.iter().map(|r| r.section_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_section_rows_flat() {
        let mut s = nested_structure();
        s.sections[0].subsections = None;
        s.sections[1].subsections = None;
        let rows = build_section_rows("rep", &s);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.is_leaf));
        assert!(rows.iter().all(|r| r.parent_section_id.is_none()));
    }
}
