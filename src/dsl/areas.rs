//! Closed taxonomy of review focus areas.
//!
//! The table is fixed at compile time and its order is deterministic, so
//! prompts rendered from the same rule are byte-identical across runs.
//! Unknown ids are tolerated by lookups (callers decide whether to warn).

/// Area groups, mirrored in [`AREAS`].
pub const GROUPS: [&str; 8] = [
    "code-quality",
    "security",
    "performance",
    "backdoor",
    "testing",
    "architecture",
    "compliance",
    "documentation",
];

/// `(id, group, description)` for every known focus area.
pub const AREAS: [(&str, &str, &str); 24] = [
    (
        "code-smells",
        "code-quality",
        "Confusing structure, dead code, and maintainability hazards",
    ),
    (
        "naming-conventions",
        "code-quality",
        "Identifier naming consistency and clarity",
    ),
    (
        "error-handling",
        "code-quality",
        "Swallowed errors, missing propagation, and inconsistent failure paths",
    ),
    (
        "code-duplication",
        "code-quality",
        "Copy-pasted logic that should be factored out",
    ),
    (
        "security-vulnerabilities",
        "security",
        "Exploitable flaws such as unsafe deserialization or path traversal",
    ),
    (
        "injection-attacks",
        "security",
        "SQL, command, and template injection through untrusted input",
    ),
    (
        "authentication-flaws",
        "security",
        "Broken authentication, session handling, and authorization checks",
    ),
    (
        "sensitive-data-exposure",
        "security",
        "Secrets, tokens, or personal data leaking into logs or responses",
    ),
    (
        "performance-bottlenecks",
        "performance",
        "Hot-path inefficiencies, accidental quadratic work, blocking calls",
    ),
    (
        "memory-usage",
        "performance",
        "Unbounded growth, needless copies, and leaked resources",
    ),
    (
        "database-queries",
        "performance",
        "N+1 queries, missing indexes, and oversized result sets",
    ),
    (
        "backdoor-implants",
        "backdoor",
        "Logic that grants hidden access or exfiltrates data",
    ),
    (
        "suspicious-dependencies",
        "backdoor",
        "Unvetted or typo-squatted packages and unexpected network calls",
    ),
    (
        "obfuscated-logic",
        "backdoor",
        "Deliberately hard-to-read code hiding its real behavior",
    ),
    (
        "test-coverage",
        "testing",
        "Changed behavior without corresponding tests",
    ),
    (
        "test-quality",
        "testing",
        "Assertions that cannot fail, hidden ordering dependencies, flakiness",
    ),
    (
        "architecture-violations",
        "architecture",
        "Layering breaks and dependencies flowing the wrong way",
    ),
    (
        "api-design",
        "architecture",
        "Public interface consistency, versioning, and misuse resistance",
    ),
    (
        "dependency-management",
        "architecture",
        "Version pinning, duplicated dependencies, and upgrade hygiene",
    ),
    (
        "concurrency-issues",
        "architecture",
        "Races, deadlocks, and non-atomic check-then-act sequences",
    ),
    (
        "license-compliance",
        "compliance",
        "License compatibility of added code and dependencies",
    ),
    (
        "regulatory-compliance",
        "compliance",
        "Data-handling obligations such as retention and residency",
    ),
    (
        "missing-documentation",
        "documentation",
        "Public surfaces and non-obvious behavior without docs",
    ),
    (
        "outdated-documentation",
        "documentation",
        "Docs contradicting the code they describe",
    ),
];

/// Description for an area id. Unknown ids yield `None`.
pub fn description(id: &str) -> Option<&'static str> {
    AREAS.iter().find(|(a, _, _)| *a == id).map(|(_, _, d)| *d)
}

/// Group for an area id.
pub fn group(id: &str) -> Option<&'static str> {
    AREAS.iter().find(|(a, _, _)| *a == id).map(|(_, g, _)| *g)
}

/// All area ids in a group, in declaration order.
pub fn ids_in_group(group: &str) -> Vec<&'static str> {
    AREAS
        .iter()
        .filter(|(_, g, _)| *g == group)
        .map(|(a, _, _)| *a)
        .collect()
}

pub fn is_valid(id: &str) -> bool {
    AREAS.iter().any(|(a, _, _)| *a == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup_known_area() {
        assert!(is_valid("injection-attacks"));
        assert_eq!(group("injection-attacks"), Some("security"));
        assert!(description("injection-attacks").unwrap().contains("injection"));
    }

    #[test]
    fn test_lookup_unknown_area() {
        assert!(!is_valid("quantum-vibes"));
        assert_eq!(description("quantum-vibes"), None);
        assert_eq!(group("quantum-vibes"), None);
    }

    #[test]
    fn test_ids_unique() {
        let ids: HashSet<&str> = AREAS.iter().map(|(a, _, _)| *a).collect();
        assert_eq!(ids.len(), AREAS.len());
    }

    #[test]
    fn test_every_area_group_is_known() {
        for (id, g, desc) in AREAS {
            assert!(GROUPS.contains(&g), "area {id} has unknown group {g}");
            assert!(!desc.is_empty());
        }
    }

    #[test]
    fn test_every_group_has_areas() {
        for g in GROUPS {
            assert!(!ids_in_group(g).is_empty(), "group {g} is empty");
        }
    }

    #[test]
    fn test_group_listing_order_is_declaration_order() {
        assert_eq!(
            ids_in_group("security"),
            vec![
                "security-vulnerabilities",
                "injection-attacks",
                "authentication-flaws",
                "sensitive-data-exposure",
            ]
        );
    }
}
