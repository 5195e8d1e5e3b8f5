use std::sync::OnceLock;

use regex::Regex;

/// Environment prefixes eligible for expansion. Anything else stays verbatim
/// so that secret-looking sigils in config values are never resolved.
pub const ALLOWED_PREFIXES: [&str; 5] = [
    "SCOPEVIEW_",
    "CI_",
    "GITHUB_",
    "GITLAB_",
    "CUSTOM_REVIEW_",
];

// Matches `${NAME}` and `${NAME:-default}`. `$NAME` without braces is
// intentionally not matched.
fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").expect("env regex"))
}

fn is_allowed(name: &str) -> bool {
    ALLOWED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Expand `${NAME}` / `${NAME:-default}` occurrences using the process
/// environment. See [`expand_with`] for the exact rules.
pub fn expand(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand with an explicit variable lookup.
///
/// - A variable whose name starts with an allowed prefix expands to its
///   value, or to the default, or to the empty string.
/// - A blocked variable expands to its default if one is given; without a
///   default the `${NAME}` text is preserved verbatim.
/// - `$NAME` without braces is never touched.
pub fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    pattern()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let default = caps.get(3).map(|m| m.as_str());
            if !is_allowed(name) {
                return match default {
                    Some(d) => d.to_string(),
                    None => caps[0].to_string(),
                };
            }
            match lookup(name) {
                Some(value) => value,
                None => default.unwrap_or("").to_string(),
            }
        })
        .into_owned()
}
