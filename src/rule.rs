//! Authorization rules and the rule compiler.
//!
//! A rule maps a set of URL patterns to the roles required to access them.
//! Rules are compiled once from the [`SecurityConfig`] and are immutable
//! thereafter. Evaluation order equals configuration declaration order:
//! the first matching rule wins, mirroring ACL-style firewalls, so an
//! administrator writing a specific pattern before a general one relies on
//! the specific one taking precedence.

use crate::config::{ConfigError, ProtectedEntry, SecurityConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An uppercase role identifier.
///
/// The canonical vocabulary is USER, MOD, ADMIN and APP, but configuration
/// may reference any role name; names are uppercased on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Role(String);

impl Role {
    /// Create a role, trimming and uppercasing the name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_uppercase())
    }

    /// The canonical USER role.
    pub fn user() -> Self {
        Self::new("USER")
    }

    /// The canonical MOD role.
    pub fn moderator() -> Self {
        Self::new("MOD")
    }

    /// The canonical ADMIN role.
    pub fn admin() -> Self {
        Self::new("ADMIN")
    }

    /// The canonical APP role.
    pub fn app() -> Self {
        Self::new("APP")
    }

    /// The role name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The role set substituted when a rule omits its roles: exactly the four
/// canonical roles.
pub fn default_roles() -> BTreeSet<Role> {
    [Role::user(), Role::moderator(), Role::admin(), Role::app()]
        .into_iter()
        .collect()
}

/// URL pattern for rule matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Match any path.
    Any,
    /// Match an exact path.
    Exact(String),
    /// Match a path prefix (e.g. `/api/` matches `/api/users`).
    Prefix(String),
    /// Match using a glob pattern: `*` matches one path segment, `**`
    /// matches any number of segments.
    Glob(String),
}

impl PathPattern {
    /// Parse a pattern from a string.
    ///
    /// - `*` or `any` - matches any path
    /// - paths containing `*` - glob pattern
    /// - paths ending with `/` - prefix match
    /// - other paths - exact match
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s == "*" || s.eq_ignore_ascii_case("any") {
            return Self::Any;
        }

        if s.contains('*') {
            return Self::Glob(s.to_string());
        }

        if s.ends_with('/') {
            return Self::Prefix(s.to_string());
        }

        Self::Exact(s.to_string())
    }

    /// Check whether a request path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(p) => p == path,
            Self::Prefix(prefix) => path.starts_with(prefix),
            Self::Glob(pattern) => Self::glob_matches(pattern, path),
        }
    }

    fn glob_matches(pattern: &str, path: &str) -> bool {
        let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        Self::glob_match_parts(&pattern_parts, &path_parts)
    }

    fn glob_match_parts(pattern: &[&str], path: &[&str]) -> bool {
        if pattern.is_empty() {
            return path.is_empty();
        }

        let (first_pattern, rest_pattern) = (pattern[0], &pattern[1..]);

        if first_pattern == "**" {
            // ** matches zero or more segments
            if rest_pattern.is_empty() {
                return true;
            }
            for i in 0..=path.len() {
                if Self::glob_match_parts(rest_pattern, &path[i..]) {
                    return true;
                }
            }
            false
        } else if path.is_empty() {
            false
        } else {
            let (first_path, rest_path) = (path[0], &path[1..]);
            let segment_matches = first_pattern == "*" || first_pattern == first_path;
            segment_matches && Self::glob_match_parts(rest_pattern, rest_path)
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(p) | Self::Prefix(p) | Self::Glob(p) => f.write_str(p),
        }
    }
}

/// A compiled authorization rule: URL patterns plus the roles required to
/// access them. Immutable once compiled; patterns are never empty and the
/// role set is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzRule {
    name: String,
    patterns: Vec<PathPattern>,
    roles: BTreeSet<Role>,
}

impl AuthzRule {
    /// Build a rule directly. The role set falls back to the canonical
    /// four when empty, matching the compiler's behavior.
    pub fn new(
        name: impl Into<String>,
        patterns: Vec<PathPattern>,
        roles: BTreeSet<Role>,
    ) -> Self {
        let roles = if roles.is_empty() { default_roles() } else { roles };
        Self {
            name: name.into(),
            patterns,
            roles,
        }
    }

    /// The rule name from the configuration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The URL patterns this rule covers.
    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    /// The roles required by this rule, at least one of which an identity
    /// must hold.
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Check whether any pattern of this rule matches the path.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    /// Check whether a role set satisfies this rule (any overlap).
    pub fn permits(&self, roles: &BTreeSet<Role>) -> bool {
        !self.roles.is_disjoint(roles)
    }
}

/// Compile the declarative `security.protected` configuration into an
/// ordered rule list.
///
/// For each entry, plain strings become URL patterns and nested lists
/// become role names (uppercased). An entry without roles gets the default
/// four-role set. Entry order is preserved and determines precedence.
///
/// When `api_security` is enabled, a rule covering the API base path is
/// placed first. When disabled, the API base path never enters the rule
/// set, even if a protected entry lists it explicitly; such patterns are
/// dropped with a warning, and a rule reduced to zero patterns this way is
/// dropped entirely.
pub fn compile(config: &SecurityConfig) -> Result<Vec<AuthzRule>, ConfigError> {
    let mut rules = Vec::with_capacity(config.protected.len() + 1);

    if config.api_security {
        rules.push(AuthzRule::new(
            "api",
            vec![
                PathPattern::Exact(config.api_base.clone()),
                PathPattern::parse(&format!("{}/**", config.api_base)),
            ],
            default_roles(),
        ));
    }

    for (name, entries) in &config.protected {
        if entries.is_empty() {
            return Err(ConfigError::EmptyRule(name.clone()));
        }

        let mut patterns = Vec::new();
        let mut roles = BTreeSet::new();
        for entry in entries {
            match entry {
                ProtectedEntry::Pattern(p) => patterns.push(p.clone()),
                ProtectedEntry::Roles(names) => {
                    roles.extend(names.iter().map(Role::new));
                }
            }
        }

        if patterns.is_empty() {
            return Err(ConfigError::NoPatterns(name.clone()));
        }

        if !config.api_security {
            let before = patterns.len();
            patterns.retain(|p| !is_api_pattern(p, &config.api_base));
            if patterns.len() < before {
                tracing::warn!(
                    rule = %name,
                    api_base = %config.api_base,
                    "API security is disabled; dropping API base patterns from rule"
                );
            }
            if patterns.is_empty() {
                tracing::warn!(rule = %name, "rule only covered the API surface; skipping");
                continue;
            }
        }

        let patterns = patterns.iter().map(|p| PathPattern::parse(p)).collect();
        rules.push(AuthzRule::new(name.clone(), patterns, roles));
    }

    Ok(rules)
}

fn is_api_pattern(pattern: &str, api_base: &str) -> bool {
    let pattern = pattern.trim();
    pattern == api_base || pattern.starts_with(&format!("{}/", api_base))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> SecurityConfig {
        SecurityConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn role_is_uppercased() {
        assert_eq!(Role::new("admin"), Role::admin());
        assert_eq!(Role::new(" Mod "), Role::moderator());
        assert_eq!(Role::new("CUSTOM").as_str(), "CUSTOM");
    }

    #[test]
    fn pattern_exact() {
        let pattern = PathPattern::parse("/api/users");
        assert!(pattern.matches("/api/users"));
        assert!(!pattern.matches("/api/users/1"));
    }

    #[test]
    fn pattern_prefix() {
        let pattern = PathPattern::parse("/api/");
        assert!(pattern.matches("/api/users"));
        assert!(pattern.matches("/api/users/1"));
        assert!(!pattern.matches("/admin/users"));
    }

    #[test]
    fn pattern_glob() {
        let pattern = PathPattern::parse("/admin/*");
        assert!(pattern.matches("/admin/panel"));
        assert!(!pattern.matches("/admin/panel/deep"));
        assert!(!pattern.matches("/admin"));

        let pattern = PathPattern::parse("/v1/**");
        assert!(pattern.matches("/v1/things"));
        assert!(pattern.matches("/v1/things/42/tags"));
        assert!(pattern.matches("/v1"));
    }

    #[test]
    fn compile_preserves_declaration_order() {
        let rules = compile(&config(
            r#"
[security.protected]
specific = ["/admin/audit", ["ADMIN"]]
general = ["/admin/*", ["MOD"]]
"#,
        ))
        .unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name(), "specific");
        assert_eq!(rules[1].name(), "general");
    }

    #[test]
    fn empty_roles_get_default_set() {
        let rules = compile(&config(
            r#"
[security.protected]
x = ["/x"]
"#,
        ))
        .unwrap();

        assert_eq!(rules[0].roles(), &default_roles());
        assert_eq!(rules[0].roles().len(), 4);
    }

    #[test]
    fn roles_are_uppercased() {
        let rules = compile(&config(
            r#"
[security.protected]
x = ["/x", ["admin", "mod"]]
"#,
        ))
        .unwrap();

        let expected: BTreeSet<Role> = [Role::admin(), Role::moderator()].into_iter().collect();
        assert_eq!(rules[0].roles(), &expected);
    }

    #[test]
    fn roles_without_patterns_is_fatal() {
        let err = compile(&config(
            r#"
[security.protected]
x = [["ADMIN"]]
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::NoPatterns(name) if name == "x"));
    }

    #[test]
    fn api_rule_is_first_when_enabled() {
        let rules = compile(&config(
            r#"
[security]
api_security = true

[security.protected]
admin = ["/admin/*", ["ADMIN"]]
"#,
        ))
        .unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name(), "api");
        assert!(rules[0].matches("/v1/things"));
        assert!(rules[0].matches("/v1"));
    }

    #[test]
    fn api_patterns_dropped_when_disabled() {
        // Even explicitly configured API patterns never enter the rule set
        // while API security is off.
        let rules = compile(&config(
            r#"
[security.protected]
mixed = ["/v1/private", "/admin/*", ["ADMIN"]]
api-only = ["/v1/other"]
"#,
        ))
        .unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name(), "mixed");
        assert!(!rules[0].matches("/v1/private"));
        assert!(rules[0].matches("/admin/panel"));
    }
}
