//! TOML configuration for the security gateway.
//!
//! The configuration is loaded once at startup and treated as immutable for
//! the lifetime of the process. Malformed configuration is a fatal error:
//! a rule that fails to parse is never silently skipped, since silent
//! omission would leave a resource unprotected.
//!
//! # Example TOML Format
//!
//! ```toml
//! [security]
//! api_security = true
//! csrf_protection = true
//! signin = "/signin"
//! signout = "/signout"
//! signout_success = "/"
//! access_denied = "/403"
//! ignored = ["/static/**", "/favicon.ico", "/health"]
//!
//! [security.protected]
//! # Each entry is a list of URL patterns, optionally followed by a nested
//! # list of required role names. Omitted roles default to the canonical
//! # four (USER, MOD, ADMIN, APP).
//! admin-area = ["/admin/*", ["ADMIN"]]
//! moderation = ["/mod/*", ["ADMIN", "MOD"]]
//! settings = ["/settings", "/profile/*"]
//! ```
//!
//! Rules are evaluated in **declaration order**: the first entry whose
//! pattern matches the request path determines the required roles, so more
//! specific patterns must be declared before general ones.

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

/// A single element of a protected-resource list: either a URL pattern or
/// a nested list of role names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProtectedEntry {
    /// A URL pattern string, e.g. `"/admin/*"`.
    Pattern(String),
    /// A nested list of role names, e.g. `["ADMIN", "MOD"]`.
    Roles(Vec<String>),
}

/// Immutable configuration snapshot for the gateway.
///
/// Corresponds to the `security.*` keys of the deployment configuration.
/// Loaded once at startup; no hot-reload.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Protected resources: rule name -> list of patterns and role lists.
    /// Iteration order is declaration order and determines rule precedence.
    #[serde(default)]
    pub protected: IndexMap<String, Vec<ProtectedEntry>>,

    /// Whether the machine API surface is protected at all. When false the
    /// API base path is never added to the rule set and the token/signature
    /// authentication stages are not assembled.
    #[serde(default)]
    pub api_security: bool,

    /// Whether CSRF-token validation applies to state-changing browser
    /// requests. Defaults to true.
    #[serde(default = "default_true")]
    pub csrf_protection: bool,

    /// Base path of the machine API surface.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Sign-in page URL, used by the authentication entry point.
    #[serde(default = "default_signin")]
    pub signin: String,

    /// Logout URL bound to the logout stage.
    #[serde(default = "default_signout")]
    pub signout: String,

    /// Post-logout redirect URL.
    #[serde(default = "default_signout_success")]
    pub signout_success: String,

    /// Access-denied page URL, used by the access-denied handler.
    #[serde(default = "default_access_denied")]
    pub access_denied: String,

    /// Path patterns that bypass the security chain entirely (static
    /// assets, health checks). Empty by default: nothing is bypassed
    /// unless explicitly listed.
    #[serde(default)]
    pub ignored: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    "/v1".to_string()
}

fn default_signin() -> String {
    "/signin".to_string()
}

fn default_signout() -> String {
    "/signout".to_string()
}

fn default_signout_success() -> String {
    "/".to_string()
}

fn default_access_denied() -> String {
    "/403".to_string()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            protected: IndexMap::new(),
            api_security: false,
            csrf_protection: true,
            api_base: default_api_base(),
            signin: default_signin(),
            signout: default_signout(),
            signout_success: default_signout_success(),
            access_denied: default_access_denied(),
            ignored: Vec::new(),
        }
    }
}

/// Top-level configuration file wrapper (`[security]` table).
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    security: SecurityConfig,
}

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing error (includes malformed protected entries, which
    /// deserialize as neither a string nor a list of strings).
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// File I/O error.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// A configured URL does not begin with '/'.
    #[error("invalid {key} URL '{value}': must begin with '/'")]
    InvalidUrl {
        /// The configuration key.
        key: &'static str,
        /// The offending value.
        value: String,
    },

    /// A protected rule has an empty entry list.
    #[error("protected rule '{0}' is empty")]
    EmptyRule(String),

    /// A protected rule lists roles but no URL patterns.
    #[error("protected rule '{0}' has no URL patterns")]
    NoPatterns(String),

    /// An ignored-path pattern is blank.
    #[error("invalid ignored pattern '{0}'")]
    InvalidIgnored(String),
}

impl SecurityConfig {
    /// Parse a configuration from a TOML string.
    ///
    /// # Example
    /// ```
    /// use axum_gatekeeper::SecurityConfig;
    ///
    /// let config = SecurityConfig::from_toml(r#"
    /// [security]
    /// api_security = true
    ///
    /// [security.protected]
    /// admin = ["/admin/*", ["ADMIN"]]
    /// "#).unwrap();
    ///
    /// assert!(config.api_security);
    /// assert_eq!(config.protected.len(), 1);
    /// ```
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        file.security.validate()?;
        Ok(file.security)
    }

    /// Load a configuration from a TOML file.
    ///
    /// # Example
    /// ```ignore
    /// use axum_gatekeeper::SecurityConfig;
    ///
    /// let config = SecurityConfig::from_file("config/security.toml").unwrap();
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Validate the configuration. Called by [`Self::from_toml`] and again
    /// by the gatekeeper builder so programmatically constructed configs
    /// get the same checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("signin", &self.signin),
            ("signout", &self.signout),
            ("signout_success", &self.signout_success),
            ("access_denied", &self.access_denied),
            ("api_base", &self.api_base),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::InvalidUrl {
                    key,
                    value: value.clone(),
                });
            }
        }

        for (name, entries) in &self.protected {
            if entries.is_empty() {
                return Err(ConfigError::EmptyRule(name.clone()));
            }
        }

        for pattern in &self.ignored {
            if pattern.trim().is_empty() {
                return Err(ConfigError::InvalidIgnored(pattern.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = SecurityConfig::from_toml(
            r#"
[security]
api_security = true
csrf_protection = false
signin = "/login"
ignored = ["/static/**", "/health"]

[security.protected]
admin = ["/admin/*", ["ADMIN"]]
mixed = ["/a", "/b/*", ["MOD", "admin"]]
open = ["/settings"]
"#,
        )
        .unwrap();

        assert!(config.api_security);
        assert!(!config.csrf_protection);
        assert_eq!(config.signin, "/login");
        assert_eq!(config.signout, "/signout");
        assert_eq!(config.ignored.len(), 2);
        assert_eq!(config.protected.len(), 3);

        // Declaration order is preserved.
        let names: Vec<&str> = config.protected.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, ["admin", "mixed", "open"]);
    }

    #[test]
    fn defaults() {
        let config = SecurityConfig::from_toml("[security]\n").unwrap();
        assert!(!config.api_security);
        assert!(config.csrf_protection);
        assert_eq!(config.api_base, "/v1");
        assert_eq!(config.signin, "/signin");
        assert_eq!(config.signout_success, "/");
        assert_eq!(config.access_denied, "/403");
        assert!(config.protected.is_empty());
        assert!(config.ignored.is_empty());
    }

    #[test]
    fn malformed_entry_is_fatal() {
        // An integer is neither a pattern string nor a role list.
        let err = SecurityConfig::from_toml(
            r#"
[security.protected]
bad = ["/x", 42]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn empty_rule_is_fatal() {
        let err = SecurityConfig::from_toml(
            r#"
[security.protected]
empty = []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyRule(name) if name == "empty"));
    }

    #[test]
    fn relative_url_is_fatal() {
        let err = SecurityConfig::from_toml(
            r#"
[security]
signin = "login"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { key: "signin", .. }));
    }
}
