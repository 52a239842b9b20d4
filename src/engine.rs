//! The authorization decision engine.
//!
//! A [`RuleSet`] is the compiled, immutable form of the protected-resource
//! configuration. It is built once at startup and shared read-only across
//! all request-handling tasks; evaluation never mutates it, so concurrent
//! reads need no locking.
//!
//! Evaluation iterates rules in declaration order and stops at the first
//! rule whose pattern set matches the path. Paths not covered by any rule
//! are **allowed for everyone, including anonymous requests**. This is an
//! allowlist-of-restrictions model, not default-deny: every path that needs
//! protection must be listed in `security.protected`.

use crate::config::{ConfigError, SecurityConfig};
use crate::identity::Identity;
use crate::rule::{self, AuthzRule, Role};
use std::collections::BTreeSet;

/// The outcome of an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// The request may proceed to the application.
    Allow,
    /// An identity is present but holds none of the required roles.
    /// Terminal: routed to the access-denied handler. Distinct from
    /// [`Access::Unauthenticated`].
    Deny {
        /// The roles the matched rule required.
        required: BTreeSet<Role>,
    },
    /// The path requires a role but no identity was established.
    /// Routed to the sign-in entry point.
    Unauthenticated {
        /// The roles the matched rule required.
        required: BTreeSet<Role>,
    },
}

impl Access {
    /// Whether the request may proceed.
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// The compiled, ordered authorization rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<AuthzRule>,
}

impl RuleSet {
    /// Compile the rule set from a configuration snapshot. Fails fast on
    /// malformed rules; see [`crate::rule::compile`].
    pub fn compile(config: &SecurityConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: rule::compile(config)?,
        })
    }

    /// Build from already-compiled rules, preserving their order.
    pub fn from_rules(rules: Vec<AuthzRule>) -> Self {
        Self { rules }
    }

    /// The compiled rules in evaluation order.
    pub fn rules(&self) -> &[AuthzRule] {
        &self.rules
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are compiled (everything is public).
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decide access for a path and an optional identity.
    ///
    /// The first rule matching the path determines the required roles;
    /// later rules matching the same path never apply. An unmatched path
    /// is allowed regardless of identity.
    pub fn decide(&self, path: &str, identity: Option<&Identity>) -> Access {
        for rule in &self.rules {
            if !rule.matches(path) {
                continue;
            }

            return match identity {
                None => {
                    tracing::debug!(
                        rule = rule.name(),
                        path,
                        "protected path reached without identity"
                    );
                    Access::Unauthenticated {
                        required: rule.roles().clone(),
                    }
                }
                Some(id) if rule.permits(&id.roles) => {
                    tracing::trace!(
                        rule = rule.name(),
                        path,
                        subject = %id.subject,
                        scheme = %id.scheme,
                        "authorized"
                    );
                    Access::Allow
                }
                Some(id) => {
                    tracing::debug!(
                        rule = rule.name(),
                        path,
                        subject = %id.subject,
                        "identity lacks required roles"
                    );
                    Access::Deny {
                        required: rule.roles().clone(),
                    }
                }
            };
        }

        tracing::trace!(path, "no rule matched; path is unrestricted");
        Access::Allow
    }
}
