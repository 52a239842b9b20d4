//! Filter chain assembly.
//!
//! The chain is an explicit ordered list of stage descriptors, produced by
//! a pure function of the configuration snapshot and the set of available
//! authentication handlers. Building it as data rather than behavior makes
//! stage ordering and conditional inclusion directly testable: assembling
//! twice from the same inputs yields structurally equal chains.
//!
//! The chain is assembled exactly once at startup and is immutable and
//! shared read-only afterwards; per-request traversal never mutates it.

use crate::config::SecurityConfig;
use crate::identity::{AuthScheme, AUTH_HANDLER_ORDER};
use std::collections::BTreeSet;

/// A named stage of the security chain: either an authentication handler
/// for one scheme, or a cross-cutting handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Bypass for ignored paths, outside all other stages.
    IgnoredBypass,
    /// Stateless session policy: no session is ever created, no URL
    /// session-id rewriting, null session-fixation strategy.
    SessionPolicy,
    /// CSRF-token validation on CSRF-applicable requests.
    Csrf,
    /// Translates unauthenticated access into a sign-in response and
    /// forbidden access into an access-denied response.
    ExceptionTranslation,
    /// Remembers the originally requested URL across a sign-in redirect.
    RequestCache,
    /// Logout bound to the configured sign-out URL.
    Logout,
    /// Remember-me cookie authentication.
    RememberMe,
    /// An authentication handler for one scheme.
    Authentication(AuthScheme),
}

/// The assembled, ordered security chain.
///
/// Built once at startup; read-only thereafter and shared by all
/// request-handling tasks. `PartialEq` is structural, so determinism of
/// assembly is testable by direct comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    stages: Vec<Stage>,
}

impl FilterChain {
    /// Assemble the chain from a configuration snapshot and the set of
    /// available authentication schemes.
    ///
    /// Stage order is fixed: ignored bypass, session policy, CSRF (only if
    /// enabled), exception translation, request cache, logout, remember-me,
    /// then the interactive authentication handlers in their fixed priority
    /// order filtered by availability. With API security enabled, the JWT
    /// handler (if available) and the signature handler are appended last,
    /// in that order.
    ///
    /// Pure and deterministic: identical inputs produce an identical chain.
    pub fn assemble(config: &SecurityConfig, available: &BTreeSet<AuthScheme>) -> Self {
        let mut stages = vec![Stage::IgnoredBypass, Stage::SessionPolicy];

        if config.csrf_protection {
            stages.push(Stage::Csrf);
        }

        stages.push(Stage::ExceptionTranslation);
        stages.push(Stage::RequestCache);
        stages.push(Stage::Logout);
        stages.push(Stage::RememberMe);

        for scheme in AUTH_HANDLER_ORDER {
            if available.contains(&scheme) {
                stages.push(Stage::Authentication(scheme));
            }
        }

        if config.api_security {
            if available.contains(&AuthScheme::Jwt) {
                stages.push(Stage::Authentication(AuthScheme::Jwt));
            }
            stages.push(Stage::Authentication(AuthScheme::Signature));
        }

        Self { stages }
    }

    /// The stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether the chain contains the given stage.
    pub fn contains(&self, stage: &Stage) -> bool {
        self.stages.contains(stage)
    }

    /// The authentication schemes present in the chain, in order.
    pub fn auth_schemes(&self) -> impl Iterator<Item = AuthScheme> + '_ {
        self.stages.iter().filter_map(|s| match s {
            Stage::Authentication(scheme) => Some(*scheme),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemes(list: &[AuthScheme]) -> BTreeSet<AuthScheme> {
        list.iter().copied().collect()
    }

    #[test]
    fn assembly_is_deterministic() {
        let config = SecurityConfig {
            api_security: true,
            ..SecurityConfig::default()
        };
        let available = schemes(&[AuthScheme::Password, AuthScheme::GitHub, AuthScheme::Jwt]);

        let a = FilterChain::assemble(&config, &available);
        let b = FilterChain::assemble(&config, &available);
        assert_eq!(a, b);
    }

    #[test]
    fn cross_cutting_stages_come_first_in_fixed_order() {
        let chain = FilterChain::assemble(&SecurityConfig::default(), &BTreeSet::new());
        assert_eq!(
            chain.stages(),
            [
                Stage::IgnoredBypass,
                Stage::SessionPolicy,
                Stage::Csrf,
                Stage::ExceptionTranslation,
                Stage::RequestCache,
                Stage::Logout,
                Stage::RememberMe,
            ]
        );
    }

    #[test]
    fn auth_handlers_keep_priority_order_regardless_of_registration() {
        let config = SecurityConfig::default();
        // Availability is a set, so registration order cannot matter; the
        // chain must follow the fixed priority order.
        let available = schemes(&[
            AuthScheme::GitHub,
            AuthScheme::Password,
            AuthScheme::Twitter,
            AuthScheme::Google,
        ]);

        let chain = FilterChain::assemble(&config, &available);
        let order: Vec<AuthScheme> = chain.auth_schemes().collect();
        assert_eq!(
            order,
            [
                AuthScheme::Password,
                AuthScheme::Google,
                AuthScheme::Twitter,
                AuthScheme::GitHub,
            ]
        );
    }

    #[test]
    fn absent_handlers_are_skipped_entirely() {
        let chain = FilterChain::assemble(
            &SecurityConfig::default(),
            &schemes(&[AuthScheme::Password]),
        );
        assert!(chain.contains(&Stage::Authentication(AuthScheme::Password)));
        assert!(!chain.contains(&Stage::Authentication(AuthScheme::OpenId)));
        assert!(!chain.contains(&Stage::Authentication(AuthScheme::Facebook)));
    }

    #[test]
    fn api_security_appends_token_then_signature_last() {
        let config = SecurityConfig {
            api_security: true,
            ..SecurityConfig::default()
        };
        let chain = FilterChain::assemble(&config, &schemes(&[AuthScheme::Password, AuthScheme::Jwt]));

        let order: Vec<AuthScheme> = chain.auth_schemes().collect();
        assert_eq!(
            order,
            [AuthScheme::Password, AuthScheme::Jwt, AuthScheme::Signature]
        );
        assert_eq!(
            chain.stages().last(),
            Some(&Stage::Authentication(AuthScheme::Signature))
        );
    }

    #[test]
    fn disabling_api_security_shrinks_the_chain() {
        let available = schemes(&[AuthScheme::Password, AuthScheme::Jwt]);
        let enabled = FilterChain::assemble(
            &SecurityConfig {
                api_security: true,
                ..SecurityConfig::default()
            },
            &available,
        );
        let disabled = FilterChain::assemble(&SecurityConfig::default(), &available);

        assert!(enabled.len() > disabled.len());
        assert!(!disabled.contains(&Stage::Authentication(AuthScheme::Jwt)));
        assert!(!disabled.contains(&Stage::Authentication(AuthScheme::Signature)));
    }

    #[test]
    fn disabling_csrf_removes_the_stage() {
        let config = SecurityConfig {
            csrf_protection: false,
            ..SecurityConfig::default()
        };
        let chain = FilterChain::assemble(&config, &BTreeSet::new());
        assert!(!chain.contains(&Stage::Csrf));

        let with_csrf = FilterChain::assemble(&SecurityConfig::default(), &BTreeSet::new());
        assert_eq!(with_csrf.len(), chain.len() + 1);
    }
}
