//! # axum-gatekeeper
//!
//! Declarative authentication-and-authorization gateway middleware for
//! [axum](https://docs.rs/axum) 0.8.
//!
//! A TOML rule set maps URL patterns to required roles. At startup the
//! rules are compiled into an ordered list and the security chain is
//! assembled from the configuration and the set of registered
//! authentication handlers; both are immutable afterwards and shared
//! read-only across all request tasks. Per request, the chain classifies
//! the request, lets authentication handlers establish an identity,
//! validates CSRF tokens on state-changing browser requests (tokens
//! travel in the `x-csrf-token` header; request bodies are never
//! buffered), and finally evaluates the authorization rules.
//!
//! ## Quick Start
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use axum_gatekeeper::{AuthScheme, Gatekeeper, HeaderAuthHandler, SecurityConfig};
//!
//! let config = SecurityConfig::from_toml(r#"
//! [security]
//! api_security = true
//! signin = "/signin"
//! access_denied = "/403"
//! ignored = ["/static/**", "/health"]
//!
//! [security.protected]
//! admin-area = ["/admin/*", ["ADMIN"]]
//! moderation = ["/mod/*", ["ADMIN", "MOD"]]
//! settings = ["/settings", "/profile/*"]
//! "#).unwrap();
//!
//! let gate = Gatekeeper::builder(config)
//!     .handler(AuthScheme::Password, HeaderAuthHandler::new(AuthScheme::Password))
//!     .handler(AuthScheme::Jwt, HeaderAuthHandler::new(AuthScheme::Jwt))
//!     .build()
//!     .unwrap();
//!
//! let app: Router = Router::new()
//!     .route("/admin/panel", get(|| async { "admins only" }))
//!     .route("/settings", get(|| async { "any signed-in role" }))
//!     .layer(gate.into_layer());
//! ```
//!
//! ## Rule Evaluation
//!
//! Rules are evaluated in **declaration order**; the first rule whose
//! pattern matches the request path determines the required roles, and the
//! identity must hold at least one of them. Patterns use the usual glob
//! forms: `*` matches one path segment, `**` matches any number, a
//! trailing `/` is a prefix match, anything else is exact.
//!
//! Paths not covered by any rule are **public, even to anonymous
//! requests**. This allowlist-of-restrictions model is intentional and
//! relied upon by deployments; list every path you mean to protect.
//!
//! A rule that names no roles defaults to the canonical four:
//! USER, MOD, ADMIN and APP.
//!
//! ## Outcomes
//!
//! Three distinct verdicts, routed through two configurable handlers:
//!
//! - **Allow** - the request proceeds; the [`Identity`] is inserted into
//!   request extensions for downstream handlers.
//! - **Unauthenticated** - protected path, no identity: the sign-in entry
//!   point responds (by default a redirect to the sign-in page, or 401
//!   JSON for API requests).
//! - **Deny** - identity present but holding none of the required roles:
//!   the access-denied handler responds (by default a redirect to the
//!   access-denied page, or 403 JSON for API requests). Failed CSRF checks
//!   take the same route.
//!
//! ## Authentication Handlers
//!
//! Credential verification is pluggable: implement
//! [`AuthenticationHandler`] per scheme and register it on the builder.
//! Handlers run in a fixed priority order (password, OpenID, then the
//! social providers, then the API token handlers); unregistered schemes
//! are skipped entirely without affecting the order of the rest. The
//! gateway is fully stateless: identities are request-scoped and no
//! session is ever created.
//!
//! ```
//! use axum_gatekeeper::{AuthScheme, AuthenticationHandler, Identity, RequestInfo, Role};
//!
//! struct BearerTokenHandler;
//!
//! impl AuthenticationHandler for BearerTokenHandler {
//!     fn attempt(&self, req: &RequestInfo) -> Option<Identity> {
//!         let auth = req.header("authorization")?;
//!         let token = auth.strip_prefix("Bearer ")?;
//!         // Verify the token against your token service here.
//!         let _ = token;
//!         Some(Identity::new("app:main", [Role::app()], AuthScheme::Jwt))
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![forbid(unsafe_code)]

mod chain;
mod config;
mod engine;
mod error;
mod identity;
mod matcher;
mod middleware;
mod rule;

pub use chain::{FilterChain, Stage};
pub use config::{ConfigError, ProtectedEntry, SecurityConfig};
pub use engine::{Access, RuleSet};
pub use error::{
    AccessDenied, AccessDeniedHandler, JsonDeniedHandler, JsonSignInHandler,
    RedirectDeniedHandler, RedirectSignInHandler, SignInHandler,
};
pub use identity::{
    AuthScheme, AuthenticationHandler, CsrfTokenRepository, HeaderAuthHandler, Identity,
    InMemoryCsrfRepository, InMemoryRequestCache, NoopRequestCache, RememberMeService,
    RequestCache, SavedRequest, AUTH_HANDLER_ORDER,
};
pub use matcher::{And, ApiMatcher, CsrfMatcher, IgnoredMatcher, Not, Or, RequestInfo, RequestMatcher};
pub use middleware::{GateLayer, GateService, Gatekeeper, GatekeeperBuilder, CSRF_TOKEN_HEADER};
pub use rule::{default_roles, AuthzRule, PathPattern, Role};

/// Prelude module for convenient imports.
///
/// ```
/// use axum_gatekeeper::prelude::*;
/// ```
pub mod prelude {
    pub use crate::chain::{FilterChain, Stage};
    pub use crate::config::{ConfigError, SecurityConfig};
    pub use crate::engine::{Access, RuleSet};
    pub use crate::error::{AccessDenied, AccessDeniedHandler, SignInHandler};
    pub use crate::identity::{AuthScheme, AuthenticationHandler, Identity};
    pub use crate::matcher::{RequestInfo, RequestMatcher};
    pub use crate::middleware::{GateLayer, Gatekeeper};
    pub use crate::rule::{AuthzRule, PathPattern, Role};
}
