//! The gateway middleware for axum.
//!
//! [`Gatekeeper`] holds the compiled rule set, the assembled chain, and
//! the collaborators; it is built once at startup and shared immutably by
//! every request task. [`GateLayer`] wires it into a tower service stack.
//!
//! Per request, execution follows the documented control flow: ignored
//! bypass, identity establishment (remember-me and authentication handlers
//! in chain order, first success wins), CSRF validation, logout, then the
//! authorization decision. Authentication failures pass through; CSRF and
//! authorization failures are terminal and route through the configured
//! sign-in and access-denied handlers. Logout sits behind the CSRF check,
//! matching the assembled stage order.

use crate::chain::{FilterChain, Stage};
use crate::config::{ConfigError, SecurityConfig};
use crate::engine::{Access, RuleSet};
use crate::error::{
    AccessDenied, AccessDeniedHandler, RedirectDeniedHandler, RedirectSignInHandler, SignInHandler,
};
use crate::identity::{
    AuthScheme, AuthenticationHandler, CsrfTokenRepository, InMemoryCsrfRepository,
    NoopRequestCache, RememberMeService, RequestCache,
};
use crate::matcher::{ApiMatcher, CsrfMatcher, IgnoredMatcher, RequestInfo, RequestMatcher};

use axum::response::{IntoResponse, Redirect, Response};
use futures_util::future::BoxFuture;
use http::Request;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Default header carrying the CSRF token on state-changing requests.
///
/// The token is read from a request header only, never from the body: the
/// middleware does not buffer request bodies. Classic form posts must copy
/// the token into this header (hidden-field value submitted via fetch, or
/// a `<meta>` tag read by a small script). Repositories that need a
/// different source get the full request in
/// [`CsrfTokenRepository::validate`] and can pair the header with a
/// cookie, double-submit style.
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";

/// The immutable core of the gateway: compiled rules, assembled chain,
/// matchers and collaborators. Shared read-only across all request tasks;
/// no locking is needed to traverse the chain or evaluate rules.
pub struct Gatekeeper {
    rules: RuleSet,
    chain: FilterChain,
    ignored: IgnoredMatcher,
    csrf_matcher: CsrfMatcher,
    csrf_header: String,
    signout: String,
    signout_success: String,
    handlers: HashMap<AuthScheme, Arc<dyn AuthenticationHandler>>,
    csrf_repository: Arc<dyn CsrfTokenRepository>,
    request_cache: Arc<dyn RequestCache>,
    remember_me: Option<Arc<dyn RememberMeService>>,
    signin_handler: Arc<dyn SignInHandler>,
    denied_handler: Arc<dyn AccessDeniedHandler>,
}

impl Gatekeeper {
    /// Start building a gatekeeper from a configuration snapshot.
    pub fn builder(config: SecurityConfig) -> GatekeeperBuilder {
        GatekeeperBuilder {
            config,
            csrf_header: CSRF_TOKEN_HEADER.to_string(),
            handlers: HashMap::new(),
            csrf_repository: None,
            request_cache: None,
            remember_me: None,
            signin_handler: None,
            denied_handler: None,
        }
    }

    /// The compiled rule set.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The assembled chain.
    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// The CSRF token repository, for issuing tokens to render into forms.
    pub fn csrf_repository(&self) -> &Arc<dyn CsrfTokenRepository> {
        &self.csrf_repository
    }

    /// Wrap this gatekeeper in a [`GateLayer`].
    pub fn into_layer(self) -> GateLayer {
        GateLayer::new(self)
    }

    /// Establish an identity by traversing the chain's remember-me and
    /// authentication stages in order. The first handler to produce an
    /// identity wins; handlers without a registered collaborator are
    /// skipped.
    fn authenticate(&self, info: &RequestInfo) -> Option<crate::identity::Identity> {
        for stage in self.chain.stages() {
            match stage {
                Stage::RememberMe => {
                    if let Some(service) = &self.remember_me {
                        if let Some(identity) = service.auto_login(info) {
                            tracing::debug!(subject = %identity.subject, "remember-me auto-login");
                            return Some(identity);
                        }
                    }
                }
                Stage::Authentication(scheme) => {
                    if let Some(handler) = self.handlers.get(scheme) {
                        if let Some(identity) = handler.attempt(info) {
                            tracing::debug!(
                                subject = %identity.subject,
                                scheme = %scheme,
                                "authentication established identity"
                            );
                            return Some(identity);
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Builder for [`Gatekeeper`]. Registering a handler for a scheme makes
/// that scheme available to the chain assembler; absent schemes are
/// skipped entirely without affecting the order of the rest.
pub struct GatekeeperBuilder {
    config: SecurityConfig,
    csrf_header: String,
    handlers: HashMap<AuthScheme, Arc<dyn AuthenticationHandler>>,
    csrf_repository: Option<Arc<dyn CsrfTokenRepository>>,
    request_cache: Option<Arc<dyn RequestCache>>,
    remember_me: Option<Arc<dyn RememberMeService>>,
    signin_handler: Option<Arc<dyn SignInHandler>>,
    denied_handler: Option<Arc<dyn AccessDeniedHandler>>,
}

impl GatekeeperBuilder {
    /// Register an authentication handler for a scheme.
    pub fn handler(
        mut self,
        scheme: AuthScheme,
        handler: impl AuthenticationHandler + 'static,
    ) -> Self {
        self.handlers.insert(scheme, Arc::new(handler));
        self
    }

    /// Set the CSRF token repository collaborator. Defaults to the
    /// in-memory repository.
    pub fn csrf_repository(mut self, repo: impl CsrfTokenRepository + 'static) -> Self {
        self.csrf_repository = Some(Arc::new(repo));
        self
    }

    /// Override the header the CSRF token is read from. Tokens travel in a
    /// header only; see [`CSRF_TOKEN_HEADER`].
    pub fn csrf_header(mut self, header: impl Into<String>) -> Self {
        self.csrf_header = header.into();
        self
    }

    /// Set the request cache collaborator. Defaults to a no-op cache.
    pub fn request_cache(mut self, cache: impl RequestCache + 'static) -> Self {
        self.request_cache = Some(Arc::new(cache));
        self
    }

    /// Set the remember-me collaborator. Absent by default; the stage is
    /// still assembled but does nothing without a service.
    pub fn remember_me(mut self, service: impl RememberMeService + 'static) -> Self {
        self.remember_me = Some(Arc::new(service));
        self
    }

    /// Override the sign-in entry point. Defaults to a redirect to the
    /// configured sign-in URL (401 JSON for API requests).
    pub fn signin_handler(mut self, handler: impl SignInHandler + 'static) -> Self {
        self.signin_handler = Some(Arc::new(handler));
        self
    }

    /// Override the access-denied handler. Defaults to a redirect to the
    /// configured access-denied URL (403 JSON for API requests).
    pub fn denied_handler(mut self, handler: impl AccessDeniedHandler + 'static) -> Self {
        self.denied_handler = Some(Arc::new(handler));
        self
    }

    /// Validate the configuration, compile the rule set, and assemble the
    /// chain. Fails loudly on configuration errors before any traffic is
    /// served; there is no insecure fallback.
    pub fn build(self) -> Result<Gatekeeper, ConfigError> {
        let config = self.config;
        config.validate()?;

        let rules = RuleSet::compile(&config)?;
        let available: BTreeSet<AuthScheme> = self.handlers.keys().copied().collect();
        let chain = FilterChain::assemble(&config, &available);

        let api = ApiMatcher::new(config.api_base.clone());
        let signin_handler = self.signin_handler.unwrap_or_else(|| {
            Arc::new(RedirectSignInHandler::new(config.signin.clone(), api.clone()))
        });
        let denied_handler = self.denied_handler.unwrap_or_else(|| {
            Arc::new(RedirectDeniedHandler::new(
                config.access_denied.clone(),
                api.clone(),
            ))
        });

        tracing::info!(
            rules = rules.len(),
            stages = chain.len(),
            api_security = config.api_security,
            csrf_protection = config.csrf_protection,
            "security gateway assembled"
        );

        Ok(Gatekeeper {
            rules,
            chain,
            ignored: IgnoredMatcher::new(&config.ignored),
            csrf_matcher: CsrfMatcher::new(api),
            csrf_header: self.csrf_header,
            signout: config.signout,
            signout_success: config.signout_success,
            handlers: self.handlers,
            csrf_repository: self
                .csrf_repository
                .unwrap_or_else(|| Arc::new(InMemoryCsrfRepository::new())),
            request_cache: self
                .request_cache
                .unwrap_or_else(|| Arc::new(NoopRequestCache)),
            remember_me: self.remember_me,
            signin_handler,
            denied_handler,
        })
    }
}

/// A tower layer that guards a service with a [`Gatekeeper`].
///
/// # Example
/// ```no_run
/// use axum::{routing::get, Router};
/// use axum_gatekeeper::{AuthScheme, Gatekeeper, HeaderAuthHandler, SecurityConfig};
///
/// let config = SecurityConfig::from_toml(r#"
/// [security.protected]
/// admin = ["/admin/*", ["ADMIN"]]
/// "#).unwrap();
///
/// let gate = Gatekeeper::builder(config)
///     .handler(AuthScheme::Password, HeaderAuthHandler::new(AuthScheme::Password))
///     .build()
///     .unwrap();
///
/// let app: Router = Router::new()
///     .route("/admin/panel", get(|| async { "admins only" }))
///     .layer(gate.into_layer());
/// ```
#[derive(Clone)]
pub struct GateLayer {
    gate: Arc<Gatekeeper>,
}

impl GateLayer {
    /// Create a layer from a gatekeeper.
    pub fn new(gate: Gatekeeper) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    /// Create a layer from an already-shared gatekeeper.
    pub fn from_shared(gate: Arc<Gatekeeper>) -> Self {
        Self { gate }
    }

    /// The wrapped gatekeeper.
    pub fn gatekeeper(&self) -> &Arc<Gatekeeper> {
        &self.gate
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// The gateway middleware service.
#[derive(Clone)]
pub struct GateService<S> {
    inner: S,
    gate: Arc<Gatekeeper>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for GateService<S>
where
    S: Service<Request<ReqBody>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let gate = self.gate.clone();
        let mut inner = self.inner.clone();
        let info = RequestInfo::from_request(&request);

        Box::pin(async move {
            // Ignored paths bypass the entire chain.
            if gate.ignored.matches(&info) {
                tracing::trace!(path = info.path(), "ignored path, bypassing security chain");
                return inner.call(request).await;
            }

            let identity = gate.authenticate(&info);

            // CSRF validation applies to state-changing browser requests.
            // A failed check is terminal, not forwarded further.
            if gate.chain.contains(&Stage::Csrf) && gate.csrf_matcher.matches(&info) {
                let token = info.header(&gate.csrf_header);
                if !gate.csrf_repository.validate(&info, token) {
                    tracing::info!(
                        method = %info.method(),
                        path = info.path(),
                        "CSRF validation failed"
                    );
                    let denied = AccessDenied::csrf_failure(info.path());
                    return Ok(gate.denied_handler.handle(&info, &denied));
                }
            }

            // Logout runs only after CSRF validation has passed, so a
            // forged cross-site POST cannot terminate a session.
            if gate.chain.contains(&Stage::Logout) && info.path() == gate.signout {
                tracing::debug!(path = info.path(), "logout");
                return Ok(Redirect::to(&gate.signout_success).into_response());
            }

            match gate.rules.decide(info.path(), identity.as_ref()) {
                Access::Allow => {
                    if let Some(identity) = identity {
                        request.extensions_mut().insert(identity);
                    }
                    inner.call(request).await
                }
                Access::Deny { required } => {
                    let subject = identity
                        .map(|id| id.subject)
                        .unwrap_or_default();
                    tracing::info!(
                        subject = %subject,
                        path = info.path(),
                        "access denied: insufficient role"
                    );
                    let denied =
                        AccessDenied::insufficient_role(subject, info.path(), required);
                    Ok(gate.denied_handler.handle(&info, &denied))
                }
                Access::Unauthenticated { required } => {
                    tracing::info!(path = info.path(), "unauthenticated access to protected path");
                    gate.request_cache.save(&info);
                    Ok(gate.signin_handler.handle(&info, &required))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::HeaderAuthHandler;

    fn config(toml: &str) -> SecurityConfig {
        SecurityConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn build_compiles_rules_and_chain() {
        let gate = Gatekeeper::builder(config(
            r#"
[security]
api_security = true

[security.protected]
admin = ["/admin/*", ["ADMIN"]]
"#,
        ))
        .handler(
            AuthScheme::Password,
            HeaderAuthHandler::new(AuthScheme::Password),
        )
        .handler(AuthScheme::Jwt, HeaderAuthHandler::new(AuthScheme::Jwt))
        .build()
        .unwrap();

        // api rule + admin rule
        assert_eq!(gate.rules().len(), 2);
        let schemes: Vec<AuthScheme> = gate.chain().auth_schemes().collect();
        assert_eq!(
            schemes,
            [AuthScheme::Password, AuthScheme::Jwt, AuthScheme::Signature]
        );
    }

    #[test]
    fn api_toggle_shrinks_rules_and_chain_together() {
        let enabled = Gatekeeper::builder(config(
            r#"
[security]
api_security = true

[security.protected]
admin = ["/admin/*", ["ADMIN"]]
"#,
        ))
        .handler(AuthScheme::Jwt, HeaderAuthHandler::new(AuthScheme::Jwt))
        .build()
        .unwrap();

        let disabled = Gatekeeper::builder(config(
            r#"
[security.protected]
admin = ["/admin/*", ["ADMIN"]]
"#,
        ))
        .handler(AuthScheme::Jwt, HeaderAuthHandler::new(AuthScheme::Jwt))
        .build()
        .unwrap();

        assert!(enabled.rules().len() > disabled.rules().len());
        assert!(enabled.chain().len() > disabled.chain().len());
    }

    #[test]
    fn build_rejects_bad_config() {
        let result = Gatekeeper::builder(SecurityConfig {
            signin: "not-a-path".to_string(),
            ..SecurityConfig::default()
        })
        .build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }
}
