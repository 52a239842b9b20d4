//! Identities, authentication schemes, and collaborator contracts.
//!
//! The gateway never verifies credentials itself. Each authentication
//! scheme is a pluggable [`AuthenticationHandler`] that may establish an
//! [`Identity`] from request credentials or pass through. The CSRF token
//! repository, request cache and remember-me service are likewise opaque
//! collaborators; they own whatever shared state and synchronization they
//! need, while everything the core shares across requests is immutable.

use crate::matcher::RequestInfo;
use crate::rule::Role;
use http::Method;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// An authentication scheme tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthScheme {
    /// Username/password form login.
    Password,
    /// OpenID login.
    OpenId,
    /// Facebook social login.
    Facebook,
    /// Google social login.
    Google,
    /// LinkedIn social login.
    LinkedIn,
    /// Twitter social login.
    Twitter,
    /// GitHub social login.
    GitHub,
    /// JWT bearer-token authentication (API surface).
    Jwt,
    /// Signature-based REST authentication (API surface).
    Signature,
    /// Remember-me cookie authentication.
    RememberMe,
}

impl AuthScheme {
    /// Scheme name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::OpenId => "openid",
            Self::Facebook => "facebook",
            Self::Google => "google",
            Self::LinkedIn => "linkedin",
            Self::Twitter => "twitter",
            Self::GitHub => "github",
            Self::Jwt => "jwt",
            Self::Signature => "signature",
            Self::RememberMe => "remember-me",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed priority order of the interactive authentication handlers. The
/// chain assembler filters this list against the available handler set;
/// disabling a handler removes it without affecting the order of the rest.
/// The token and signature handlers are appended separately, after these,
/// when API security is enabled.
pub const AUTH_HANDLER_ORDER: [AuthScheme; 7] = [
    AuthScheme::Password,
    AuthScheme::OpenId,
    AuthScheme::Facebook,
    AuthScheme::Google,
    AuthScheme::LinkedIn,
    AuthScheme::Twitter,
    AuthScheme::GitHub,
];

/// An authenticated subject: who they are, which roles they hold, and
/// which scheme established them.
///
/// Request-scoped and never persisted server-side; the gateway is fully
/// stateless and creates no sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Subject identifier.
    pub subject: String,
    /// Roles held by the subject.
    pub roles: BTreeSet<Role>,
    /// The scheme that established this identity.
    pub scheme: AuthScheme,
}

impl Identity {
    /// Create an identity.
    pub fn new(
        subject: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
        scheme: AuthScheme,
    ) -> Self {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().collect(),
            scheme,
        }
    }

    /// Whether the identity holds the given role.
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Whether the identity holds at least one of the given roles.
    pub fn has_any_role(&self, roles: &BTreeSet<Role>) -> bool {
        !self.roles.is_disjoint(roles)
    }
}

/// A pluggable authentication handler for one credential scheme.
///
/// Returns `Some(Identity)` when it recognizes and accepts the request's
/// credentials; `None` on absence or failure, in which case the request
/// passes through unauthenticated and later stages decide its fate.
pub trait AuthenticationHandler: Send + Sync {
    /// Attempt to establish an identity from the request.
    fn attempt(&self, req: &RequestInfo) -> Option<Identity>;
}

impl<T: AuthenticationHandler + ?Sized> AuthenticationHandler for std::sync::Arc<T> {
    fn attempt(&self, req: &RequestInfo) -> Option<Identity> {
        (**self).attempt(req)
    }
}

/// Collaborator contract for CSRF token issuance and validation.
pub trait CsrfTokenRepository: Send + Sync {
    /// Issue a fresh token.
    fn issue(&self) -> String;

    /// Validate the token presented by a request, if any.
    ///
    /// `token` is the value of the configured CSRF header; it is `None`
    /// when the header is absent. The full request is available for
    /// implementations that pair the header with a cookie or read a
    /// different header entirely.
    fn validate(&self, req: &RequestInfo, token: Option<&str>) -> bool;
}

impl<T: CsrfTokenRepository + ?Sized> CsrfTokenRepository for std::sync::Arc<T> {
    fn issue(&self) -> String {
        (**self).issue()
    }

    fn validate(&self, req: &RequestInfo, token: Option<&str>) -> bool {
        (**self).validate(req, token)
    }
}

/// A request remembered across an authentication redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRequest {
    /// The original method.
    pub method: Method,
    /// The original path.
    pub path: String,
}

/// Collaborator contract for replaying the originally requested URL after
/// an authentication redirect.
pub trait RequestCache: Send + Sync {
    /// Remember the request.
    fn save(&self, req: &RequestInfo);

    /// Take the remembered request, if any.
    fn restore(&self) -> Option<SavedRequest>;
}

impl<T: RequestCache + ?Sized> RequestCache for std::sync::Arc<T> {
    fn save(&self, req: &RequestInfo) {
        (**self).save(req)
    }

    fn restore(&self) -> Option<SavedRequest> {
        (**self).restore()
    }
}

/// Collaborator contract for remember-me cookie authentication.
pub trait RememberMeService: Send + Sync {
    /// Attempt a cookie-based auto-login.
    fn auto_login(&self, req: &RequestInfo) -> Option<Identity>;
}

impl<T: RememberMeService + ?Sized> RememberMeService for std::sync::Arc<T> {
    fn auto_login(&self, req: &RequestInfo) -> Option<Identity> {
        (**self).auto_login(req)
    }
}

/// Authentication handler that trusts identity headers, for tests and for
/// deployments where an upstream proxy has already authenticated the user.
///
/// The subject comes from `x-auth-subject` and roles from a comma-separated
/// `x-auth-roles` header; a present subject with no roles header gets USER.
#[derive(Debug, Clone)]
pub struct HeaderAuthHandler {
    scheme: AuthScheme,
    subject_header: String,
    roles_header: String,
}

impl HeaderAuthHandler {
    /// Create a handler for the given scheme with the default headers.
    pub fn new(scheme: AuthScheme) -> Self {
        Self {
            scheme,
            subject_header: "x-auth-subject".to_string(),
            roles_header: "x-auth-roles".to_string(),
        }
    }

    /// Use custom subject and roles header names.
    pub fn with_headers(
        mut self,
        subject_header: impl Into<String>,
        roles_header: impl Into<String>,
    ) -> Self {
        self.subject_header = subject_header.into();
        self.roles_header = roles_header.into();
        self
    }
}

impl AuthenticationHandler for HeaderAuthHandler {
    fn attempt(&self, req: &RequestInfo) -> Option<Identity> {
        let subject = req.header(&self.subject_header)?.trim();
        if subject.is_empty() {
            return None;
        }

        let roles: BTreeSet<Role> = match req.header(&self.roles_header) {
            Some(names) => names
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(Role::new)
                .collect(),
            None => [Role::user()].into_iter().collect(),
        };
        if roles.is_empty() {
            return None;
        }

        Some(Identity::new(subject, roles, self.scheme))
    }
}

/// In-memory CSRF token repository for tests and single-process demos.
///
/// Issued tokens are kept in a set; a request validates when it presents a
/// previously issued token. Production deployments back the contract with
/// a shared store instead.
#[derive(Debug, Default)]
pub struct InMemoryCsrfRepository {
    tokens: Mutex<HashSet<String>>,
    counter: AtomicU64,
}

impl InMemoryCsrfRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CsrfTokenRepository for InMemoryCsrfRepository {
    fn issue(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let token = format!("{:08x}{:016x}", nanos, n);
        self.tokens
            .lock()
            .expect("csrf token set poisoned")
            .insert(token.clone());
        token
    }

    fn validate(&self, _req: &RequestInfo, token: Option<&str>) -> bool {
        match token {
            Some(t) => self
                .tokens
                .lock()
                .expect("csrf token set poisoned")
                .contains(t),
            None => false,
        }
    }
}

/// Single-slot in-memory request cache for tests and demos. Stores the
/// most recently saved request.
#[derive(Debug, Default)]
pub struct InMemoryRequestCache {
    slot: Mutex<Option<SavedRequest>>,
}

impl InMemoryRequestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestCache for InMemoryRequestCache {
    fn save(&self, req: &RequestInfo) {
        let saved = SavedRequest {
            method: req.method().clone(),
            path: req.path().to_string(),
        };
        *self.slot.lock().expect("request cache poisoned") = Some(saved);
    }

    fn restore(&self) -> Option<SavedRequest> {
        self.slot.lock().expect("request cache poisoned").take()
    }
}

/// Request cache that remembers nothing. The default when no collaborator
/// is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRequestCache;

impl RequestCache for NoopRequestCache {
    fn save(&self, _req: &RequestInfo) {}

    fn restore(&self) -> Option<SavedRequest> {
        None
    }
}
