//! Request classification predicates.
//!
//! Matchers are total, side-effect-free predicates over the request line
//! (method, path, headers). They decide which branch of the security chain
//! a request takes: bypassed entirely, treated as an API call, or subject
//! to CSRF validation. Matchers compose with [`RequestMatcher::and`],
//! [`RequestMatcher::or`] and [`RequestMatcher::not`].

use crate::rule::PathPattern;
use http::{HeaderMap, Method, Request};

/// The request facts matchers and collaborators operate on.
///
/// An owned snapshot of method, path and headers, captured once per request
/// before the body is consumed.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    method: Method,
    path: String,
    headers: HeaderMap,
}

impl RequestInfo {
    /// Create request info from its parts.
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
        }
    }

    /// Capture request info from an HTTP request.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            headers: request.headers().clone(),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A pure predicate over a request.
pub trait RequestMatcher: Send + Sync {
    /// Check whether the request matches.
    fn matches(&self, req: &RequestInfo) -> bool;

    /// Combine with another matcher; both must match.
    fn and<M: RequestMatcher>(self, other: M) -> And<Self, M>
    where
        Self: Sized,
    {
        And(self, other)
    }

    /// Combine with another matcher; either may match.
    fn or<M: RequestMatcher>(self, other: M) -> Or<Self, M>
    where
        Self: Sized,
    {
        Or(self, other)
    }

    /// Invert this matcher.
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }
}

impl<T: RequestMatcher + ?Sized> RequestMatcher for &T {
    fn matches(&self, req: &RequestInfo) -> bool {
        (**self).matches(req)
    }
}

impl<T: RequestMatcher + ?Sized> RequestMatcher for Box<T> {
    fn matches(&self, req: &RequestInfo) -> bool {
        (**self).matches(req)
    }
}

/// Conjunction of two matchers.
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

impl<A: RequestMatcher, B: RequestMatcher> RequestMatcher for And<A, B> {
    fn matches(&self, req: &RequestInfo) -> bool {
        self.0.matches(req) && self.1.matches(req)
    }
}

/// Disjunction of two matchers.
#[derive(Debug, Clone)]
pub struct Or<A, B>(A, B);

impl<A: RequestMatcher, B: RequestMatcher> RequestMatcher for Or<A, B> {
    fn matches(&self, req: &RequestInfo) -> bool {
        self.0.matches(req) || self.1.matches(req)
    }
}

/// Negation of a matcher.
#[derive(Debug, Clone)]
pub struct Not<A>(A);

impl<A: RequestMatcher> RequestMatcher for Not<A> {
    fn matches(&self, req: &RequestInfo) -> bool {
        !self.0.matches(req)
    }
}

/// Matches paths that bypass the entire security chain (static assets,
/// health checks). Evaluated first; a match skips every other stage.
#[derive(Debug, Clone, Default)]
pub struct IgnoredMatcher {
    patterns: Vec<PathPattern>,
}

impl IgnoredMatcher {
    /// Build from configured pattern strings.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| PathPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    /// Whether no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl RequestMatcher for IgnoredMatcher {
    fn matches(&self, req: &RequestInfo) -> bool {
        self.patterns.iter().any(|p| p.matches(req.path()))
    }
}

/// Matches requests targeting the machine API surface, as opposed to
/// interactive browser flows.
#[derive(Debug, Clone)]
pub struct ApiMatcher {
    base: String,
    prefix: String,
}

impl ApiMatcher {
    /// Build for the given API base path, e.g. `/v1`.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        let prefix = format!("{}/", base);
        Self { base, prefix }
    }

    /// The API base path.
    pub fn base(&self) -> &str {
        &self.base
    }
}

impl RequestMatcher for ApiMatcher {
    fn matches(&self, req: &RequestInfo) -> bool {
        let path = req.path();
        path == self.base || path.starts_with(&self.prefix)
    }
}

/// Matches requests that require CSRF-token validation: state-changing
/// methods that are not API calls. CSRF tokens protect browser-form flows;
/// token-authenticated API calls carry their own proof of intent.
#[derive(Debug, Clone)]
pub struct CsrfMatcher {
    api: ApiMatcher,
}

impl CsrfMatcher {
    /// Build with the API matcher used to exclude API requests.
    pub fn new(api: ApiMatcher) -> Self {
        Self { api }
    }
}

impl RequestMatcher for CsrfMatcher {
    fn matches(&self, req: &RequestInfo) -> bool {
        let idempotent = matches!(
            *req.method(),
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        );
        !idempotent && !self.api.matches(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(method: Method, path: &str) -> RequestInfo {
        RequestInfo::new(method, path, HeaderMap::new())
    }

    #[test]
    fn ignored_matcher() {
        let matcher = IgnoredMatcher::new(["/static/**", "/favicon.ico", "/health"]);
        assert!(matcher.matches(&req(Method::GET, "/static/css/site.css")));
        assert!(matcher.matches(&req(Method::GET, "/favicon.ico")));
        assert!(matcher.matches(&req(Method::GET, "/health")));
        assert!(!matcher.matches(&req(Method::GET, "/admin")));

        assert!(!IgnoredMatcher::default().matches(&req(Method::GET, "/anything")));
    }

    #[test]
    fn api_matcher() {
        let matcher = ApiMatcher::new("/v1");
        assert!(matcher.matches(&req(Method::GET, "/v1")));
        assert!(matcher.matches(&req(Method::GET, "/v1/things")));
        assert!(!matcher.matches(&req(Method::GET, "/v10/things")));
        assert!(!matcher.matches(&req(Method::GET, "/signin")));
    }

    #[test]
    fn csrf_matcher_truth_table() {
        let matcher = CsrfMatcher::new(ApiMatcher::new("/v1"));

        // State-changing browser request: CSRF applies.
        assert!(matcher.matches(&req(Method::POST, "/settings")));
        assert!(matcher.matches(&req(Method::PUT, "/settings")));
        assert!(matcher.matches(&req(Method::DELETE, "/settings")));

        // Idempotent methods: never.
        assert!(!matcher.matches(&req(Method::GET, "/settings")));
        assert!(!matcher.matches(&req(Method::HEAD, "/settings")));
        assert!(!matcher.matches(&req(Method::OPTIONS, "/settings")));

        // API calls: never, regardless of method.
        assert!(!matcher.matches(&req(Method::POST, "/v1/things")));
    }

    #[test]
    fn combinators() {
        let api = ApiMatcher::new("/v1");
        let health = IgnoredMatcher::new(["/health"]);

        let either = api.clone().or(health);
        assert!(either.matches(&req(Method::GET, "/v1/x")));
        assert!(either.matches(&req(Method::GET, "/health")));
        assert!(!either.matches(&req(Method::GET, "/other")));

        let not_api = api.not();
        assert!(not_api.matches(&req(Method::GET, "/other")));
        assert!(!not_api.matches(&req(Method::GET, "/v1/x")));
    }
}
