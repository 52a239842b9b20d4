//! Terminal responses: sign-in entry point and access-denied handling.
//!
//! Every terminal security outcome routes through exactly two handlers so
//! behavior is consistent per deployment rather than ad-hoc per stage:
//! the sign-in entry point (no identity on a protected path) and the
//! access-denied handler (identity present but forbidden, or a failed CSRF
//! check). The defaults redirect browsers to the configured pages and
//! answer API requests with JSON status codes.

use crate::matcher::{ApiMatcher, RequestMatcher, RequestInfo};
use crate::rule::Role;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use http::StatusCode;
use std::collections::BTreeSet;
use std::fmt;

/// Details of a terminal denial: who was refused, where, and which roles
/// would have been required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    /// The authenticated subject, if any.
    pub subject: Option<String>,
    /// The request path.
    pub path: String,
    /// Roles the matched rule required. Empty for CSRF failures.
    pub required: BTreeSet<Role>,
    /// Optional custom message.
    pub message: Option<String>,
}

impl AccessDenied {
    /// Denial for an identity lacking the required roles.
    pub fn insufficient_role(
        subject: impl Into<String>,
        path: impl Into<String>,
        required: BTreeSet<Role>,
    ) -> Self {
        Self {
            subject: Some(subject.into()),
            path: path.into(),
            required,
            message: None,
        }
    }

    /// Denial for a failed CSRF check.
    pub fn csrf_failure(path: impl Into<String>) -> Self {
        Self {
            subject: None,
            path: path.into(),
            required: BTreeSet::new(),
            message: Some("missing or invalid CSRF token".to_string()),
        }
    }
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}", msg),
            None => write!(f, "access denied to '{}'", self.path),
        }
    }
}

impl std::error::Error for AccessDenied {}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.to_string()).into_response()
    }
}

/// The authentication entry point: produces the response for a protected
/// path reached without an identity.
pub trait SignInHandler: Send + Sync {
    /// Produce the sign-in response.
    fn handle(&self, req: &RequestInfo, required: &BTreeSet<Role>) -> Response;
}

/// Produces the response for a terminal denial (insufficient role or
/// failed CSRF check).
pub trait AccessDeniedHandler: Send + Sync {
    /// Produce the denied response.
    fn handle(&self, req: &RequestInfo, denied: &AccessDenied) -> Response;
}

/// Default entry point: redirects browser requests to the sign-in page and
/// answers API requests with 401 JSON.
pub struct RedirectSignInHandler {
    signin_url: String,
    api: ApiMatcher,
}

impl RedirectSignInHandler {
    /// Create with the configured sign-in URL and API matcher.
    pub fn new(signin_url: impl Into<String>, api: ApiMatcher) -> Self {
        Self {
            signin_url: signin_url.into(),
            api,
        }
    }
}

impl SignInHandler for RedirectSignInHandler {
    fn handle(&self, req: &RequestInfo, _required: &BTreeSet<Role>) -> Response {
        if self.api.matches(req) {
            return JsonSignInHandler.handle(req, _required);
        }
        Redirect::to(&self.signin_url).into_response()
    }
}

/// Entry point that always answers 401 with a JSON body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSignInHandler;

impl SignInHandler for JsonSignInHandler {
    fn handle(&self, _req: &RequestInfo, required: &BTreeSet<Role>) -> Response {
        let body = serde_json::json!({
            "error": "unauthenticated",
            "message": "authentication required",
            "required_roles": required.iter().map(Role::as_str).collect::<Vec<_>>(),
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Default denied handler: redirects browser requests to the configured
/// access-denied page and answers API requests with 403 JSON.
pub struct RedirectDeniedHandler {
    access_denied_url: String,
    api: ApiMatcher,
}

impl RedirectDeniedHandler {
    /// Create with the configured access-denied URL and API matcher.
    pub fn new(access_denied_url: impl Into<String>, api: ApiMatcher) -> Self {
        Self {
            access_denied_url: access_denied_url.into(),
            api,
        }
    }
}

impl AccessDeniedHandler for RedirectDeniedHandler {
    fn handle(&self, req: &RequestInfo, denied: &AccessDenied) -> Response {
        if self.api.matches(req) {
            return JsonDeniedHandler::new().handle(req, denied);
        }
        Redirect::to(&self.access_denied_url).into_response()
    }
}

/// Denied handler that always answers 403 with a JSON body.
#[derive(Debug, Clone, Default)]
pub struct JsonDeniedHandler {
    include_details: bool,
}

impl JsonDeniedHandler {
    /// Create a handler with details suppressed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Include the path and required roles in the response body. Exposing
    /// them may be unwanted in production.
    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }
}

impl AccessDeniedHandler for JsonDeniedHandler {
    fn handle(&self, _req: &RequestInfo, denied: &AccessDenied) -> Response {
        let body = if self.include_details {
            serde_json::json!({
                "error": "access_denied",
                "message": denied.to_string(),
                "path": denied.path,
                "required_roles": denied.required.iter().map(Role::as_str).collect::<Vec<_>>(),
            })
        } else {
            serde_json::json!({
                "error": "access_denied",
                "message": denied.to_string(),
            })
        };
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};

    fn req(path: &str) -> RequestInfo {
        RequestInfo::new(Method::GET, path, HeaderMap::new())
    }

    #[test]
    fn redirect_entry_point_redirects_browsers() {
        let handler = RedirectSignInHandler::new("/signin", ApiMatcher::new("/v1"));
        let response = handler.handle(&req("/admin/panel"), &BTreeSet::new());
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(http::header::LOCATION).unwrap(),
            "/signin"
        );
    }

    #[test]
    fn redirect_entry_point_answers_api_with_401() {
        let handler = RedirectSignInHandler::new("/signin", ApiMatcher::new("/v1"));
        let response = handler.handle(&req("/v1/things"), &BTreeSet::new());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn redirect_denied_handler_redirects_browsers() {
        let handler = RedirectDeniedHandler::new("/403", ApiMatcher::new("/v1"));
        let denied =
            AccessDenied::insufficient_role("alice", "/admin/panel", BTreeSet::new());
        let response = handler.handle(&req("/admin/panel"), &denied);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(http::header::LOCATION).unwrap(),
            "/403"
        );
    }

    #[test]
    fn json_denied_handler_is_403() {
        let handler = JsonDeniedHandler::new();
        let denied = AccessDenied::csrf_failure("/settings");
        let response = handler.handle(&req("/settings"), &denied);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
