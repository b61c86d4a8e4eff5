//! Request descriptors and buffered responses.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::headers::Headers;

/// One outbound API call, produced per call and discarded after use.
///
/// `path` is relative to the API origin (e.g. `/api/brands/42`) and may carry
/// a query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Headers,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a header on the request.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers = self.headers.with(name, value);
        self
    }

    /// Replace the header set.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// The path without query string or fragment.
    pub fn route(&self) -> &str {
        route_of(&self.path)
    }
}

/// Strip a query string or fragment from a request path.
pub(crate) fn route_of(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Canonical route for matching: no query string, no fragment, no leading `/`.
///
/// The transport resolves `api/profile` and `/api/profile` to the same URL,
/// so every route comparison goes through this form.
pub fn normalize_route(path: &str) -> &str {
    route_of(path).trim_start_matches('/')
}

/// Whether `route` equals `prefix` or sits below it on a segment boundary.
///
/// Both sides are normalized; a trailing `/` on `prefix` is ignored.
pub(crate) fn route_has_prefix(route: &str, prefix: &str) -> bool {
    let route = normalize_route(route);
    let prefix = normalize_route(prefix).trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match route.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Create a response from its parts.
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as lossy UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_strips_query_and_fragment() {
        assert_eq!(ApiRequest::get("/api/brands/42?x=1").route(), "/api/brands/42");
        assert_eq!(ApiRequest::get("/api/brands/42#top").route(), "/api/brands/42");
        assert_eq!(ApiRequest::get("/api/brands").route(), "/api/brands");
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("/api/auth/refresh"), "api/auth/refresh");
        assert_eq!(normalize_route("api/auth/refresh"), "api/auth/refresh");
        assert_eq!(normalize_route("//api/profile?tab=1"), "api/profile");
        assert_eq!(normalize_route("/"), "");
    }

    #[test]
    fn test_route_prefix_respects_segments() {
        assert!(route_has_prefix("/api/brands", "/api/brands"));
        assert!(route_has_prefix("api/brands/42/edit", "/api/brands"));
        assert!(route_has_prefix("/api/profile?tab=1", "api/profile/"));
        assert!(!route_has_prefix("/api/brandsXYZ", "/api/brands"));
        assert!(!route_has_prefix("/api", "/api/brands"));
        assert!(route_has_prefix("/anything", "/"));
    }

    #[test]
    fn test_response_json() {
        let response = ApiResponse::new(StatusCode::OK).with_body(r#"{"id":7}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 7);
        assert!(response.is_success());
        assert!(!response.is_unauthorized());
    }
}
