//! Request augmentation: attaches credentials to protected calls.

use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

use crate::classifier::Access;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::request::{ApiRequest, route_has_prefix};
use crate::session::Session;

/// Default brand-scoping header.
pub const DEFAULT_BRAND_HEADER: &str = "X-Brand-Id";

/// Path prefixes whose calls carry the brand-scoping header.
pub const DEFAULT_BRAND_SCOPED_PREFIXES: &[&str] = &["/api/protected", "/api/brands", "/api/profile"];

/// Produces outbound headers from a request and a session snapshot.
#[derive(Debug, Clone)]
pub struct RequestAugmentor {
    brand_header: HeaderName,
    brand_scoped_prefixes: Vec<String>,
}

impl Default for RequestAugmentor {
    fn default() -> Self {
        Self {
            brand_header: HeaderName::from_static("x-brand-id"),
            brand_scoped_prefixes: DEFAULT_BRAND_SCOPED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl RequestAugmentor {
    /// Create an augmentor with a custom brand header and prefixes.
    pub fn new(brand_header: &str, brand_scoped_prefixes: Vec<String>) -> Result<Self> {
        let brand_header = HeaderName::from_bytes(brand_header.as_bytes())
            .map_err(|_| Error::Config(format!("Invalid brand header name: {}", brand_header)))?;
        Ok(Self {
            brand_header,
            brand_scoped_prefixes,
        })
    }

    pub fn brand_header(&self) -> &HeaderName {
        &self.brand_header
    }

    /// Whether calls to `route` carry the brand-scoping header.
    ///
    /// Prefixes match whole path segments: `/api/brands` covers
    /// `/api/brands/42` but not `/api/brandsXYZ`.
    pub fn is_brand_scoped(&self, route: &str) -> bool {
        self.brand_scoped_prefixes
            .iter()
            .any(|prefix| route_has_prefix(route, prefix))
    }

    /// Attach credentials for `session` to `request`.
    ///
    /// Public calls and calls without an access token pass through unchanged.
    /// Otherwise `Authorization: Bearer <token>` is set, overriding any value
    /// the caller supplied, and the brand header is added when the route is
    /// brand-scoped and the session has a brand context.
    pub fn augment(&self, request: &ApiRequest, access: Access, session: &Session) -> ApiRequest {
        let token = match (access, session.access_token.as_deref()) {
            (Access::Protected, Some(token)) => token,
            _ => return request.clone(),
        };

        let bearer = match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                value
            }
            Err(_) => {
                tracing::warn!(path = %request.route(), "Access token is not a valid header value, sending without credentials");
                return request.clone();
            }
        };

        let mut overrides = Headers::new().with(AUTHORIZATION, bearer);

        if self.is_brand_scoped(request.route())
            && let Some(brand_id) = session.brand_context_id.as_deref()
        {
            match HeaderValue::from_str(brand_id) {
                Ok(value) => overrides = overrides.with(self.brand_header.clone(), value),
                Err(_) => {
                    tracing::warn!(path = %request.route(), "Brand context is not a valid header value, omitting")
                }
            }
        }

        tracing::debug!(method = %request.method, path = %request.route(), "Attached credentials");
        ApiRequest {
            headers: request.headers.merged(&overrides),
            ..request.clone()
        }
    }
}
