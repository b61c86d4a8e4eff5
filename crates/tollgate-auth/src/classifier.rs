//! Endpoint classification.
//!
//! Maps `(method, path)` to [`Access::Public`] or [`Access::Protected`]. The
//! policy is an explicit table so it can be audited and tested on its own:
//!
//! 1. Any path containing an allow-listed fragment is public, whatever the method.
//! 2. `GET .../brands/<digits>` (a single numeric id, nothing after it) is public.
//! 3. Everything else is protected.
//!
//! Matching runs against the path with its query string and fragment removed.

use reqwest::Method;

use crate::request::normalize_route;

/// Path fragments that never require credentials.
pub const PUBLIC_PATHS: &[&str] = &[
    "auth/login",
    "auth/register",
    "auth/forgot-password",
    "auth/verify-email",
    "auth/check-username",
    "auth/check-email",
    "auth/google",
    "auth/public-forward",
    "test/",
    "category/hierarchy",
    "brands/all",
    "brands/statistics",
    "brands/search",
    "brands/by-website",
    "brands/by-name",
    "brands/by-domain",
];

/// Whether an endpoint requires credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Protected,
}

impl Access {
    pub fn is_public(self) -> bool {
        self == Access::Public
    }

    pub fn is_protected(self) -> bool {
        self == Access::Protected
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Public => write!(f, "public"),
            Access::Protected => write!(f, "protected"),
        }
    }
}

/// Classification table.
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    public_paths: Vec<String>,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self {
            public_paths: PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl EndpointPolicy {
    /// The built-in policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a public path fragment on top of the built-in list.
    ///
    /// Routes are matched without their leading `/`, so one is trimmed here too.
    pub fn with_public_path(mut self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into().trim_start_matches('/').to_string();
        if !fragment.is_empty() && !self.public_paths.contains(&fragment) {
            self.public_paths.push(fragment);
        }
        self
    }

    /// All public path fragments, built-in first.
    pub fn public_paths(&self) -> &[String] {
        &self.public_paths
    }

    /// Classify one outgoing call.
    pub fn classify(&self, method: &Method, path: &str) -> Access {
        let route = normalize_route(path);

        if self.public_paths.iter().any(|p| route.contains(p.as_str())) {
            return Access::Public;
        }

        if *method == Method::GET && is_single_brand(route) {
            return Access::Public;
        }

        Access::Protected
    }
}

/// `.../brands/<digits>` with nothing after the id.
fn is_single_brand(route: &str) -> bool {
    let Some((parent, id)) = route.rsplit_once('/') else {
        return false;
    };
    let parent_is_brands = parent == "brands" || parent.ends_with("/brands");
    parent_is_brands && !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}
