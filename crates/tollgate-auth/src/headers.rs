//! Immutable header map.
//!
//! Every mutation returns a new [`Headers`] value, so a request descriptor can
//! be replayed with re-stamped credentials without touching the original.
//! On merge, the right-hand side always wins.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// An immutable set of request headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(HeaderMap);

impl Headers {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `name` set to `value`, replacing any existing value.
    pub fn with(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut map = self.0.clone();
        map.insert(name, value);
        Self(map)
    }

    /// Merge `overrides` on top of `self`. Values in `overrides` win.
    pub fn merged(&self, overrides: &Headers) -> Self {
        let mut map = self.0.clone();
        for name in overrides.0.keys() {
            map.remove(name);
        }
        for (name, value) in overrides.0.iter() {
            map.append(name.clone(), value.clone());
        }
        Self(map)
    }

    /// Look up a header value as a string.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }

    /// Check whether a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of header values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &HeaderMap {
        &self.0
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        Self(map)
    }
}

impl From<Headers> for HeaderMap {
    fn from(headers: Headers) -> Self {
        headers.0
    }
}
