//! Pipeline configuration.
//!
//! Loaded from TOML; every field has a default, so an empty file is valid:
//!
//! ```toml
//! base_url = "https://api.example.com"
//! refresh_path = "/api/auth/refresh"
//! refresh_timeout_ms = 10000
//! brand_header = "X-Brand-Id"
//! extra_public_paths = ["status/health"]
//! proactive_refresh = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::augment::{DEFAULT_BRAND_HEADER, DEFAULT_BRAND_SCOPED_PREFIXES};
use crate::classifier::EndpointPolicy;
use crate::error::{Error, Result};
use crate::issuer::DEFAULT_REFRESH_PATH;

/// Default API origin.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default refresh timeout in milliseconds.
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 10_000;

/// Default lead time for proactive refresh in seconds.
pub const DEFAULT_PROACTIVE_BUFFER_SECS: i64 = 60;

/// Configuration for [`AuthPipeline`](crate::AuthPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// API origin that request paths are resolved against.
    pub base_url: String,

    /// Refresh endpoint path. A 401 from this path is never refreshed.
    pub refresh_path: String,

    /// Per-request timeout in milliseconds. Must be non-zero.
    pub request_timeout_ms: u64,

    /// Timeout for the issuer call in milliseconds; expiry counts as a failed
    /// refresh. Must be non-zero.
    pub refresh_timeout_ms: u64,

    /// Name of the brand-scoping header.
    pub brand_header: String,

    /// Path prefixes that carry the brand-scoping header.
    pub brand_scoped_prefixes: Vec<String>,

    /// Public path fragments on top of the built-in allow-list.
    pub extra_public_paths: Vec<String>,

    /// Refresh before sending when the access token is about to expire.
    pub proactive_refresh: bool,

    pub proactive_refresh_buffer_secs: i64,

    /// Session file used by the CLI. `None` means the per-user data directory.
    pub session_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            refresh_timeout_ms: DEFAULT_REFRESH_TIMEOUT_MS,
            brand_header: DEFAULT_BRAND_HEADER.to_string(),
            brand_scoped_prefixes: DEFAULT_BRAND_SCOPED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            extra_public_paths: Vec::new(),
            proactive_refresh: false,
            proactive_refresh_buffer_secs: DEFAULT_PROACTIVE_BUFFER_SECS,
            session_file: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string and validate it.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis(timeout);
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_ms = millis(timeout);
        self
    }

    pub fn with_proactive_refresh(mut self, enabled: bool) -> Self {
        self.proactive_refresh = enabled;
        self
    }

    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    /// Reject values that would make every request or refresh fail.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be greater than zero".to_string()));
        }
        if self.refresh_timeout_ms == 0 {
            return Err(Error::Config("refresh_timeout_ms must be greater than zero".to_string()));
        }
        self.proactive_refresh_buffer()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Lead time for proactive refresh. Negative values count as zero.
    pub fn proactive_refresh_buffer(&self) -> Result<chrono::Duration> {
        chrono::Duration::try_seconds(self.proactive_refresh_buffer_secs.max(0)).ok_or_else(|| {
            Error::Config(format!(
                "proactive_refresh_buffer_secs out of range: {}",
                self.proactive_refresh_buffer_secs
            ))
        })
    }

    /// The built-in classification policy plus `extra_public_paths`.
    pub fn endpoint_policy(&self) -> EndpointPolicy {
        self.extra_public_paths
            .iter()
            .fold(EndpointPolicy::default(), |policy, path| {
                policy.with_public_path(path.clone())
            })
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
