//! Credential issuer: exchanges a refresh token for a new access token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, IssuerError, Result};

/// Default refresh endpoint, relative to the API origin.
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";

/// Tokens returned by a successful refresh.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTokens {
    #[serde(alias = "access_token")]
    pub access_token: String,
    /// Rotated refresh token. Absent means the old one stays valid.
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
}

impl IssuedTokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedTokens")
            .field("access_token", &"<redacted>")
            .field("rotated", &self.refresh_token.is_some())
            .finish()
    }
}

/// Remote collaborator that issues access tokens.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Exchange `refresh_token` for new credentials.
    async fn refresh(&self, refresh_token: &str) -> std::result::Result<IssuedTokens, IssuerError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Issuer that calls `POST <refresh_path>` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCredentialIssuer {
    http: reqwest::Client,
    refresh_url: Url,
}

impl HttpCredentialIssuer {
    /// Create an issuer for `refresh_path` on `base_url`.
    pub fn new(base_url: &Url, refresh_path: &str) -> Result<Self> {
        let refresh_url = base_url
            .join(refresh_path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid refresh path '{}': {}", refresh_path, e)))?;
        Ok(Self {
            http: reqwest::Client::new(),
            refresh_url,
        })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn refresh(&self, refresh_token: &str) -> std::result::Result<IssuedTokens, IssuerError> {
        let response = self
            .http
            .post(self.refresh_url.clone())
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(IssuerError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<IssuedTokens>()
            .await
            .map_err(|e| IssuerError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))
    }
}
