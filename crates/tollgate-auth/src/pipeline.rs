//! Pipeline orchestration.
//!
//! One call through [`AuthPipeline::execute`]: classify, attach credentials,
//! send. A 401 from a protected endpoint goes to the [`RefreshCoordinator`],
//! which either replays the request once with a new token or ends the
//! session. Every other response passes through untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;

use crate::augment::RequestAugmentor;
use crate::classifier::{Access, EndpointPolicy};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::issuer::{CredentialIssuer, HttpCredentialIssuer};
use crate::refresh::{RefreshCoordinator, RefreshState, Recovery};
use crate::request::{ApiRequest, ApiResponse};
use crate::session::SessionStore;
use crate::token;
use crate::transport::{HttpTransport, Transport};

/// Wires the classifier, augmentor and refresh coordinator around a transport.
pub struct AuthPipeline {
    policy: EndpointPolicy,
    augmentor: RequestAugmentor,
    coordinator: RefreshCoordinator,
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    proactive_buffer: Option<chrono::Duration>,
}

impl AuthPipeline {
    pub fn builder(
        store: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        issuer: Arc<dyn CredentialIssuer>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(store, transport, issuer)
    }

    /// Build an HTTP pipeline from configuration.
    pub fn from_config(config: &PipelineConfig, store: Arc<SessionStore>) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::builder()
            .base_url(&config.base_url)
            .timeout(config.request_timeout())
            .build()?;
        let issuer = HttpCredentialIssuer::new(transport.base_url(), &config.refresh_path)?
            .with_client(transport.client().clone());
        let augmentor =
            RequestAugmentor::new(&config.brand_header, config.brand_scoped_prefixes.clone())?;

        let mut builder = Self::builder(store, Arc::new(transport), Arc::new(issuer))
            .policy(config.endpoint_policy())
            .augmentor(augmentor)
            .refresh_path(config.refresh_path.clone())
            .refresh_timeout(config.refresh_timeout());
        if config.proactive_refresh {
            builder = builder.proactive_refresh(config.proactive_refresh_buffer()?);
        }
        Ok(builder.build())
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn policy(&self) -> &EndpointPolicy {
        &self.policy
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator.state()
    }

    /// Classify a call without sending it.
    pub fn classify(&self, method: &Method, path: &str) -> Access {
        self.policy.classify(method, path)
    }

    /// Send `request` through the pipeline.
    ///
    /// Returns the original response, the replayed response after a refresh,
    /// or [`Error::Unauthorized`] carrying the original 401 when the session
    /// could not be recovered.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let access = self.policy.classify(&request.method, &request.path);
        tracing::debug!(method = %request.method, path = %request.route(), %access, "Classified request");

        if access.is_protected() {
            self.refresh_if_expiring().await;
        }

        let session = self.store.get();
        let outbound = self.augmentor.augment(&request, access, &session);
        let response = self.transport.send(&outbound).await?;

        if !response.is_unauthorized() || access.is_public() {
            return Ok(response);
        }

        let sent_token = session.access_token.as_deref();
        match self.coordinator.recover(request.route(), sent_token).await {
            Recovery::Replay(_) => {
                // Re-read so the replay carries the refreshed brand context too.
                let replay = self.augmentor.augment(&request, access, &self.store.get());
                tracing::debug!(method = %request.method, path = %request.route(), "Replaying after refresh");
                Ok(self.transport.send(&replay).await?)
            }
            Recovery::Terminated(reason) => Err(Error::Unauthorized { reason, response }),
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.execute(ApiRequest::post(path).with_json(body)).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.execute(ApiRequest::put(path).with_json(body)).await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.execute(ApiRequest::patch(path).with_json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.execute(ApiRequest::delete(path)).await
    }

    async fn refresh_if_expiring(&self) {
        let Some(buffer) = self.proactive_buffer else {
            return;
        };
        let expiring = self
            .store
            .get()
            .access_token
            .as_deref()
            .is_some_and(|t| token::is_expiring(t, buffer));
        if expiring && self.coordinator.refresh_ahead().await.is_none() {
            tracing::debug!("Refresh ahead of expiry did not succeed, sending with current token");
        }
    }
}

impl std::fmt::Debug for AuthPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthPipeline")
            .field("policy", &self.policy)
            .field("augmentor", &self.augmentor)
            .field("coordinator", &self.coordinator)
            .field("proactive_buffer", &self.proactive_buffer)
            .finish()
    }
}

/// Builder for [`AuthPipeline`].
pub struct PipelineBuilder {
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    issuer: Arc<dyn CredentialIssuer>,
    policy: EndpointPolicy,
    augmentor: RequestAugmentor,
    refresh_path: String,
    refresh_timeout: Duration,
    proactive_buffer: Option<chrono::Duration>,
}

impl PipelineBuilder {
    pub fn new(
        store: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        issuer: Arc<dyn CredentialIssuer>,
    ) -> Self {
        Self {
            store,
            transport,
            issuer,
            policy: EndpointPolicy::default(),
            augmentor: RequestAugmentor::default(),
            refresh_path: crate::issuer::DEFAULT_REFRESH_PATH.to_string(),
            refresh_timeout: crate::refresh::DEFAULT_REFRESH_TIMEOUT,
            proactive_buffer: None,
        }
    }

    pub fn policy(mut self, policy: EndpointPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn augmentor(mut self, augmentor: RequestAugmentor) -> Self {
        self.augmentor = augmentor;
        self
    }

    /// Path of the refresh endpoint; a 401 from it is never refreshed.
    pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Refresh before sending when the access token expires within `buffer`.
    pub fn proactive_refresh(mut self, buffer: chrono::Duration) -> Self {
        self.proactive_buffer = Some(buffer);
        self
    }

    pub fn build(self) -> AuthPipeline {
        let coordinator = RefreshCoordinator::new(self.store.clone(), self.issuer, self.refresh_path)
            .with_timeout(self.refresh_timeout);
        AuthPipeline {
            policy: self.policy,
            augmentor: self.augmentor,
            coordinator,
            store: self.store,
            transport: self.transport,
            proactive_buffer: self.proactive_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IssuerError, Termination, TransportError};
    use crate::issuer::IssuedTokens;
    use crate::session::{MemoryStorage, Session, SessionEvents};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport that answers 401 to any token in `rejected` and records requests.
    #[derive(Default)]
    struct RecordingTransport {
        rejected: Vec<&'static str>,
        status_override: Option<StatusCode>,
        sent: Mutex<Vec<ApiRequest>>,
    }

    impl RecordingTransport {
        fn rejecting(tokens: &[&'static str]) -> Self {
            Self {
                rejected: tokens.to_vec(),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<ApiRequest> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
            self.sent.lock().push(request.clone());
            if let Some(status) = self.status_override {
                return Ok(ApiResponse::new(status));
            }
            let bearer = request.headers.get("authorization");
            let rejected = match bearer {
                Some(value) => self
                    .rejected
                    .iter()
                    .any(|t| value == format!("Bearer {}", t)),
                None => self.rejected.contains(&"<none>"),
            };
            if rejected {
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED).with_body("expired"))
            } else {
                Ok(ApiResponse::new(StatusCode::OK).with_body("ok"))
            }
        }
    }

    struct FixedIssuer {
        reply: std::result::Result<IssuedTokens, IssuerError>,
        calls: AtomicU32,
        seen: Mutex<Vec<String>>,
    }

    impl FixedIssuer {
        fn new(reply: std::result::Result<IssuedTokens, IssuerError>) -> Self {
            Self {
                reply,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CredentialIssuer for FixedIssuer {
        async fn refresh(&self, refresh_token: &str) -> std::result::Result<IssuedTokens, IssuerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(refresh_token.to_string());
            self.reply.clone()
        }
    }

    #[derive(Default)]
    struct Redirects(AtomicU32);

    impl SessionEvents for Redirects {
        fn redirect_to_login(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        pipeline: AuthPipeline,
        transport: Arc<RecordingTransport>,
        issuer: Arc<FixedIssuer>,
        redirects: Arc<Redirects>,
    }

    fn harness(session: Session, transport: RecordingTransport, issuer: FixedIssuer) -> Harness {
        let redirects = Arc::new(Redirects::default());
        let store = Arc::new(SessionStore::new(
            Arc::new(MemoryStorage::with_session(session)),
            redirects.clone(),
        ));
        let transport = Arc::new(transport);
        let issuer = Arc::new(issuer);
        let pipeline = AuthPipeline::builder(store, transport.clone(), issuer.clone()).build();
        Harness {
            pipeline,
            transport,
            issuer,
            redirects,
        }
    }

    #[test]
    fn test_from_config_rejects_out_of_range_buffer() {
        let config = PipelineConfig {
            proactive_refresh: true,
            proactive_refresh_buffer_secs: i64::MAX,
            ..PipelineConfig::default()
        };
        let err = AuthPipeline::from_config(&config, Arc::new(SessionStore::in_memory())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_public_numeric_brand_sent_without_credentials() {
        let h = harness(
            Session::new("T1", Some("R1".into())),
            RecordingTransport::default(),
            FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
        );

        let response = h.pipeline.get("/api/brands/42").await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].headers.contains("authorization"));
    }

    #[tokio::test]
    async fn test_protected_401_refreshes_and_replays() {
        let h = harness(
            Session::new("T1", Some("R1".into())),
            RecordingTransport::rejecting(&["T1"]),
            FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
        );

        let response = h
            .pipeline
            .post("/api/protected/data", serde_json::json!({"k": 1}))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.issuer.seen.lock(), vec!["R1".to_string()]);

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].headers.get("authorization"), Some("Bearer T1"));
        assert_eq!(sent[1].headers.get("authorization"), Some("Bearer T2"));
        assert_eq!(sent[1].method, Method::POST);
        assert_eq!(sent[1].path, "/api/protected/data");
        assert_eq!(sent[1].body, Some(serde_json::json!({"k": 1})));
    }

    #[tokio::test]
    async fn test_no_refresh_token_surfaces_original_401() {
        let h = harness(
            Session::new("T1", None),
            RecordingTransport::rejecting(&["T1"]),
            FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
        );

        let err = h.pipeline.get("/api/profile").await.unwrap_err();

        match err {
            Error::Unauthorized { reason, response } => {
                assert_eq!(reason, Termination::NoRefreshToken);
                assert_eq!(response.text(), "expired");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*h.pipeline.store().get(), Session::empty());
        assert_eq!(h.redirects.0.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_relative_refresh_path_is_never_refreshed() {
        let h = harness(
            Session::new("T1", Some("R1".into())),
            RecordingTransport::rejecting(&["T1", "<none>"]),
            FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
        );

        let err = h
            .pipeline
            .post("api/auth/refresh", serde_json::json!({}))
            .await
            .unwrap_err();

        match err {
            Error::Unauthorized { reason, .. } => assert_eq!(reason, Termination::RefreshEndpoint),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.redirects.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_original_401() {
        let h = harness(
            Session::new("T1", Some("R1".into())),
            RecordingTransport::rejecting(&["T1"]),
            FixedIssuer::new(Err(IssuerError::Rejected {
                status: 400,
                message: "invalid_grant".to_string(),
            })),
        );

        let err = h.pipeline.get("/api/profile").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));
        assert!(!h.pipeline.store().is_authenticated());
        assert_eq!(h.redirects.0.load(Ordering::SeqCst), 1);
        assert_eq!(h.pipeline.refresh_state(), RefreshState::LoggedOut);
    }

    #[tokio::test]
    async fn test_replay_401_is_not_refreshed_again() {
        let h = harness(
            Session::new("T1", Some("R1".into())),
            RecordingTransport::rejecting(&["T1", "T2"]),
            FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
        );

        let response = h.pipeline.get("/api/profile").await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.sent().len(), 2);
        assert_eq!(h.redirects.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_public_401_passes_through() {
        let h = harness(
            Session::empty(),
            RecordingTransport::rejecting(&["<none>"]),
            FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
        );

        let response = h.pipeline.post("/api/auth/login", serde_json::json!({})).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.redirects.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_statuses_pass_through() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            let h = harness(
                Session::new("T1", Some("R1".into())),
                RecordingTransport {
                    status_override: Some(status),
                    ..RecordingTransport::default()
                },
                FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
            );

            let response = h.pipeline.get("/api/profile").await.unwrap();
            assert_eq!(response.status(), status);
            assert_eq!(h.issuer.calls.load(Ordering::SeqCst), 0);
            assert_eq!(h.transport.sent().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_replay_keeps_brand_header() {
        let h = harness(
            Session::new("T1", Some("R1".into())).with_brand_context(Some("9".into())),
            RecordingTransport::rejecting(&["T1"]),
            FixedIssuer::new(Ok(IssuedTokens::new("T2"))),
        );

        h.pipeline.get("/api/profile").await.unwrap();

        let sent = h.transport.sent();
        assert_eq!(sent[1].headers.get("x-brand-id"), Some("9"));
        assert_eq!(sent[1].headers.get("authorization"), Some("Bearer T2"));
    }

    #[tokio::test]
    async fn test_proactive_refresh_before_send() {
        use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

        let expired = format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(r#"{"exp":1000}"#)
        );
        let redirects = Arc::new(Redirects::default());
        let store = Arc::new(SessionStore::new(
            Arc::new(MemoryStorage::with_session(Session::new(expired, Some("R1".into())))),
            redirects,
        ));
        let transport = Arc::new(RecordingTransport::default());
        let issuer = Arc::new(FixedIssuer::new(Ok(IssuedTokens::new("T2"))));
        let pipeline = AuthPipeline::builder(store, transport.clone(), issuer.clone())
            .proactive_refresh(chrono::Duration::seconds(60))
            .build();

        pipeline.get("/api/profile").await.unwrap();

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].headers.get("authorization"), Some("Bearer T2"));
    }
}
