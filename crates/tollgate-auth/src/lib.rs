//! Request authorization and session refresh for the Tollgate API client.
//!
//! Decides, for every outbound call, whether and how to attach credentials,
//! and recovers when the server rejects them.
//!
//! # Components
//!
//! - [`session`] - session snapshot, storage backends, consumer callbacks
//! - [`classifier`] - public/protected endpoint policy
//! - [`augment`] - Authorization and brand-scoping headers
//! - [`refresh`] - single-flight refresh and session termination
//! - [`pipeline`] - classify, augment, send, recover
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_auth::{AuthPipeline, PipelineConfig, SessionStore};
//!
//! # async fn example() -> tollgate_auth::Result<()> {
//! let store = Arc::new(SessionStore::in_memory());
//! store.login("access", Some("refresh".to_string()));
//!
//! let config = PipelineConfig::default().with_base_url("https://api.example.com");
//! let pipeline = AuthPipeline::from_config(&config, store)?;
//!
//! let response = pipeline.get("/api/profile").await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod augment;
pub mod classifier;
pub mod config;
pub mod error;
pub mod headers;
pub mod issuer;
pub mod pipeline;
pub mod refresh;
pub mod request;
pub mod session;
pub mod token;
pub mod transport;

pub use augment::RequestAugmentor;
pub use classifier::{Access, EndpointPolicy};
pub use config::PipelineConfig;
pub use error::{Error, IssuerError, Result, StorageError, Termination, TransportError};
pub use headers::Headers;
pub use issuer::{CredentialIssuer, HttpCredentialIssuer, IssuedTokens};
pub use pipeline::{AuthPipeline, PipelineBuilder};
pub use refresh::{RefreshCoordinator, RefreshState, Recovery};
pub use request::{ApiRequest, ApiResponse};
pub use session::{
    FileStorage, MemoryStorage, NoopEvents, Session, SessionEvents, SessionStorage, SessionStore,
};
pub use transport::{HttpTransport, Transport};
