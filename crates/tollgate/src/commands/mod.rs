//! CLI command handlers.

pub mod classify;
pub mod request;
pub mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tollgate_auth::{FileStorage, PipelineConfig, SessionEvents, SessionStore};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved pipeline configuration.
    pub config: PipelineConfig,
    /// Where the session is stored.
    pub session_file: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
}

impl Context {
    /// Resolve configuration: flags win over the config file, which wins over defaults.
    pub fn resolve(
        config_path: Option<&Path>,
        base_url: Option<String>,
        session_file: Option<PathBuf>,
        json_output: bool,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(url) = base_url {
            config.base_url = url;
        }

        let session_file = match session_file.or_else(|| config.session_file.clone()) {
            Some(path) => path,
            None => dirs::data_dir()
                .map(|d| d.join("tollgate").join(tollgate_auth::session::SESSION_FILE))
                .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?,
        };

        tracing::debug!(
            base_url = %config.base_url,
            session_file = %session_file.display(),
            "Resolved configuration"
        );

        Ok(Self {
            config,
            session_file,
            json_output,
        })
    }

    /// Open the persisted session store.
    pub fn open_store(&self) -> Arc<SessionStore> {
        Arc::new(SessionStore::new(
            Arc::new(FileStorage::with_path(self.session_file.clone())),
            Arc::new(CliEvents),
        ))
    }
}

/// Reports session changes on stderr.
struct CliEvents;

impl SessionEvents for CliEvents {
    fn redirect_to_login(&self) {
        eprintln!("Session expired. Run 'tollgate session login' to sign in again.");
    }
}
